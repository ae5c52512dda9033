//! AST interpreter of the sandboxed expression engine.
//!
//! Expressions evaluate against an [EvalContext] that wraps the session's
//! [GlobalData]; variable lookups resolve child-to-root through the active
//! scope chain. Evaluation is deterministic and side-effect free apart from
//! explicit assignment forms, and has no access to the host file system,
//! network or loader.

use std::cmp::Ordering;
use std::fmt::Debug;

use crate::datamodel::{data_to_boolean, data_to_string, Data, DataMap, GlobalData};
use crate::expression_engine::lexer::Operator;

pub type ExpressionResult = Result<Data, String>;

/// Evaluation environment of one expression run.
pub struct EvalContext<'a> {
    pub global: &'a mut GlobalData,
}

impl<'a> EvalContext<'a> {
    pub fn new(global: &'a mut GlobalData) -> EvalContext<'a> {
        EvalContext { global }
    }
}

pub trait Expression: Debug {
    fn execute(&self, ctx: &mut EvalContext) -> ExpressionResult;

    fn is_assignable(&self) -> bool {
        false
    }

    /// Mutable slot addressed by this expression, for assignment targets.
    /// Intermediate containers must already exist; only the final member
    /// key of a map may be created.
    fn resolve_mut<'c>(&self, _global: &'c mut GlobalData) -> Result<&'c mut Data, String> {
        Err("Expression is not assignable".to_string())
    }

    /// The plain variable name, if this expression is one.
    fn variable_name(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug)]
pub struct ExpressionConstant {
    pub data: Data,
}

impl ExpressionConstant {
    pub fn new(d: Data) -> ExpressionConstant {
        ExpressionConstant { data: d }
    }
}

impl Expression for ExpressionConstant {
    fn execute(&self, _ctx: &mut EvalContext) -> ExpressionResult {
        Ok(self.data.clone())
    }
}

#[derive(Debug)]
pub struct ExpressionVariable {
    pub name: String,
}

impl ExpressionVariable {
    pub fn new(name: &str) -> ExpressionVariable {
        ExpressionVariable {
            name: name.to_string(),
        }
    }
}

impl Expression for ExpressionVariable {
    fn execute(&self, ctx: &mut EvalContext) -> ExpressionResult {
        match ctx.global.lookup(&self.name) {
            Some(value) => Ok(value),
            None => Err(format!("Variable '{}' is not defined", self.name)),
        }
    }

    fn is_assignable(&self) -> bool {
        true
    }

    fn resolve_mut<'c>(&self, global: &'c mut GlobalData) -> Result<&'c mut Data, String> {
        global
            .lookup_mut(&self.name, true)
            .ok_or_else(|| format!("Variable '{}' is read-only", self.name))
    }

    fn variable_name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

#[derive(Debug)]
pub struct ExpressionArray {
    pub array: Vec<Box<dyn Expression>>,
}

impl ExpressionArray {
    pub fn new(array: Vec<Box<dyn Expression>>) -> ExpressionArray {
        ExpressionArray { array }
    }
}

impl Expression for ExpressionArray {
    fn execute(&self, ctx: &mut EvalContext) -> ExpressionResult {
        let mut v = Vec::with_capacity(self.array.len());
        for item in &self.array {
            v.push(item.execute(ctx)?);
        }
        Ok(Data::Array(v))
    }
}

#[derive(Debug)]
pub struct ExpressionMap {
    pub members: Vec<(Box<dyn Expression>, Box<dyn Expression>)>,
}

impl ExpressionMap {
    pub fn new(members: Vec<(Box<dyn Expression>, Box<dyn Expression>)>) -> ExpressionMap {
        ExpressionMap { members }
    }
}

impl Expression for ExpressionMap {
    fn execute(&self, ctx: &mut EvalContext) -> ExpressionResult {
        let mut m = DataMap::new();
        for (key, value) in &self.members {
            let k = data_to_string(&key.execute(ctx)?);
            m.insert(k, value.execute(ctx)?);
        }
        Ok(Data::Map(m))
    }
}

#[derive(Debug)]
pub struct ExpressionMemberAccess {
    pub left: Box<dyn Expression>,
    pub member_name: String,
}

impl ExpressionMemberAccess {
    pub fn new(left: Box<dyn Expression>, member_name: String) -> ExpressionMemberAccess {
        ExpressionMemberAccess { left, member_name }
    }

    fn check_name(&self) -> Result<(), String> {
        if self.member_name.starts_with('_') {
            Err(format!(
                "Access to member '{}' is not allowed",
                self.member_name
            ))
        } else {
            Ok(())
        }
    }
}

impl Expression for ExpressionMemberAccess {
    fn execute(&self, ctx: &mut EvalContext) -> ExpressionResult {
        self.check_name()?;
        match self.left.execute(ctx)? {
            Data::Map(m) => match m.get(&self.member_name) {
                Some(member) => Ok(member.clone()),
                None => Err(format!("Member '{}' not found", self.member_name)),
            },
            other => Err(format!("Value '{}' has no members", other)),
        }
    }

    fn is_assignable(&self) -> bool {
        true
    }

    fn resolve_mut<'c>(&self, global: &'c mut GlobalData) -> Result<&'c mut Data, String> {
        self.check_name()?;
        match self.left.resolve_mut(global)? {
            Data::Map(m) => Ok(m.entry(self.member_name.clone()).or_insert(Data::Null)),
            other => Err(format!("Value '{}' has no members", other)),
        }
    }
}

#[derive(Debug)]
pub struct ExpressionIndex {
    pub left: Box<dyn Expression>,
    pub index: Box<dyn Expression>,
}

impl ExpressionIndex {
    pub fn new(left: Box<dyn Expression>, index: Box<dyn Expression>) -> ExpressionIndex {
        ExpressionIndex { left, index }
    }
}

fn index_to_usize(index: &Data, len: usize) -> Result<usize, String> {
    let i = match index {
        Data::Integer(i) => *i,
        Data::Double(d) if d.fract() == 0.0 => *d as i64,
        other => return Err(format!("Illegal index type '{}'", other)),
    };
    let i = if i < 0 { i + len as i64 } else { i };
    if i < 0 || i as usize >= len {
        Err(format!("Index {} out of range (len={})", i, len))
    } else {
        Ok(i as usize)
    }
}

impl Expression for ExpressionIndex {
    fn execute(&self, ctx: &mut EvalContext) -> ExpressionResult {
        let left_value = self.left.execute(ctx)?;
        let index_value = self.index.execute(ctx)?;
        match left_value {
            Data::Array(a) => {
                let i = index_to_usize(&index_value, a.len())?;
                Ok(a[i].clone())
            }
            Data::Map(m) => match &index_value {
                Data::String(key) => m
                    .get(key)
                    .cloned()
                    .ok_or_else(|| format!("Key '{}' not found", key)),
                other => Err(format!("Illegal index type '{}'", other)),
            },
            Data::String(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = index_to_usize(&index_value, chars.len())?;
                Ok(Data::String(chars[i].to_string()))
            }
            other => Err(format!("Can't apply index on value '{}'", other)),
        }
    }

    fn is_assignable(&self) -> bool {
        true
    }

    fn resolve_mut<'c>(&self, global: &'c mut GlobalData) -> Result<&'c mut Data, String> {
        let index_value = {
            let mut ctx = EvalContext::new(&mut *global);
            self.index.execute(&mut ctx)?
        };
        match self.left.resolve_mut(global)? {
            Data::Array(a) => {
                let i = index_to_usize(&index_value, a.len())?;
                Ok(&mut a[i])
            }
            Data::Map(m) => match index_value {
                Data::String(key) => {
                    if key.starts_with('_') {
                        return Err(format!("Access to member '{}' is not allowed", key));
                    }
                    Ok(m.entry(key).or_insert(Data::Null))
                }
                other => Err(format!("Illegal index type '{}'", other)),
            },
            other => Err(format!("Can't apply index on value '{}'", other)),
        }
    }
}

#[derive(Debug)]
pub struct ExpressionOperator {
    pub operator: Operator,
    pub left: Box<dyn Expression>,
    pub right: Box<dyn Expression>,
}

impl ExpressionOperator {
    pub fn new(
        op: Operator,
        left: Box<dyn Expression>,
        right: Box<dyn Expression>,
    ) -> ExpressionOperator {
        ExpressionOperator {
            left,
            right,
            operator: op,
        }
    }
}

impl Expression for ExpressionOperator {
    fn execute(&self, ctx: &mut EvalContext) -> ExpressionResult {
        // Boolean operators short-circuit like the source language does.
        match self.operator {
            Operator::And => {
                let left = self.left.execute(ctx)?;
                if !data_to_boolean(&left) {
                    return Ok(left);
                }
                return self.right.execute(ctx);
            }
            Operator::Or => {
                let left = self.left.execute(ctx)?;
                if data_to_boolean(&left) {
                    return Ok(left);
                }
                return self.right.execute(ctx);
            }
            _ => {}
        }
        let left = self.left.execute(ctx)?;
        let right = self.right.execute(ctx)?;
        operation(&left, &self.operator, &right)
    }
}

#[derive(Debug)]
pub struct ExpressionNot {
    pub right: Box<dyn Expression>,
}

impl ExpressionNot {
    pub fn new(right: Box<dyn Expression>) -> ExpressionNot {
        ExpressionNot { right }
    }
}

impl Expression for ExpressionNot {
    fn execute(&self, ctx: &mut EvalContext) -> ExpressionResult {
        let v = self.right.execute(ctx)?;
        Ok(Data::Boolean(!data_to_boolean(&v)))
    }
}

#[derive(Debug)]
pub struct ExpressionAssign {
    pub left: Box<dyn Expression>,
    pub right: Box<dyn Expression>,
}

impl ExpressionAssign {
    pub fn new(left: Box<dyn Expression>, right: Box<dyn Expression>) -> ExpressionAssign {
        ExpressionAssign { left, right }
    }
}

impl Expression for ExpressionAssign {
    fn execute(&self, ctx: &mut EvalContext) -> ExpressionResult {
        if !self.left.is_assignable() {
            return Err(format!("Can't assign to {:?}", self.left));
        }
        let value = self.right.execute(ctx)?;
        let slot = self.left.resolve_mut(ctx.global)?;
        *slot = value.clone();
        Ok(value)
    }
}

/// `left ?= right`: assigns only when the left side is still undefined.
#[derive(Debug)]
pub struct ExpressionAssignUndefined {
    pub left: Box<dyn Expression>,
    pub right: Box<dyn Expression>,
}

impl ExpressionAssignUndefined {
    pub fn new(left: Box<dyn Expression>, right: Box<dyn Expression>) -> ExpressionAssignUndefined {
        ExpressionAssignUndefined { left, right }
    }
}

impl Expression for ExpressionAssignUndefined {
    fn execute(&self, ctx: &mut EvalContext) -> ExpressionResult {
        if !self.left.is_assignable() {
            return Err(format!("Can't assign to {:?}", self.left));
        }
        if let Ok(existing) = self.left.execute(ctx) {
            return Ok(existing);
        }
        let value = self.right.execute(ctx)?;
        let slot = self.left.resolve_mut(ctx.global)?;
        *slot = value.clone();
        Ok(value)
    }
}

/// Multiple `;`-joined expressions; the value of the last one wins.
#[derive(Debug)]
pub struct ExpressionSequence {
    pub expressions: Vec<Box<dyn Expression>>,
}

impl ExpressionSequence {
    pub fn new(expressions: Vec<Box<dyn Expression>>) -> ExpressionSequence {
        ExpressionSequence { expressions }
    }
}

impl Expression for ExpressionSequence {
    fn execute(&self, ctx: &mut EvalContext) -> ExpressionResult {
        let mut r = Ok(Data::Null);
        for exp in &self.expressions {
            r = exp.execute(ctx);
            r.as_ref().map_err(|e| e.clone())?;
        }
        r
    }
}

/// `isDefined(name)`, resolved at parse time so the lookup itself cannot
/// fail on an undefined variable.
#[derive(Debug)]
pub struct ExpressionIsDefined {
    pub name: String,
}

impl Expression for ExpressionIsDefined {
    fn execute(&self, ctx: &mut EvalContext) -> ExpressionResult {
        Ok(Data::Boolean(ctx.global.lookup(&self.name).is_some()))
    }
}

#[derive(Debug)]
pub struct ExpressionMethod {
    pub method: String,
    pub arguments: Vec<Box<dyn Expression>>,
}

impl ExpressionMethod {
    pub fn new(method: &str, arguments: Vec<Box<dyn Expression>>) -> ExpressionMethod {
        ExpressionMethod {
            method: method.to_string(),
            arguments,
        }
    }
}

impl Expression for ExpressionMethod {
    fn execute(&self, ctx: &mut EvalContext) -> ExpressionResult {
        let mut args = Vec::with_capacity(self.arguments.len());
        for a in &self.arguments {
            args.push(a.execute(ctx)?);
        }
        execute_builtin(self.method.as_str(), &args, ctx)
    }
}

////////////////////////////////////////////////////////////////////////////
// Operations

fn as_double(d: &Data) -> Option<f64> {
    match d {
        Data::Integer(i) => Some(*i as f64),
        Data::Double(v) => Some(*v),
        _ => None,
    }
}

/// Order two values; numbers compare across integer/double, strings and
/// booleans compare within their type. Everything else is incomparable.
pub fn compare_data(left: &Data, right: &Data) -> Result<Ordering, String> {
    match (left, right) {
        (Data::Integer(a), Data::Integer(b)) => Ok(a.cmp(b)),
        (Data::String(a), Data::String(b)) => Ok(a.cmp(b)),
        (Data::Boolean(a), Data::Boolean(b)) => Ok(a.cmp(b)),
        _ => match (as_double(left), as_double(right)) {
            (Some(a), Some(b)) => a
                .partial_cmp(&b)
                .ok_or_else(|| "Values are not comparable".to_string()),
            _ => Err(format!("Can't compare '{}' and '{}'", left, right)),
        },
    }
}

fn values_equal(left: &Data, right: &Data) -> bool {
    match (as_double(left), as_double(right)) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

pub fn operation(left: &Data, op: &Operator, right: &Data) -> ExpressionResult {
    match op {
        Operator::Plus => match (left, right) {
            (Data::Integer(a), Data::Integer(b)) => Ok(Data::Integer(a + b)),
            (Data::String(a), Data::String(b)) => Ok(Data::String(format!("{}{}", a, b))),
            (Data::Array(a), Data::Array(b)) => {
                let mut v = a.clone();
                v.extend(b.iter().cloned());
                Ok(Data::Array(v))
            }
            _ => match (as_double(left), as_double(right)) {
                (Some(a), Some(b)) => Ok(Data::Double(a + b)),
                _ => Err(format!("Can't add '{}' and '{}'", left, right)),
            },
        },
        Operator::Minus => match (left, right) {
            (Data::Integer(a), Data::Integer(b)) => Ok(Data::Integer(a - b)),
            _ => match (as_double(left), as_double(right)) {
                (Some(a), Some(b)) => Ok(Data::Double(a - b)),
                _ => Err(format!("Can't subtract '{}' from '{}'", right, left)),
            },
        },
        Operator::Multiply => match (left, right) {
            (Data::Integer(a), Data::Integer(b)) => Ok(Data::Integer(a * b)),
            _ => match (as_double(left), as_double(right)) {
                (Some(a), Some(b)) => Ok(Data::Double(a * b)),
                _ => Err(format!("Can't multiply '{}' and '{}'", left, right)),
            },
        },
        Operator::Divide => match (as_double(left), as_double(right)) {
            (Some(_), Some(b)) if b == 0.0 => Err("Division by zero".to_string()),
            (Some(a), Some(b)) => Ok(Data::Double(a / b)),
            _ => Err(format!("Can't divide '{}' by '{}'", left, right)),
        },
        Operator::Modulus => match (left, right) {
            (Data::Integer(_), Data::Integer(0)) => Err("Division by zero".to_string()),
            (Data::Integer(a), Data::Integer(b)) => Ok(Data::Integer(a % b)),
            _ => match (as_double(left), as_double(right)) {
                (Some(_), Some(b)) if b == 0.0 => Err("Division by zero".to_string()),
                (Some(a), Some(b)) => Ok(Data::Double(a % b)),
                _ => Err(format!("Can't apply '%' on '{}' and '{}'", left, right)),
            },
        },
        Operator::Less => compare_data(left, right).map(|o| Data::Boolean(o == Ordering::Less)),
        Operator::LessEqual => {
            compare_data(left, right).map(|o| Data::Boolean(o != Ordering::Greater))
        }
        Operator::Greater => {
            compare_data(left, right).map(|o| Data::Boolean(o == Ordering::Greater))
        }
        Operator::GreaterEqual => {
            compare_data(left, right).map(|o| Data::Boolean(o != Ordering::Less))
        }
        Operator::Equal => Ok(Data::Boolean(values_equal(left, right))),
        Operator::NotEqual => Ok(Data::Boolean(!values_equal(left, right))),
        Operator::And | Operator::Or | Operator::Not | Operator::Assign
        | Operator::AssignUndefined => {
            // Handled by explicit Expression implementations.
            Err("Internal Error".to_string())
        }
    }
}

////////////////////////////////////////////////////////////////////////////
// Builtin functions

/// Upper bound for generated sequences, keeping evaluation time-bounded.
const MAX_RANGE: i64 = 100_000;

fn require_args(name: &str, args: &[Data], n: usize) -> Result<(), String> {
    if args.len() == n {
        Ok(())
    } else {
        Err(format!("Wrong number of arguments for '{}'", name))
    }
}

fn numeric_arg(name: &str, d: &Data) -> Result<f64, String> {
    as_double(d).ok_or_else(|| format!("Wrong argument type for '{}'", name))
}

fn value_len(name: &str, d: &Data) -> Result<i64, String> {
    match d {
        Data::String(s) => Ok(s.chars().count() as i64),
        Data::Array(a) => Ok(a.len() as i64),
        Data::Map(m) => Ok(m.len() as i64),
        _ => Err(format!("Wrong argument type for '{}'", name)),
    }
}

/// Elements of an iterable value: arrays as-is, strings per character,
/// maps by key.
fn sequence_items(name: &str, d: &Data) -> Result<Vec<Data>, String> {
    match d {
        Data::Array(a) => Ok(a.clone()),
        Data::String(s) => Ok(s.chars().map(|c| Data::String(c.to_string())).collect()),
        Data::Map(m) => Ok(m.keys().map(|k| Data::String(k.clone())).collect()),
        _ => Err(format!("Wrong argument type for '{}'", name)),
    }
}

fn min_max(name: &str, args: &[Data], want_max: bool) -> ExpressionResult {
    let items: &[Data] = match args {
        [Data::Array(a)] => a.as_slice(),
        other => other,
    };
    if items.is_empty() {
        return Err(format!("'{}' of an empty sequence", name));
    }
    let mut best = items[0].clone();
    for item in &items[1..] {
        let ord = compare_data(item, &best)?;
        if (want_max && ord == Ordering::Greater) || (!want_max && ord == Ordering::Less) {
            best = item.clone();
        }
    }
    Ok(best)
}

fn execute_builtin(name: &str, args: &[Data], ctx: &mut EvalContext) -> ExpressionResult {
    match name {
        "In" => {
            require_args(name, args, 1)?;
            match &args[0] {
                Data::String(state_name) => Ok(Data::Boolean(ctx.global.in_state(state_name))),
                _ => Err("Illegal argument type for 'In'".to_string()),
            }
        }
        "abs" => {
            require_args(name, args, 1)?;
            match &args[0] {
                Data::Integer(v) => Ok(Data::Integer(v.abs())),
                Data::Double(v) => Ok(Data::Double(v.abs())),
                _ => Err("Wrong argument type for 'abs'".to_string()),
            }
        }
        "len" | "length" => {
            require_args(name, args, 1)?;
            value_len(name, &args[0]).map(Data::Integer)
        }
        "min" => min_max(name, args, false),
        "max" => min_max(name, args, true),
        "sum" => {
            require_args(name, args, 1)?;
            match &args[0] {
                Data::Array(a) => {
                    let mut int_sum = 0i64;
                    let mut double_sum = 0f64;
                    let mut is_double = false;
                    for item in a {
                        match item {
                            Data::Integer(i) => {
                                int_sum += i;
                                double_sum += *i as f64;
                            }
                            Data::Double(d) => {
                                is_double = true;
                                double_sum += d;
                            }
                            other => {
                                return Err(format!("Can't sum value '{}'", other));
                            }
                        }
                    }
                    if is_double {
                        Ok(Data::Double(double_sum))
                    } else {
                        Ok(Data::Integer(int_sum))
                    }
                }
                _ => Err("Wrong argument type for 'sum'".to_string()),
            }
        }
        "sorted" => {
            require_args(name, args, 1)?;
            match &args[0] {
                Data::Array(a) => {
                    let mut v = a.clone();
                    let mut failure: Option<String> = None;
                    v.sort_by(|x, y| match compare_data(x, y) {
                        Ok(o) => o,
                        Err(e) => {
                            failure.get_or_insert(e);
                            Ordering::Equal
                        }
                    });
                    match failure {
                        Some(e) => Err(e),
                        None => Ok(Data::Array(v)),
                    }
                }
                _ => Err("Wrong argument type for 'sorted'".to_string()),
            }
        }
        "range" => {
            if args.is_empty() || args.len() > 3 {
                return Err("Wrong number of arguments for 'range'".to_string());
            }
            let as_int = |d: &Data| -> Result<i64, String> {
                match d {
                    Data::Integer(i) => Ok(*i),
                    _ => Err("Wrong argument type for 'range'".to_string()),
                }
            };
            let (start, stop, step) = match args.len() {
                1 => (0, as_int(&args[0])?, 1),
                2 => (as_int(&args[0])?, as_int(&args[1])?, 1),
                _ => (as_int(&args[0])?, as_int(&args[1])?, as_int(&args[2])?),
            };
            if step == 0 {
                return Err("'range' step must not be zero".to_string());
            }
            let mut v = Vec::new();
            let mut i = start;
            while (step > 0 && i < stop) || (step < 0 && i > stop) {
                if v.len() as i64 >= MAX_RANGE {
                    return Err("'range' result too large".to_string());
                }
                v.push(Data::Integer(i));
                i += step;
            }
            Ok(Data::Array(v))
        }
        "enumerate" => {
            require_args(name, args, 1)?;
            match &args[0] {
                Data::Array(a) => Ok(Data::Array(
                    a.iter()
                        .enumerate()
                        .map(|(i, v)| Data::Array(vec![Data::Integer(i as i64), v.clone()]))
                        .collect(),
                )),
                _ => Err("Wrong argument type for 'enumerate'".to_string()),
            }
        }
        "zip" => {
            require_args(name, args, 2)?;
            match (&args[0], &args[1]) {
                (Data::Array(a), Data::Array(b)) => Ok(Data::Array(
                    a.iter()
                        .zip(b.iter())
                        .map(|(x, y)| Data::Array(vec![x.clone(), y.clone()]))
                        .collect(),
                )),
                _ => Err("Wrong argument types for 'zip'".to_string()),
            }
        }
        "bool" => {
            require_args(name, args, 1)?;
            Ok(Data::Boolean(data_to_boolean(&args[0])))
        }
        "int" => {
            require_args(name, args, 1)?;
            match &args[0] {
                Data::Integer(i) => Ok(Data::Integer(*i)),
                Data::Double(d) => Ok(Data::Integer(*d as i64)),
                Data::Boolean(b) => Ok(Data::Integer(*b as i64)),
                Data::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Data::Integer)
                    .map_err(|_| format!("Can't convert '{}' to int", s)),
                other => Err(format!("Can't convert '{}' to int", other)),
            }
        }
        "float" => {
            require_args(name, args, 1)?;
            match &args[0] {
                Data::Integer(i) => Ok(Data::Double(*i as f64)),
                Data::Double(d) => Ok(Data::Double(*d)),
                Data::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Data::Double)
                    .map_err(|_| format!("Can't convert '{}' to float", s)),
                other => Err(format!("Can't convert '{}' to float", other)),
            }
        }
        "str" | "toString" => {
            require_args(name, args, 1)?;
            Ok(Data::String(data_to_string(&args[0])))
        }
        // The value model has no dedicated set or tuple variant; both
        // construct ordinary arrays, `set` with duplicates removed.
        "list" | "tuple" => {
            if args.is_empty() {
                return Ok(Data::Array(Vec::new()));
            }
            require_args(name, args, 1)?;
            sequence_items(name, &args[0]).map(Data::Array)
        }
        "set" => {
            if args.is_empty() {
                return Ok(Data::Array(Vec::new()));
            }
            require_args(name, args, 1)?;
            let mut unique: Vec<Data> = Vec::new();
            for item in sequence_items(name, &args[0])? {
                if !unique.contains(&item) {
                    unique.push(item);
                }
            }
            Ok(Data::Array(unique))
        }
        "dict" => {
            if args.is_empty() {
                return Ok(Data::Map(DataMap::new()));
            }
            require_args(name, args, 1)?;
            match &args[0] {
                Data::Map(m) => Ok(Data::Map(m.clone())),
                Data::Array(pairs) => {
                    let mut m = DataMap::new();
                    for pair in pairs {
                        match pair {
                            Data::Array(kv) if kv.len() == 2 => {
                                m.insert(data_to_string(&kv[0]), kv[1].clone());
                            }
                            other => {
                                return Err(format!(
                                    "'dict' needs key/value pairs, found '{}'",
                                    other
                                ));
                            }
                        }
                    }
                    Ok(Data::Map(m))
                }
                _ => Err("Wrong argument type for 'dict'".to_string()),
            }
        }
        "indexOf" => {
            require_args(name, args, 2)?;
            match (&args[0], &args[1]) {
                (Data::String(s1), Data::String(s2)) => Ok(Data::Integer(
                    s1.find(s2.as_str()).map_or(-1, |idx| idx as i64),
                )),
                _ => Err("Illegal argument types for 'indexOf'".to_string()),
            }
        }
        "slice" => {
            require_args(name, args, 3)?;
            let len = value_len(name, &args[0])?;
            let clamp = |d: &Data| -> Result<usize, String> {
                let mut i = match d {
                    Data::Integer(i) => *i,
                    _ => return Err("Wrong argument type for 'slice'".to_string()),
                };
                if i < 0 {
                    i += len;
                }
                Ok(i.clamp(0, len) as usize)
            };
            let start = clamp(&args[1])?;
            let end = clamp(&args[2])?;
            match &args[0] {
                Data::Array(a) => Ok(Data::Array(if start < end {
                    a[start..end].to_vec()
                } else {
                    Vec::new()
                })),
                Data::String(s) => {
                    let chars: Vec<char> = s.chars().collect();
                    Ok(Data::String(if start < end {
                        chars[start..end].iter().collect()
                    } else {
                        String::new()
                    }))
                }
                _ => Err("Wrong argument type for 'slice'".to_string()),
            }
        }
        "math.sqrt" => {
            require_args(name, args, 1)?;
            Ok(Data::Double(numeric_arg(name, &args[0])?.sqrt()))
        }
        "math.floor" => {
            require_args(name, args, 1)?;
            Ok(Data::Integer(numeric_arg(name, &args[0])?.floor() as i64))
        }
        "math.ceil" => {
            require_args(name, args, 1)?;
            Ok(Data::Integer(numeric_arg(name, &args[0])?.ceil() as i64))
        }
        "math.pow" => {
            require_args(name, args, 2)?;
            Ok(Data::Double(
                numeric_arg(name, &args[0])?.powf(numeric_arg(name, &args[1])?),
            ))
        }
        "math.fabs" => {
            require_args(name, args, 1)?;
            Ok(Data::Double(numeric_arg(name, &args[0])?.abs()))
        }
        "math.sin" => {
            require_args(name, args, 1)?;
            Ok(Data::Double(numeric_arg(name, &args[0])?.sin()))
        }
        "math.cos" => {
            require_args(name, args, 1)?;
            Ok(Data::Double(numeric_arg(name, &args[0])?.cos()))
        }
        "round" => {
            require_args(name, args, 1)?;
            match &args[0] {
                Data::Integer(i) => Ok(Data::Integer(*i)),
                Data::Double(d) => Ok(Data::Integer(d.round() as i64)),
                _ => Err("Wrong argument type for 'round'".to_string()),
            }
        }
        _ => Err(format!("Unknown function '{}'", name)),
    }
}
