//! Defines the data variant type, the scoped data stores and the API used
//! by the interpreter to access the data models.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::path::PathBuf;

use lazy_static::lazy_static;
use regex::Regex;

use crate::common::{error, warn};
use crate::events::{DelayQueue, Event, Queue};
use crate::fsm::{
    CommonContent, Fsm, HashTable, InvokeId, OrderedSet, Parameter, SessionId, StateId,
};
use crate::invoke::ChildSession;
use crate::tracer::StepAccumulator;

pub const NULL_DATAMODEL: &str = "null";
pub const EXPRESSION_DATAMODEL: &str = "expression";

/// The original schema marks charts for its host-language data model with
/// this value; they run on the sandboxed expression engine here.
pub const PYTHON_DATAMODEL: &str = "python";

pub const SCXML_INVOKE_TYPE: &str = "http://www.w3.org/TR/scxml";

/// *W3C says*: Processors MAY define short form notations as an authoring
/// convenience (e.g., "scxml" as equivalent to http://www.w3.org/TR/scxml/).
pub const SCXML_INVOKE_TYPE_SHORT: &str = "scxml";
pub const SCJSON_INVOKE_TYPE_SHORT: &str = "scjson";

/// Name of system variable "_sessionid".
pub const SESSION_ID_VARIABLE_NAME: &str = "_sessionid";

/// Name of system variable "_name".
pub const SESSION_NAME_VARIABLE_NAME: &str = "_name";

/// Name of system variable "_event".
pub const EVENT_VARIABLE_NAME: &str = "_event";

pub type DataMap = BTreeMap<String, Data>;

/// Data variant used to handle values in a type-safe but
/// datamodel-agnostic way.
#[derive(Clone, PartialEq)]
pub enum Data {
    Integer(i64),
    Double(f64),
    String(String),
    Boolean(bool),
    Array(Vec<Data>),
    Map(DataMap),
    Null,
    /// Unevaluated expression source, as authored in a `data` element.
    Source(String),
}

impl Debug for Data {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl Display for Data {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self {
            Data::String(v) => write!(f, "'{}'", v),
            Data::Integer(v) => write!(f, "{}", v),
            Data::Double(v) => write!(f, "{}", v),
            Data::Boolean(v) => write!(f, "{}", v),
            Data::Array(v) => {
                write!(f, "[")?;
                let mut first = true;
                for i in v {
                    if first {
                        first = false;
                    } else {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", i)?;
                }
                write!(f, "]")
            }
            Data::Map(v) => {
                write!(f, "{{")?;
                let mut first = true;
                for (k, d) in v {
                    if first {
                        first = false;
                    } else {
                        write!(f, ",")?;
                    }
                    write!(f, "'{}':{}", k, d)?;
                }
                write!(f, "}}")
            }
            Data::Null => write!(f, "null"),
            Data::Source(v) => write!(f, "{}", v),
        }
    }
}

/// Converts a JSON value into the runtime variant type.
pub fn json_to_data(v: &serde_json::Value) -> Data {
    match v {
        serde_json::Value::Null => Data::Null,
        serde_json::Value::Bool(b) => Data::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Data::Integer(i)
            } else {
                Data::Double(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Data::String(s.clone()),
        serde_json::Value::Array(a) => Data::Array(a.iter().map(json_to_data).collect()),
        serde_json::Value::Object(o) => {
            let mut m = DataMap::new();
            for (k, val) in o {
                m.insert(k.clone(), json_to_data(val));
            }
            Data::Map(m)
        }
    }
}

/// Converts a runtime value into JSON, for traces and event payloads.
pub fn data_to_json(d: &Data) -> serde_json::Value {
    match d {
        Data::Integer(i) => serde_json::Value::from(*i),
        Data::Double(v) => {
            serde_json::Number::from_f64(*v).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }
        Data::String(s) | Data::Source(s) => serde_json::Value::String(s.clone()),
        Data::Boolean(b) => serde_json::Value::Bool(*b),
        Data::Array(a) => serde_json::Value::Array(a.iter().map(data_to_json).collect()),
        Data::Map(m) => {
            let mut o = serde_json::Map::new();
            for (k, v) in m {
                o.insert(k.clone(), data_to_json(v));
            }
            serde_json::Value::Object(o)
        }
        Data::Null => serde_json::Value::Null,
    }
}

/// The raw string form used by `<log>` output (strings unquoted).
pub fn data_to_string(d: &Data) -> String {
    match d {
        Data::String(s) | Data::Source(s) => s.clone(),
        other => format!("{}", other),
    }
}

/// Truth value of a datamodel value, used for conditions.
pub fn data_to_boolean(d: &Data) -> bool {
    match d {
        Data::Boolean(b) => *b,
        Data::Integer(i) => *i != 0,
        Data::Double(v) => *v != 0.0,
        Data::String(s) | Data::Source(s) => !s.is_empty(),
        Data::Array(a) => !a.is_empty(),
        Data::Map(m) => !m.is_empty(),
        Data::Null => false,
    }
}

#[derive(Debug, Default)]
pub struct DataStore {
    pub values: HashMap<String, Data>,
}

impl DataStore {
    pub fn new() -> DataStore {
        DataStore {
            values: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Data> {
        self.values.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Data> {
        self.values.get_mut(key)
    }

    pub fn get_mut_or_insert(&mut self, key: &str) -> &mut Data {
        self.values.entry(key.to_string()).or_insert(Data::Null)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn set(&mut self, key: &str, data: Data) {
        self.values.insert(key.to_string(), data);
    }
}

/// *W3C says*:
/// ## Global variables
/// The following variables are global from the point of view of the
/// algorithm. Their values will be set in the procedure interpret().
///
/// As the data model needs access to most of this state during expression
/// evaluation, the structure is owned by the data model implementation.
/// The interpreter is single-threaded; no locking is involved.
pub struct GlobalData {
    pub configuration: OrderedSet<StateId>,
    pub states_to_invoke: OrderedSet<StateId>,
    pub history_value: HashTable<StateId, OrderedSet<StateId>>,
    pub running: bool,

    pub internal_queue: Queue<Event>,
    pub external_queue: Queue<Event>,
    pub delays: DelayQueue,

    /// Document-global data.
    pub data: DataStore,
    /// Per-state data frames, only for states that declare a datamodel.
    pub local_data: HashMap<StateId, DataStore>,
    /// Active lookup chain for the expression being evaluated, innermost
    /// state first. Writes go to the innermost frame owning the name, else
    /// to the global store.
    pub scope: Vec<StateId>,
    pub state_names: HashMap<String, StateId>,

    pub session_id: SessionId,
    pub session_name: String,
    pub current_event: Option<Event>,

    /// Running child sessions, keyed by invoke id.
    pub child_sessions: HashMap<InvokeId, ChildSession>,
    /// Declaration order of running child sessions.
    pub child_order: Vec<InvokeId>,
    /// Events this session produced for its parent (`#_parent` sends).
    pub outbox: Vec<Event>,
    pub is_child: bool,
    /// Set if this session was created as result of some invoke.
    pub caller_invoke_id: Option<InvokeId>,

    pub allow_unsafe_script: bool,
    pub base_dir: Option<PathBuf>,

    /// Payload of the root final state, once reached.
    pub done_data: Option<Data>,
    /// Names of the active states at the moment the interpreter exited.
    pub final_configuration: Option<Vec<String>>,

    pub generated_id_count: u32,
    pub step: StepAccumulator,
    pub load_warnings: Vec<String>,
}

impl Default for GlobalData {
    fn default() -> Self {
        GlobalData::new()
    }
}

impl GlobalData {
    pub fn new() -> GlobalData {
        GlobalData {
            configuration: OrderedSet::new(),
            states_to_invoke: OrderedSet::new(),
            history_value: HashTable::new(),
            running: false,
            internal_queue: Queue::new(),
            external_queue: Queue::new(),
            delays: DelayQueue::new(),
            data: DataStore::new(),
            local_data: HashMap::new(),
            scope: Vec::new(),
            state_names: HashMap::new(),
            session_id: 0,
            session_name: String::new(),
            current_event: None,
            child_sessions: HashMap::new(),
            child_order: Vec::new(),
            outbox: Vec::new(),
            is_child: false,
            caller_invoke_id: None,
            allow_unsafe_script: false,
            base_dir: None,
            done_data: None,
            final_configuration: None,
            generated_id_count: 0,
            step: StepAccumulator::default(),
            load_warnings: Vec::new(),
        }
    }

    pub fn enqueue_internal(&mut self, event: Event) {
        self.internal_queue.enqueue(event);
    }

    pub fn next_generated_id(&mut self) -> u32 {
        self.generated_id_count += 1;
        self.generated_id_count
    }

    /// Resolve a name through the active scope chain, then the global store.
    pub fn lookup(&self, name: &str) -> Option<Data> {
        match name {
            EVENT_VARIABLE_NAME => {
                return Some(match &self.current_event {
                    Some(e) => e.as_data(),
                    None => Data::Null,
                })
            }
            SESSION_ID_VARIABLE_NAME => return Some(Data::String(self.session_id.to_string())),
            SESSION_NAME_VARIABLE_NAME => return Some(Data::String(self.session_name.clone())),
            _ => {}
        }
        for sid in &self.scope {
            if let Some(frame) = self.local_data.get(sid) {
                if let Some(v) = frame.get(name) {
                    return Some(v.clone());
                }
            }
        }
        self.data.get(name).cloned()
    }

    /// Mutable slot for `name`. The innermost frame that owns the name wins;
    /// otherwise the global store is used (creating the entry when `create`).
    pub fn lookup_mut(&mut self, name: &str, create: bool) -> Option<&mut Data> {
        if name.starts_with('_') {
            // System variables are read-only.
            return None;
        }
        let mut owner: Option<StateId> = None;
        for sid in &self.scope {
            if self
                .local_data
                .get(sid)
                .map_or(false, |frame| frame.contains(name))
            {
                owner = Some(*sid);
                break;
            }
        }
        match owner {
            Some(sid) => self.local_data.get_mut(&sid).unwrap().get_mut(name),
            None => {
                if self.data.contains(name) {
                    self.data.get_mut(name)
                } else if create {
                    Some(self.data.get_mut_or_insert(name))
                } else {
                    None
                }
            }
        }
    }

    /// Scoped write; records the change for the step's datamodel delta.
    pub fn set_scoped(&mut self, name: &str, value: Data) {
        if let Some(slot) = self.lookup_mut(name, true) {
            *slot = value.clone();
            self.step.record_delta(name, &value);
        }
    }

    pub fn in_state(&self, state_name: &str) -> bool {
        match self.state_names.get(state_name) {
            Some(sid) => self.configuration.is_member(sid),
            None => false,
        }
    }
}

/// Data model interface trait.
/// *W3C says*:
/// The Data Model offers the capability of storing, reading, and modifying
/// a set of data that is internal to the state machine. This specification
/// does not mandate any specific data model.
#[allow(non_snake_case)]
pub trait Datamodel {
    fn global(&mut self) -> &mut GlobalData;
    fn global_s(&self) -> &GlobalData;

    /// Get the name of the data model as defined by the `datamodel`
    /// attribute.
    fn get_name(&self) -> &str;

    /// Initialize the data frame of one state (the pseudo root initializes
    /// the document-global store). Called at load for early binding, at
    /// entry for late binding.
    fn initializeDataModel(&mut self, fsm: &Fsm, state: StateId);

    /// Sets a global variable without scope resolution.
    fn set(&mut self, name: &str, data: Data);

    /// Sets the system variable `_event`.
    fn set_event(&mut self, event: &Event) {
        self.global().current_event = Some(event.clone());
    }

    /// Execute an assign expression. The location must resolve through
    /// existing containers; only the final map key may be created.
    fn assign(&mut self, location: &str, expr: &str) -> Result<(), String>;

    /// Gets a value by a location expression.
    fn get_by_location(&mut self, location: &str) -> Result<Data, String>;

    /// Evaluates an expression and returns the resulting value.
    fn execute(&mut self, script: &str) -> Result<Data, String>;

    /// *W3C says*:
    /// The set of operators in conditional expressions varies depending on
    /// the data model, but all data models must support the 'In()'
    /// predicate, which takes a state ID as its argument and returns true
    /// if the state machine is in that state. Conditional expressions in
    /// conformant SCXML documents should not have side effects.
    fn execute_condition(&mut self, script: &str) -> Result<bool, String>;

    /// Executes a for-each loop.
    fn execute_for_each(
        &mut self,
        array_expression: &str,
        item: &str,
        index: &str,
        execute_body: &mut dyn FnMut(&mut dyn Datamodel) -> bool,
    ) -> bool;

    /// "log" function, used for `<log>` content.
    fn log(&mut self, label: &str, msg: &str) {
        if label.is_empty() {
            crate::common::info!("{}", msg);
        } else {
            crate::common::info!("{}: {}", label, msg);
        }
    }

    /// *W3C says*:
    /// Indicates that an error internal to the execution of the document
    /// has occurred, such as one arising from expression evaluation.
    fn internal_error_execution(&mut self, detail: &str) {
        let event = Event::error_execution(detail);
        let global = self.global();
        global.step.errors.push(detail.to_string());
        global.enqueue_internal(event);
    }

    /// *W3C says*:
    /// Indicates that an error has occurred while trying to communicate
    /// with an external entity.
    fn internal_error_communication(&mut self, detail: &str) {
        let event = Event::error_communication(detail);
        let global = self.global();
        global.step.errors.push(detail.to_string());
        global.enqueue_internal(event);
    }

    /// Convenient function to retrieve a value that has an alternative
    /// expression form. If `value_expression` is empty, `value` is returned
    /// as is; otherwise the expression is evaluated.
    fn get_expression_alternative_value(
        &mut self,
        value: &str,
        value_expression: &str,
    ) -> Result<String, String> {
        if value_expression.is_empty() {
            Ok(value.to_string())
        } else {
            self.execute(value_expression).map(|d| data_to_string(&d))
        }
    }

    /// Evaluates a content element. Returns the literal content or the
    /// result of the expression.
    ///
    /// *W3C says*:
    /// If the evaluation of 'expr' produces an error, the Processor must
    /// place error.execution in the internal event queue and use the empty
    /// string as the value of the `<content>` element.
    fn evaluate_content(&mut self, content: &Option<CommonContent>) -> Option<Data> {
        match content {
            None => None,
            Some(ct) => match &ct.content_expr {
                None => ct.content.as_ref().map(|text| {
                    match serde_json::from_str::<serde_json::Value>(text) {
                        Ok(v) => json_to_data(&v),
                        Err(_) => Data::String(text.clone()),
                    }
                }),
                Some(expr) => match self.execute(expr.as_str()) {
                    Err(msg) => {
                        error!("content expr '{}' is invalid ({})", expr, msg);
                        self.internal_error_execution(&msg);
                        None
                    }
                    Ok(value) => Some(value),
                },
            },
        }
    }

    /// Evaluates a list of param elements into name/value pairs.
    ///
    /// *W3C says*:
    /// If the 'location' attribute does not refer to a valid location in
    /// the data model, or if the evaluation of 'expr' produces an error,
    /// the SCXML Processor must place the error 'error.execution' on the
    /// internal event queue and must ignore the name and value.
    fn evaluate_params(&mut self, params: &Option<Vec<Parameter>>, values: &mut Vec<(String, Data)>) {
        if let Some(params) = params {
            for param in params {
                if !param.location.is_empty() {
                    match self.get_by_location(&param.location) {
                        Err(msg) => {
                            error!("location of param '{}' is invalid ({})", param.name, msg);
                            self.internal_error_execution(&msg);
                        }
                        Ok(value) => {
                            values.push((param.name.clone(), value));
                        }
                    }
                } else if !param.expr.is_empty() {
                    match self.execute(param.expr.as_str()) {
                        Err(msg) => {
                            error!("expr of param '{}' is invalid ({})", param.name, msg);
                            self.internal_error_execution(&msg);
                        }
                        Ok(value) => {
                            values.push((param.name.clone(), value));
                        }
                    }
                }
            }
        }
    }
}

/// Creates the data model named by the document's `datamodel` attribute.
/// Unknown names fall back to the expression engine with a warning.
pub fn create_datamodel(name: &str, global: GlobalData) -> Box<dyn Datamodel> {
    match name.to_lowercase().as_str() {
        NULL_DATAMODEL => Box::new(NullDatamodel::new(global)),
        "" | EXPRESSION_DATAMODEL | PYTHON_DATAMODEL => {
            Box::new(crate::expression_engine::ExpressionDatamodel::new(global))
        }
        other => {
            warn!("Unsupported datamodel '{}', using the expression engine", other);
            Box::new(crate::expression_engine::ExpressionDatamodel::new(global))
        }
    }
}

/// ## W3C says:
/// ### B.1 The Null Data Model
/// The value "null" for the 'datamodel' attribute results in an absent or
/// empty data model. The boolean expression language consists of the In
/// predicate only. It has the form 'In(id)', where id is the id of a state
/// in the enclosing state machine.
pub struct NullDatamodel {
    pub global: GlobalData,
}

impl NullDatamodel {
    pub fn new(global: GlobalData) -> NullDatamodel {
        NullDatamodel { global }
    }
}

#[allow(non_snake_case)]
impl Datamodel for NullDatamodel {
    fn global(&mut self) -> &mut GlobalData {
        &mut self.global
    }

    fn global_s(&self) -> &GlobalData {
        &self.global
    }

    fn get_name(&self) -> &str {
        NULL_DATAMODEL
    }

    fn initializeDataModel(&mut self, _fsm: &Fsm, _state: StateId) {
        // nothing to do
    }

    fn set(&mut self, _name: &str, _data: Data) {
        // nothing to do
    }

    fn assign(&mut self, _location: &str, _expr: &str) -> Result<(), String> {
        Err("no location expressions in the null datamodel".to_string())
    }

    fn get_by_location(&mut self, _location: &str) -> Result<Data, String> {
        Err("no location expressions in the null datamodel".to_string())
    }

    fn execute(&mut self, _script: &str) -> Result<Data, String> {
        Err("no value expressions in the null datamodel".to_string())
    }

    /// *W3C says*:
    /// The boolean expression language consists of the In predicate only.
    /// The predicate must return 'true' if and only if that state is in the
    /// current state configuration.
    fn execute_condition(&mut self, script: &str) -> Result<bool, String> {
        lazy_static! {
            static ref IN_RE: Regex = Regex::new(r"In\((.*)\)").unwrap();
        }
        let caps = IN_RE.captures(script);
        match caps {
            None => Ok(false),
            Some(caps) => {
                let mut value = caps.get(1).map_or("", |m| m.as_str()).trim();
                if (value.starts_with('\'') && value.ends_with('\''))
                    || (value.starts_with('"') && value.ends_with('"'))
                {
                    value = &value[1..value.len() - 1];
                }
                Ok(self.global.in_state(value))
            }
        }
    }

    fn execute_for_each(
        &mut self,
        _array_expression: &str,
        _item: &str,
        _index: &str,
        _execute_body: &mut dyn FnMut(&mut dyn Datamodel) -> bool,
    ) -> bool {
        // foreach is not supported in the null datamodel
        false
    }
}
