//! Parser part of the sandboxed expression engine.
//! Builds a reusable AST from the lexer's token stream.

use crate::datamodel::{Data, GlobalData};
use crate::expression_engine::expressions::{
    EvalContext, Expression, ExpressionArray, ExpressionAssign, ExpressionAssignUndefined,
    ExpressionConstant, ExpressionIndex, ExpressionIsDefined, ExpressionMap,
    ExpressionMemberAccess, ExpressionMethod, ExpressionNot, ExpressionOperator, ExpressionResult,
    ExpressionSequence, ExpressionVariable,
};
use crate::expression_engine::lexer::{ExpressionLexer, NumericToken, Operator, Token};

/// Static tool struct to process expressions.
pub struct ExpressionParser {}

impl ExpressionParser {
    /// Parse an expression, returning a re-usable expression tree.
    pub fn parse(text: &str) -> Result<Box<dyn Expression>, String> {
        let tokens = ExpressionLexer::new(text).tokenize()?;
        let mut parser = Parser { tokens, pos: 0 };
        let expression = parser.parse_program()?;
        match parser.peek() {
            Token::EOE => Ok(expression),
            other => Err(format!("Unexpected '{}'", other)),
        }
    }

    /// Parses and executes an expression. If possible, please use `parse`
    /// and re-use the parsed expression.
    pub fn execute(source: &str, global: &mut GlobalData) -> ExpressionResult {
        let expression = Self::parse(source)?;
        let mut ctx = EvalContext::new(global);
        expression.execute(&mut ctx)
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

fn binary_precedence(op: &Operator) -> Option<u8> {
    match op {
        Operator::Assign | Operator::AssignUndefined => Some(1),
        Operator::Or => Some(2),
        Operator::And => Some(3),
        Operator::Equal | Operator::NotEqual => Some(4),
        Operator::Less | Operator::LessEqual | Operator::Greater | Operator::GreaterEqual => {
            Some(5)
        }
        Operator::Plus | Operator::Minus => Some(6),
        Operator::Multiply | Operator::Divide | Operator::Modulus => Some(7),
        Operator::Not => None,
    }
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::EOE)
    }

    fn next(&mut self) -> Token {
        let t = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect_bracket(&mut self, c: char) -> Result<(), String> {
        match self.next() {
            Token::Bracket(b) if b == c => Ok(()),
            other => Err(format!("Expected '{}', found '{}'", c, other)),
        }
    }

    /// One or more `;`-joined expressions.
    fn parse_program(&mut self) -> Result<Box<dyn Expression>, String> {
        let mut expressions: Vec<Box<dyn Expression>> = Vec::new();
        loop {
            if *self.peek() == Token::EOE {
                break;
            }
            expressions.push(self.parse_expression(1)?);
            if *self.peek() == Token::ExpressionSeparator() {
                self.next();
                continue;
            }
            break;
        }
        match expressions.len() {
            0 => Err("Empty expression".to_string()),
            1 => Ok(expressions.pop().unwrap()),
            _ => Ok(Box::new(ExpressionSequence::new(expressions))),
        }
    }

    /// Precedence-climbing over binary operators.
    fn parse_expression(&mut self, min_precedence: u8) -> Result<Box<dyn Expression>, String> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Operator(op) => op.clone(),
                _ => break,
            };
            let precedence = match binary_precedence(&op) {
                Some(p) if p >= min_precedence => p,
                _ => break,
            };
            self.next();
            match op {
                // Assignment is right-associative.
                Operator::Assign => {
                    let right = self.parse_expression(precedence)?;
                    left = Box::new(ExpressionAssign::new(left, right));
                }
                Operator::AssignUndefined => {
                    let right = self.parse_expression(precedence)?;
                    left = Box::new(ExpressionAssignUndefined::new(left, right));
                }
                _ => {
                    let right = self.parse_expression(precedence + 1)?;
                    left = Box::new(ExpressionOperator::new(op, left, right));
                }
            }
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Box<dyn Expression>, String> {
        match self.next() {
            Token::Operator(Operator::Minus) => {
                let right = self.parse_unary()?;
                Ok(Box::new(ExpressionOperator::new(
                    Operator::Minus,
                    Box::new(ExpressionConstant::new(Data::Integer(0))),
                    right,
                )))
            }
            Token::Operator(Operator::Plus) => self.parse_unary(),
            Token::Operator(Operator::Not) => {
                let right = self.parse_unary()?;
                Ok(Box::new(ExpressionNot::new(right)))
            }
            Token::Number(NumericToken::Integer(i)) => {
                self.parse_postfix(Box::new(ExpressionConstant::new(Data::Integer(i))), false)
            }
            Token::Number(NumericToken::Double(d)) => {
                self.parse_postfix(Box::new(ExpressionConstant::new(Data::Double(d))), false)
            }
            Token::TString(s) => {
                self.parse_postfix(Box::new(ExpressionConstant::new(Data::String(s))), false)
            }
            Token::Boolean(b) => Ok(Box::new(ExpressionConstant::new(Data::Boolean(b)))),
            Token::Null() => Ok(Box::new(ExpressionConstant::new(Data::Null))),
            Token::Identifier(id) => {
                if *self.peek() == Token::Bracket('(') {
                    self.next();
                    let arguments = self.parse_argument_list(')')?;
                    let call = self.fold_call(&id, arguments)?;
                    self.parse_postfix(call, false)
                } else {
                    let is_math = id == "math" && *self.peek() == Token::Separator('.');
                    self.parse_postfix(Box::new(ExpressionVariable::new(&id)), is_math)
                }
            }
            Token::Bracket('(') => {
                let inner = self.parse_expression(1)?;
                self.expect_bracket(')')?;
                self.parse_postfix(inner, false)
            }
            Token::Bracket('[') => {
                let items = self.parse_argument_list(']')?;
                self.parse_postfix(Box::new(ExpressionArray::new(items)), false)
            }
            Token::Bracket('{') => {
                let members = self.parse_member_list()?;
                self.parse_postfix(Box::new(ExpressionMap::new(members)), false)
            }
            other => Err(format!("Unexpected '{}'", other)),
        }
    }

    /// Member access, member calls and indexing bind tightest.
    fn parse_postfix(
        &mut self,
        mut base: Box<dyn Expression>,
        mut base_is_math: bool,
    ) -> Result<Box<dyn Expression>, String> {
        loop {
            match self.peek() {
                Token::Separator('.') => {
                    self.next();
                    let name = match self.next() {
                        Token::Identifier(id) => id,
                        other => return Err(format!("Expected member name, found '{}'", other)),
                    };
                    if *self.peek() == Token::Bracket('(') {
                        self.next();
                        let mut arguments = self.parse_argument_list(')')?;
                        if base_is_math {
                            base = Box::new(ExpressionMethod::new(
                                &format!("math.{}", name),
                                arguments,
                            ));
                            base_is_math = false;
                        } else {
                            // Method style call: the value becomes the
                            // first argument, e.g. s.indexOf(x).
                            arguments.insert(0, base);
                            base = Box::new(ExpressionMethod::new(&name, arguments));
                        }
                    } else {
                        if base_is_math {
                            return Err(format!("Unknown math member '{}'", name));
                        }
                        base = Box::new(ExpressionMemberAccess::new(base, name));
                    }
                }
                Token::Bracket('[') => {
                    self.next();
                    let index = self.parse_expression(1)?;
                    self.expect_bracket(']')?;
                    base = Box::new(ExpressionIndex::new(base, index));
                }
                _ => break,
            }
        }
        Ok(base)
    }

    /// Parse an argument list, stops at the matching stop bracket.
    fn parse_argument_list(&mut self, stop: char) -> Result<Vec<Box<dyn Expression>>, String> {
        let mut r = Vec::new();
        if *self.peek() == Token::Bracket(stop) {
            self.next();
            return Ok(r);
        }
        loop {
            r.push(self.parse_expression(1)?);
            match self.next() {
                Token::Separator(',') => {}
                Token::Bracket(b) if b == stop => break,
                other => return Err(format!("Expected '{}', found '{}'", stop, other)),
            }
        }
        Ok(r)
    }

    /// Parse a `key: value` member list, stops at `}`.
    #[allow(clippy::type_complexity)]
    fn parse_member_list(
        &mut self,
    ) -> Result<Vec<(Box<dyn Expression>, Box<dyn Expression>)>, String> {
        let mut r = Vec::new();
        if *self.peek() == Token::Bracket('}') {
            self.next();
            return Ok(r);
        }
        loop {
            let key: Box<dyn Expression> = match self.next() {
                Token::Identifier(id) => Box::new(ExpressionConstant::new(Data::String(id))),
                Token::TString(s) => Box::new(ExpressionConstant::new(Data::String(s))),
                other => return Err(format!("Expected member key, found '{}'", other)),
            };
            match self.next() {
                Token::Separator(':') => {}
                other => return Err(format!("Expected ':', found '{}'", other)),
            }
            let value = self.parse_expression(1)?;
            r.push((key, value));
            match self.next() {
                Token::Separator(',') => {}
                Token::Bracket('}') => break,
                other => return Err(format!("Expected '}}', found '{}'", other)),
            }
        }
        Ok(r)
    }

    /// Plain function call. `isDefined` on a variable is resolved at parse
    /// time so the argument lookup itself cannot fail.
    fn fold_call(
        &mut self,
        name: &str,
        arguments: Vec<Box<dyn Expression>>,
    ) -> Result<Box<dyn Expression>, String> {
        if name == "isDefined" && arguments.len() == 1 {
            if let Some(var) = arguments[0].variable_name() {
                let var = var.to_string();
                return Ok(Box::new(ExpressionIsDefined { name: var }));
            }
        }
        Ok(Box::new(ExpressionMethod::new(name, arguments)))
    }
}

#[cfg(test)]
mod tests {
    use crate::datamodel::{Data, GlobalData};
    use crate::expression_engine::parser::ExpressionParser;

    #[test]
    fn parser_can_parse_a_simple_expression_without_identifiers() {
        let mut global = GlobalData::new();

        let r = ExpressionParser::execute("12 * 3.4", &mut global).unwrap();
        assert_eq!(r, Data::Double(12f64 * 3.4f64));

        let r = ExpressionParser::execute("(12 * 2)", &mut global).unwrap();
        assert_eq!(r, Data::Integer(24));

        let r = ExpressionParser::execute("(1 * 2) + (12 * 2)", &mut global).unwrap();
        assert_eq!(r, Data::Integer(26));
    }

    #[test]
    fn expressions_prioritize_multiplication_division_operations() {
        let mut global = GlobalData::new();

        let r = ExpressionParser::execute("12 + 2 * 4", &mut global).unwrap();
        assert_eq!(r, Data::Integer(12 + 2 * 4));

        // Check that forced "()" work
        let r = ExpressionParser::execute("(12 + 2) * 4", &mut global).unwrap();
        assert_eq!(r, Data::Integer((12 + 2) * 4));
    }

    #[test]
    fn can_parse_members() {
        let mut global = GlobalData::new();
        global.data.set(
            "A",
            ExpressionParser::execute("{b: {c: 'hello'}}", &mut GlobalData::new()).unwrap(),
        );

        let r = ExpressionParser::execute("A.b.c", &mut global).unwrap();
        assert_eq!(r, Data::String("hello".to_string()));
    }

    #[test]
    fn can_parse_assignment() {
        let mut global = GlobalData::new();
        let r = ExpressionParser::execute("A = 2 * 6", &mut global).unwrap();
        assert_eq!(r, Data::Integer(12));
        assert_eq!(global.lookup("A"), Some(Data::Integer(12)));
    }

    #[test]
    fn can_parse_multiple_expressions() {
        let mut global = GlobalData::new();
        let r = ExpressionParser::execute("X ?= 2; A = X * 6", &mut global).unwrap();
        assert_eq!(r, Data::Integer(12));
        assert_eq!(global.lookup("A"), Some(Data::Integer(12)));
    }

    #[test]
    fn can_parse_array_index() {
        let mut global = GlobalData::new();
        let r = ExpressionParser::execute("[1,2,3,4][1]", &mut global).unwrap();
        assert_eq!(r, Data::Integer(2));

        let r = ExpressionParser::execute("[1,2,3,4][-1]", &mut global).unwrap();
        assert_eq!(r, Data::Integer(4));
    }

    #[test]
    fn can_assign_members() {
        let mut global = GlobalData::new();
        ExpressionParser::execute("a = {b: null}", &mut global).unwrap();
        let r = ExpressionParser::execute("a.b = 2", &mut global).unwrap();
        assert_eq!(r, Data::Integer(2));
        let r = ExpressionParser::execute("a.b", &mut global).unwrap();
        assert_eq!(r, Data::Integer(2));
    }

    #[test]
    fn missing_intermediate_container_is_an_error() {
        let mut global = GlobalData::new();
        assert!(ExpressionParser::execute("x.y.z = 1", &mut global).is_err());
    }

    #[test]
    fn builtins_are_available() {
        let mut global = GlobalData::new();
        assert_eq!(
            ExpressionParser::execute("len('abc')", &mut global).unwrap(),
            Data::Integer(3)
        );
        assert_eq!(
            ExpressionParser::execute("sum(range(4))", &mut global).unwrap(),
            Data::Integer(6)
        );
        assert_eq!(
            ExpressionParser::execute("max([3, 1, 2])", &mut global).unwrap(),
            Data::Integer(3)
        );
        assert_eq!(
            ExpressionParser::execute("math.floor(2.5)", &mut global).unwrap(),
            Data::Integer(2)
        );
        assert_eq!(
            ExpressionParser::execute("'hello'.indexOf('ll')", &mut global).unwrap(),
            Data::Integer(2)
        );
        assert_eq!(
            ExpressionParser::execute("slice([1,2,3,4], 1, 3)", &mut global).unwrap(),
            ExpressionParser::execute("[2,3]", &mut global).unwrap()
        );
    }

    #[test]
    fn container_constructors_are_available() {
        let mut global = GlobalData::new();
        assert_eq!(
            ExpressionParser::execute("list('ab')", &mut global).unwrap(),
            ExpressionParser::execute("['a','b']", &mut global).unwrap()
        );
        assert_eq!(
            ExpressionParser::execute("tuple([1,2])", &mut global).unwrap(),
            ExpressionParser::execute("[1,2]", &mut global).unwrap()
        );
        // set() keeps the first occurrence of each element.
        assert_eq!(
            ExpressionParser::execute("set([2,1,2,3,1])", &mut global).unwrap(),
            ExpressionParser::execute("[2,1,3]", &mut global).unwrap()
        );
        assert_eq!(
            ExpressionParser::execute("dict([['a',1],['b',2]])", &mut global).unwrap(),
            ExpressionParser::execute("{a: 1, b: 2}", &mut global).unwrap()
        );
        assert_eq!(
            ExpressionParser::execute("list({a: 1, b: 2})", &mut global).unwrap(),
            ExpressionParser::execute("['a','b']", &mut global).unwrap()
        );
        assert_eq!(
            ExpressionParser::execute("len(dict())", &mut global).unwrap(),
            Data::Integer(0)
        );
    }

    #[test]
    fn sandbox_rejects_underscore_members() {
        let mut global = GlobalData::new();
        ExpressionParser::execute("a = {b: 1}", &mut global).unwrap();
        assert!(ExpressionParser::execute("a._secret", &mut global).is_err());
        assert!(ExpressionParser::execute("a.__class__", &mut global).is_err());
    }

    #[test]
    fn boolean_logic_short_circuits() {
        let mut global = GlobalData::new();
        // The right side would fail on evaluation; it must not be reached.
        assert_eq!(
            ExpressionParser::execute("false and missing", &mut global).unwrap(),
            Data::Boolean(false)
        );
        assert_eq!(
            ExpressionParser::execute("1 == 1 or missing", &mut global).unwrap(),
            Data::Boolean(true)
        );
    }

    #[test]
    fn undefined_variables_fail() {
        let mut global = GlobalData::new();
        assert!(ExpressionParser::execute("nosuch + 1", &mut global).is_err());
        assert_eq!(
            ExpressionParser::execute("isDefined(nosuch)", &mut global).unwrap(),
            Data::Boolean(false)
        );
    }
}
