//! The sandboxed expression engine and the data model built on it.
//!
//! The engine parses a restricted sub-grammar into an AST which is then
//! interpreted against the scoped data stores; there is no host `eval`
//! anywhere. See [crate::datamodel::Datamodel] for the interpreter-facing
//! API.

pub mod expressions;
pub mod lexer;
pub mod parser;

use crate::common::error;
use crate::datamodel::{
    data_to_boolean, Data, DataStore, Datamodel, GlobalData, EXPRESSION_DATAMODEL,
};
use crate::events::Event;
use crate::expression_engine::parser::ExpressionParser;
use crate::fsm::{Fsm, StateId};

/// Data model backed by the sandboxed expression engine.
pub struct ExpressionDatamodel {
    pub global: GlobalData,
}

impl ExpressionDatamodel {
    pub fn new(global: GlobalData) -> ExpressionDatamodel {
        ExpressionDatamodel { global }
    }

    /// Root variable name of a location expression, for the datamodel delta.
    fn location_root(location: &str) -> &str {
        location
            .split(|c| c == '.' || c == '[')
            .next()
            .unwrap_or(location)
            .trim()
    }
}

#[allow(non_snake_case)]
impl Datamodel for ExpressionDatamodel {
    fn global(&mut self) -> &mut GlobalData {
        &mut self.global
    }

    fn global_s(&self) -> &GlobalData {
        &self.global
    }

    fn get_name(&self) -> &str {
        EXPRESSION_DATAMODEL
    }

    fn initializeDataModel(&mut self, fsm: &Fsm, state: StateId) {
        let declarations = fsm.get_state_by_id(state).data.clone();
        let is_root = state == fsm.pseudo_root;
        if !is_root {
            // Late binding re-entry resets the frame.
            self.global.local_data.insert(state, DataStore::new());
        }
        let saved_scope = std::mem::replace(&mut self.global.scope, fsm.scope_chain(state));
        for (name, decl) in declarations {
            let value = match decl {
                Data::Source(src) => match ExpressionParser::execute(&src, &mut self.global) {
                    Ok(v) => v,
                    Err(msg) => {
                        error!("data '{}' has an invalid expression ({})", name, msg);
                        self.global.step.errors.push(msg.clone());
                        self.global.enqueue_internal(Event::error_execution(&msg));
                        Data::Null
                    }
                },
                other => other,
            };
            if is_root {
                self.global.data.set(&name, value);
            } else {
                self.global
                    .local_data
                    .get_mut(&state)
                    .unwrap()
                    .set(&name, value);
            }
        }
        self.global.scope = saved_scope;
    }

    fn set(&mut self, name: &str, data: Data) {
        self.global.data.set(name, data);
    }

    fn assign(&mut self, location: &str, expr: &str) -> Result<(), String> {
        let left = ExpressionParser::parse(location)?;
        if !left.is_assignable() {
            return Err(format!("'{}' is not a legal location", location));
        }
        let value = if expr.is_empty() {
            Data::Null
        } else {
            ExpressionParser::execute(expr, &mut self.global)?
        };
        let slot = left.resolve_mut(&mut self.global)?;
        *slot = value;
        let root = Self::location_root(location).to_string();
        if let Some(v) = self.global.lookup(&root) {
            self.global.step.record_delta(&root, &v);
        }
        Ok(())
    }

    fn get_by_location(&mut self, location: &str) -> Result<Data, String> {
        ExpressionParser::execute(location, &mut self.global)
    }

    fn execute(&mut self, script: &str) -> Result<Data, String> {
        ExpressionParser::execute(script, &mut self.global)
    }

    fn execute_condition(&mut self, script: &str) -> Result<bool, String> {
        self.execute(script).map(|d| data_to_boolean(&d))
    }

    fn execute_for_each(
        &mut self,
        array_expression: &str,
        item: &str,
        index: &str,
        execute_body: &mut dyn FnMut(&mut dyn Datamodel) -> bool,
    ) -> bool {
        let array = match self.execute(array_expression) {
            Ok(v) => v,
            Err(msg) => {
                error!("foreach array '{}' is invalid ({})", array_expression, msg);
                self.global.step.errors.push(msg.clone());
                self.global.enqueue_internal(Event::error_execution(&msg));
                return false;
            }
        };
        // Iterate over a shallow copy, like the W3C requires.
        let items: Vec<Data> = match array {
            Data::Array(a) => a,
            Data::Map(m) => m.keys().map(|k| Data::String(k.clone())).collect(),
            other => {
                let msg = format!("Can't iterate over '{}'", other);
                error!("{}", msg);
                self.global.step.errors.push(msg.clone());
                self.global.enqueue_internal(Event::error_execution(&msg));
                return false;
            }
        };
        for (i, value) in items.into_iter().enumerate() {
            self.global.set_scoped(item, value);
            if !index.is_empty() {
                self.global.set_scoped(index, Data::Integer(i as i64));
            }
            if !execute_body(self) {
                return false;
            }
        }
        true
    }
}
