//! Builds the activation graph from an in-memory SCJSON document.
//!
//! The reader walks the document in pre-order, creating one state record
//! per referenceable node and assigning stable document ids. Transition
//! targets are collected by name and resolved in a second pass, so forward
//! references work. In strict mode unknown constructs and unresolved
//! references are load errors; in lax mode they are recorded as warnings
//! and the affected transitions become unselectable.

use serde_json::Value;

use crate::common::warn;
use crate::datamodel::{json_to_data, Data};
use crate::error::EngineError;
use crate::executable_content::{Action, SendParameters};
use crate::fsm::{
    map_history_type, map_transition_type, BindingType, CommonContent, DoneData,
    ExecutableContentId, Fsm, Invoke, Parameter, StateId, Transition, TransitionId,
};

/// Load mode: strict rejects unknown constructs, lax records and continues.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExecutionMode {
    Strict,
    Lax,
}

const KIND_STATE: u8 = 0;
const KIND_PARALLEL: u8 = 1;
const KIND_FINAL: u8 = 2;
const KIND_HISTORY: u8 = 3;

const ROOT_KEYS: &[&str] = &[
    "name",
    "version",
    "datamodel_attribute",
    "binding",
    "initial",
    "datamodel",
    "script",
    "state",
    "parallel",
    "final",
    "xmlns",
];

const STATE_KEYS: &[&str] = &[
    "id",
    "initial_attribute",
    "initial",
    "datamodel",
    "onentry",
    "onexit",
    "transition",
    "state",
    "parallel",
    "final",
    "history",
    "invoke",
    "donedata",
    "type_value",
];

const TRANSITION_KEYS: &[&str] = &[
    "event",
    "cond",
    "target",
    "type_value",
    "raise",
    "assign",
    "log",
    "send",
    "cancel",
    "if",
    "foreach",
    "script",
];

const ACTION_KEYS: &[&str] = &[
    "raise", "assign", "log", "send", "cancel", "if", "foreach", "script",
];

const DATAMODEL_KEYS: &[&str] = &["data"];

const DATA_KEYS: &[&str] = &["id", "expr", "content", "src"];

const RAISE_KEYS: &[&str] = &["event"];

const ASSIGN_KEYS: &[&str] = &["location", "expr"];

const LOG_KEYS: &[&str] = &["label", "expr"];

const SEND_KEYS: &[&str] = &[
    "event",
    "eventexpr",
    "target",
    "targetexpr",
    "type",
    "type_value",
    "typeexpr",
    "delay",
    "delayexpr",
    "id",
    "idlocation",
    "namelist",
    "param",
    "content",
];

const CANCEL_KEYS: &[&str] = &["sendid", "sendidexpr"];

const IF_KEYS: &[&str] = &[
    "cond", "then", "elseif", "else", "raise", "assign", "log", "send", "cancel", "if",
    "foreach", "script",
];

const FOREACH_KEYS: &[&str] = &[
    "array", "item", "index", "raise", "assign", "log", "send", "cancel", "if", "foreach",
    "script",
];

const SCRIPT_KEYS: &[&str] = &["content"];

const PARAM_KEYS: &[&str] = &["name", "expr", "location"];

const DONEDATA_KEYS: &[&str] = &["content", "param"];

const INVOKE_KEYS: &[&str] = &[
    "type",
    "type_value",
    "typeexpr",
    "src",
    "srcexpr",
    "id",
    "idlocation",
    "autoforward",
    "namelist",
    "param",
    "content",
    "finalize",
];

pub fn read_from_json_str(
    text: &str,
    mode: ExecutionMode,
) -> Result<(Box<Fsm>, Vec<String>), EngineError> {
    let value: Value = serde_json::from_str(text)?;
    read_from_value(&value, mode)
}

pub fn read_from_value(
    value: &Value,
    mode: ExecutionMode,
) -> Result<(Box<Fsm>, Vec<String>), EngineError> {
    let mut rs = ReaderState::new(mode);
    rs.build_root(value)?;
    rs.resolve_targets()?;
    Ok((rs.fsm, rs.warnings))
}

struct ReaderState {
    fsm: Box<Fsm>,
    mode: ExecutionMode,
    warnings: Vec<String>,
    doc_id_counter: u32,
    content_id_counter: ExecutableContentId,
    transition_id_counter: TransitionId,
    id_count: u32,
    /// (transition, target names) resolved after the whole tree is built.
    pending_targets: Vec<(TransitionId, Vec<String>)>,
}

impl ReaderState {
    fn new(mode: ExecutionMode) -> ReaderState {
        ReaderState {
            fsm: Box::new(Fsm::new()),
            mode,
            warnings: Vec::new(),
            doc_id_counter: 0,
            content_id_counter: 0,
            transition_id_counter: 0,
            id_count: 0,
            pending_targets: Vec::new(),
        }
    }

    fn schema_issue(&mut self, msg: String) -> Result<(), EngineError> {
        match self.mode {
            ExecutionMode::Strict => Err(EngineError::Schema(msg)),
            ExecutionMode::Lax => {
                warn!("{}", msg);
                self.warnings.push(msg);
                Ok(())
            }
        }
    }

    fn link_issue(&mut self, msg: String) -> Result<(), EngineError> {
        match self.mode {
            ExecutionMode::Strict => Err(EngineError::Link(msg)),
            ExecutionMode::Lax => {
                warn!("{}", msg);
                self.warnings.push(msg);
                Ok(())
            }
        }
    }

    fn check_keys(&mut self, value: &Value, allowed: &[&str], what: &str) -> Result<(), EngineError> {
        if let Value::Object(o) = value {
            let unknown: Vec<String> = o
                .keys()
                .filter(|k| !allowed.contains(&k.as_str()))
                .cloned()
                .collect();
            for key in unknown {
                self.schema_issue(format!("Unknown construct '{}' in <{}>", key, what))?;
            }
        }
        Ok(())
    }

    fn generate_name(&mut self) -> String {
        self.id_count += 1;
        format!("__id{}", self.id_count)
    }

    fn next_doc_id(&mut self) -> u32 {
        self.doc_id_counter += 1;
        self.doc_id_counter
    }

    fn next_content_id(&mut self) -> ExecutableContentId {
        self.content_id_counter += 1;
        self.content_id_counter
    }

    fn next_transition_id(&mut self) -> TransitionId {
        self.transition_id_counter += 1;
        self.transition_id_counter
    }

    /// Creates a state record and registers its id.
    fn new_state(&mut self, name: &str) -> Result<StateId, EngineError> {
        if self.fsm.state_names.contains_key(name) {
            self.link_issue(format!("Duplicate state id '{}'", name))?;
        }
        let mut state = crate::fsm::State::new(name);
        state.id = (self.fsm.states.len() + 1) as StateId;
        state.doc_id = self.next_doc_id();
        let sid = state.id;
        self.fsm.state_names.insert(name.to_string(), sid);
        self.fsm.states.push(state);
        Ok(sid)
    }

    fn build_root(&mut self, value: &Value) -> Result<(), EngineError> {
        if !value.is_object() {
            return Err(EngineError::Schema(
                "Document root must be an object".to_string(),
            ));
        }
        self.check_keys(value, ROOT_KEYS, "scxml")?;

        self.fsm.name = get_str(value, "name").unwrap_or_else(|| "scxml".to_string());
        self.fsm.version = match value.get("version") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => "1.0".to_string(),
        };
        self.fsm.datamodel = get_str(value, "datamodel_attribute").unwrap_or_default();
        self.fsm.binding = get_str(value, "binding")
            .unwrap_or_default()
            .parse::<BindingType>()
            .unwrap_or(BindingType::Early);

        let root_name = self.fsm.name.clone();
        let root = self.new_state(&root_name)?;
        self.fsm.pseudo_root = root;

        // Root datamodel populates the document-global store.
        self.build_datamodel(value, root)?;

        if let Some(script) = value.get("script") {
            let mut actions = Vec::new();
            self.push_script_actions(script, &mut actions)?;
            if !actions.is_empty() {
                let cid = self.next_content_id();
                self.fsm.executable_content.insert(cid, actions);
                self.fsm.script = cid;
            }
        }

        self.build_children(value, root)?;

        // The root initial attribute, or the first child in document order.
        let initial_names = match value.get("initial") {
            Some(v) => string_list(v),
            None => Vec::new(),
        };
        let initial_names = if initial_names.is_empty() {
            let root_state = self.fsm.get_state_by_id(root);
            match root_state.states.first() {
                Some(first) => vec![self.fsm.state_name(*first).to_string()],
                None => {
                    return Err(EngineError::Schema(
                        "Document has no states".to_string(),
                    ))
                }
            }
        } else {
            initial_names
        };
        let tid = self.synthesize_initial_transition(root, initial_names)?;
        self.fsm.get_state_by_id_mut(root).initial = tid;
        Ok(())
    }

    /// Child states of a node, processed per kind in the projection's array
    /// order.
    fn build_children(&mut self, value: &Value, parent: StateId) -> Result<(), EngineError> {
        for (key, kind) in [
            ("state", KIND_STATE),
            ("parallel", KIND_PARALLEL),
            ("final", KIND_FINAL),
            ("history", KIND_HISTORY),
        ] {
            if let Some(Value::Array(children)) = value.get(key) {
                for child in children {
                    self.build_state(child, parent, kind)?;
                }
            }
        }
        Ok(())
    }

    fn build_state(&mut self, value: &Value, parent: StateId, kind: u8) -> Result<StateId, EngineError> {
        self.check_keys(value, STATE_KEYS, "state")?;
        let name = match get_str(value, "id") {
            Some(id) if !id.is_empty() => id,
            _ => self.generate_name(),
        };
        let sid = self.new_state(&name)?;
        {
            let state = self.fsm.get_state_by_id_mut(sid);
            state.parent = parent;
            state.is_parallel = kind == KIND_PARALLEL;
            state.is_final = kind == KIND_FINAL;
        }
        if kind == KIND_HISTORY {
            let htype = get_str(value, "type_value").unwrap_or_default();
            self.fsm.get_state_by_id_mut(sid).history_type = map_history_type(&htype);
            self.fsm.get_state_by_id_mut(parent).history.push(sid);
            // The default transition of the history state.
            if let Some(Value::Array(transitions)) = value.get("transition") {
                for t in transitions {
                    self.build_transition(t, sid)?;
                }
            }
            return Ok(sid);
        }
        self.fsm.get_state_by_id_mut(parent).states.push(sid);

        self.build_datamodel(value, sid)?;

        if let Some(onentry) = value.get("onentry") {
            let cid = self.build_blocks(onentry, sid)?;
            self.fsm.get_state_by_id_mut(sid).onentry = cid;
        }
        if let Some(onexit) = value.get("onexit") {
            let cid = self.build_blocks(onexit, sid)?;
            self.fsm.get_state_by_id_mut(sid).onexit = cid;
        }
        if let Some(Value::Array(transitions)) = value.get("transition") {
            for t in transitions {
                let tid = self.build_transition(t, sid)?;
                self.fsm.get_state_by_id_mut(sid).transitions.push(tid);
            }
        }
        if let Some(Value::Array(invokes)) = value.get("invoke") {
            for inv in invokes {
                let invoke = self.build_invoke(inv, sid)?;
                self.fsm.get_state_by_id_mut(sid).invoke.push(invoke);
            }
        }
        if kind == KIND_FINAL {
            if let Some(dd) = value.get("donedata") {
                let donedata = self.build_donedata(dd)?;
                self.fsm.get_state_by_id_mut(sid).donedata = Some(donedata);
            }
        }

        self.build_children(value, sid)?;

        // Default entry: explicit attribute, <initial> element transition,
        // or the first child in document order.
        if kind == KIND_STATE && !self.fsm.get_state_by_id(sid).states.is_empty() {
            let mut initial_names: Vec<String> = Vec::new();
            let mut initial_content: Option<Value> = None;
            if let Some(attr) = value.get("initial_attribute") {
                initial_names = string_list(attr);
            }
            match value.get("initial") {
                Some(Value::Array(elements)) if elements.iter().all(|e| e.is_string()) => {
                    // Attribute shorthand, as on the document root.
                    if initial_names.is_empty() {
                        initial_names = string_list(value.get("initial").unwrap());
                    }
                }
                Some(Value::Array(elements)) => {
                    if let Some(element) = elements.first() {
                        if !initial_names.is_empty() {
                            self.schema_issue(
                                "<initial> must not be combined with the initial attribute"
                                    .to_string(),
                            )?;
                        }
                        if let Some(t) = element.get("transition") {
                            let t = first_of(t);
                            initial_names = t.get("target").map(string_list).unwrap_or_default();
                            initial_content = Some(t);
                        }
                    }
                }
                Some(other) => {
                    // Attribute shorthand, as on the document root.
                    if initial_names.is_empty() {
                        initial_names = string_list(other);
                    }
                }
                None => {}
            }
            if initial_names.is_empty() {
                let first = self.fsm.get_state_by_id(sid).states[0];
                initial_names = vec![self.fsm.state_name(first).to_string()];
            }
            let tid = match initial_content {
                Some(t) => self.build_transition(&t, sid)?,
                None => self.synthesize_initial_transition(sid, initial_names)?,
            };
            self.fsm.get_state_by_id_mut(sid).initial = tid;
        }
        Ok(sid)
    }

    /// Initial attributes become `<initial>` container transitions, as the
    /// W3C algorithm assumes. Such transitions carry no executable content.
    fn synthesize_initial_transition(
        &mut self,
        source: StateId,
        target_names: Vec<String>,
    ) -> Result<TransitionId, EngineError> {
        let mut t = Transition::new();
        t.id = self.next_transition_id();
        t.doc_id = self.next_doc_id();
        t.source = source;
        let tid = t.id;
        self.fsm.transitions.insert(tid, t);
        self.pending_targets.push((tid, target_names));
        Ok(tid)
    }

    fn build_transition(&mut self, value: &Value, source: StateId) -> Result<TransitionId, EngineError> {
        self.check_keys(value, TRANSITION_KEYS, "transition")?;
        let mut t = Transition::new();
        t.id = self.next_transition_id();
        t.doc_id = self.next_doc_id();
        t.source = source;
        if let Some(event) = get_str(value, "event") {
            t.events = event.split_whitespace().map(|s| s.to_string()).collect();
        }
        if let Some(cond) = get_str(value, "cond") {
            if !cond.is_empty() {
                t.cond = Some(cond);
            }
        }
        t.transition_type = map_transition_type(&get_str(value, "type_value").unwrap_or_default());
        let targets = value.get("target").map(string_list).unwrap_or_default();
        t.content = self.build_block(value, source)?;
        let tid = t.id;
        self.fsm.transitions.insert(tid, t);
        self.pending_targets.push((tid, targets));
        Ok(tid)
    }

    fn build_datamodel(&mut self, value: &Value, sid: StateId) -> Result<(), EngineError> {
        let blocks = match value.get("datamodel") {
            Some(Value::Array(blocks)) => blocks.clone(),
            Some(single) => vec![single.clone()],
            None => return Ok(()),
        };
        for block in &blocks {
            self.check_keys(block, DATAMODEL_KEYS, "datamodel")?;
            let entries = match block.get("data") {
                Some(Value::Array(entries)) => entries.clone(),
                _ => continue,
            };
            for entry in &entries {
                self.check_keys(entry, DATA_KEYS, "data")?;
                let name = match get_str(entry, "id") {
                    Some(n) if !n.is_empty() => n,
                    _ => {
                        self.schema_issue("<data> without id".to_string())?;
                        continue;
                    }
                };
                let data = if let Some(expr) = get_str(entry, "expr") {
                    Data::Source(expr)
                } else if let Some(content) = entry.get("content") {
                    json_to_data(&flatten_content(content))
                } else if entry.get("src").is_some() {
                    self.schema_issue(format!("<data> '{}': src is not supported", name))?;
                    Data::Null
                } else {
                    Data::Null
                };
                self.fsm.get_state_by_id_mut(sid).data.push((name, data));
            }
        }
        Ok(())
    }

    /// Multiple blocks (e.g. several `<onentry>` elements) concatenate into
    /// one content id.
    fn build_blocks(&mut self, value: &Value, state: StateId) -> Result<ExecutableContentId, EngineError> {
        let blocks: Vec<Value> = match value {
            Value::Array(a) => a.clone(),
            other => vec![other.clone()],
        };
        let mut actions = Vec::new();
        for block in &blocks {
            // onentry/onexit/finalize blocks carry executable content only.
            self.check_keys(block, ACTION_KEYS, "executable content")?;
            self.build_actions_into(block, state, &mut actions)?;
        }
        if actions.is_empty() {
            return Ok(0);
        }
        let cid = self.next_content_id();
        self.fsm.executable_content.insert(cid, actions);
        Ok(cid)
    }

    /// One content block, from the action arrays of `value`.
    fn build_block(&mut self, value: &Value, state: StateId) -> Result<ExecutableContentId, EngineError> {
        let mut actions = Vec::new();
        self.build_actions_into(value, state, &mut actions)?;
        if actions.is_empty() {
            return Ok(0);
        }
        let cid = self.next_content_id();
        self.fsm.executable_content.insert(cid, actions);
        Ok(cid)
    }

    /// The projection groups executable content by element kind; arrays keep
    /// their authored order and the kinds run in this canonical sequence.
    fn build_actions_into(
        &mut self,
        value: &Value,
        state: StateId,
        actions: &mut Vec<Action>,
    ) -> Result<(), EngineError> {
        for key in ACTION_KEYS {
            let entries = match value.get(*key) {
                Some(Value::Array(entries)) => entries.clone(),
                Some(single) => vec![single.clone()],
                None => continue,
            };
            for entry in &entries {
                match *key {
                    "raise" => {
                        self.check_keys(entry, RAISE_KEYS, "raise")?;
                        let event = get_str(entry, "event").unwrap_or_default();
                        if event.is_empty() {
                            self.schema_issue("<raise> without event".to_string())?;
                            continue;
                        }
                        actions.push(Action::Raise { event });
                    }
                    "assign" => {
                        self.check_keys(entry, ASSIGN_KEYS, "assign")?;
                        let location = get_str(entry, "location").unwrap_or_default();
                        if location.is_empty() {
                            self.schema_issue("<assign> without location".to_string())?;
                            continue;
                        }
                        actions.push(Action::Assign {
                            location,
                            expr: get_str(entry, "expr").unwrap_or_default(),
                        });
                    }
                    "log" => {
                        self.check_keys(entry, LOG_KEYS, "log")?;
                        actions.push(Action::Log {
                            label: get_str(entry, "label").unwrap_or_default(),
                            expr: get_str(entry, "expr").unwrap_or_default(),
                        });
                    }
                    "send" => {
                        let send = self.build_send(entry, state)?;
                        actions.push(Action::Send(Box::new(send)));
                    }
                    "cancel" => {
                        self.check_keys(entry, CANCEL_KEYS, "cancel")?;
                        actions.push(Action::Cancel {
                            send_id: get_str(entry, "sendid").unwrap_or_default(),
                            send_id_expr: get_str(entry, "sendidexpr").unwrap_or_default(),
                        });
                    }
                    "if" => {
                        let action = self.build_if(entry, state)?;
                        actions.push(action);
                    }
                    "foreach" => {
                        self.check_keys(entry, FOREACH_KEYS, "foreach")?;
                        let array = get_str(entry, "array").unwrap_or_default();
                        let item = get_str(entry, "item").unwrap_or_default();
                        if array.is_empty() || item.is_empty() {
                            self.schema_issue("<foreach> needs array and item".to_string())?;
                            continue;
                        }
                        let content = self.build_block(entry, state)?;
                        actions.push(Action::ForEach {
                            array,
                            item,
                            index: get_str(entry, "index").unwrap_or_default(),
                            content,
                        });
                    }
                    "script" => {
                        self.push_script_actions(entry, actions)?;
                    }
                    other => {
                        self.schema_issue(format!(
                            "Unknown construct '{}' in executable content",
                            other
                        ))?;
                    }
                }
            }
        }
        Ok(())
    }

    fn push_script_actions(&mut self, entry: &Value, actions: &mut Vec<Action>) -> Result<(), EngineError> {
        if let Value::Array(entries) = entry {
            for e in entries {
                self.push_script_actions(e, actions)?;
            }
            return Ok(());
        }
        let source = match entry {
            Value::String(s) => s.clone(),
            other => {
                self.check_keys(other, SCRIPT_KEYS, "script")?;
                get_str(other, "content").unwrap_or_default()
            }
        };
        if !source.is_empty() {
            actions.push(Action::Script { source });
        }
        Ok(())
    }

    fn build_if(&mut self, value: &Value, state: StateId) -> Result<Action, EngineError> {
        self.check_keys(value, IF_KEYS, "if")?;
        let cond = get_str(value, "cond").unwrap_or_default();
        let then_block = match value.get("then") {
            Some(v) => {
                self.check_keys(v, ACTION_KEYS, "executable content")?;
                self.build_block(v, state)?
            }
            None => self.build_block(value, state)?,
        };
        let mut branches = vec![(cond, then_block)];
        if let Some(Value::Array(elseifs)) = value.get("elseif") {
            for branch in elseifs {
                self.check_keys(branch, IF_KEYS, "elseif")?;
                let cond = get_str(branch, "cond").unwrap_or_default();
                let block = match branch.get("then") {
                    Some(v) => {
                        self.check_keys(v, ACTION_KEYS, "executable content")?;
                        self.build_block(v, state)?
                    }
                    None => self.build_block(branch, state)?,
                };
                branches.push((cond, block));
            }
        }
        let else_content = match value.get("else") {
            Some(v) => {
                self.check_keys(v, ACTION_KEYS, "executable content")?;
                self.build_block(v, state)?
            }
            None => 0,
        };
        Ok(Action::If {
            branches,
            else_content,
        })
    }

    fn build_send(&mut self, value: &Value, state: StateId) -> Result<SendParameters, EngineError> {
        self.check_keys(value, SEND_KEYS, "send")?;
        let mut send = SendParameters {
            parent_state_id: state,
            ..Default::default()
        };
        send.name = get_str(value, "id").unwrap_or_default();
        send.name_location = get_str(value, "idlocation").unwrap_or_default();
        send.event = get_str(value, "event").unwrap_or_default();
        send.event_expr = get_str(value, "eventexpr").unwrap_or_default();
        send.target = get_str(value, "target").unwrap_or_default();
        send.target_expr = get_str(value, "targetexpr").unwrap_or_default();
        send.type_value = get_str(value, "type_value")
            .or_else(|| get_str(value, "type"))
            .unwrap_or_default();
        send.type_expr = get_str(value, "typeexpr").unwrap_or_default();
        send.delay_expr = get_str(value, "delayexpr").unwrap_or_default();
        if let Some(delay) = get_str(value, "delay") {
            let us = crate::executable_content::parse_duration_to_micros(&delay);
            if us < 0 {
                self.schema_issue(format!("<send> has a malformed delay '{}'", delay))?;
            } else {
                send.delay_us = us as u64;
            }
        }
        if let Some(namelist) = get_str(value, "namelist") {
            send.name_list = namelist.split_whitespace().map(|s| s.to_string()).collect();
        }
        send.params = self.build_params(value)?;
        send.content = build_content(value.get("content"));
        Ok(send)
    }

    fn build_params(&mut self, value: &Value) -> Result<Option<Vec<Parameter>>, EngineError> {
        let entries = match value.get("param") {
            Some(Value::Array(entries)) => entries.clone(),
            Some(single) => vec![single.clone()],
            None => return Ok(None),
        };
        let mut params = Vec::new();
        for entry in &entries {
            self.check_keys(entry, PARAM_KEYS, "param")?;
            let name = get_str(entry, "name").unwrap_or_default();
            if name.is_empty() {
                self.schema_issue("<param> without name".to_string())?;
                continue;
            }
            params.push(Parameter {
                name,
                expr: get_str(entry, "expr").unwrap_or_default(),
                location: get_str(entry, "location").unwrap_or_default(),
            });
        }
        Ok(if params.is_empty() { None } else { Some(params) })
    }

    fn build_donedata(&mut self, value: &Value) -> Result<DoneData, EngineError> {
        let value = first_of(value);
        self.check_keys(&value, DONEDATA_KEYS, "donedata")?;
        Ok(DoneData {
            content: build_content(value.get("content")),
            params: self.build_params(&value)?,
        })
    }

    fn build_invoke(&mut self, value: &Value, state: StateId) -> Result<Invoke, EngineError> {
        self.check_keys(value, INVOKE_KEYS, "invoke")?;
        let mut inv = Invoke::new();
        inv.doc_id = self.next_doc_id();
        inv.type_name = get_str(value, "type_value")
            .or_else(|| get_str(value, "type"))
            .unwrap_or_default();
        inv.type_expr = get_str(value, "typeexpr").unwrap_or_default();
        inv.src = get_str(value, "src").unwrap_or_default();
        inv.src_expr = get_str(value, "srcexpr").unwrap_or_default();
        inv.invoke_id = get_str(value, "id").unwrap_or_default();
        inv.external_id_location = get_str(value, "idlocation").unwrap_or_default();
        inv.autoforward = match value.get("autoforward") {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true",
            _ => false,
        };
        if let Some(namelist) = get_str(value, "namelist") {
            inv.name_list = namelist.split_whitespace().map(|s| s.to_string()).collect();
        }
        inv.params = self.build_params(value)?;
        inv.content = build_content(value.get("content"));
        if let Some(finalize) = value.get("finalize") {
            inv.finalize = self.build_blocks(finalize, state)?;
        }
        inv.parent_state_name = self.fsm.state_name(state).to_string();
        Ok(inv)
    }

    /// Second pass: resolve all collected target names. In lax mode a
    /// transition with an unresolvable target is made unselectable.
    fn resolve_targets(&mut self) -> Result<(), EngineError> {
        let pending = std::mem::take(&mut self.pending_targets);
        for (tid, names) in pending {
            let mut ids = Vec::new();
            let mut broken = false;
            for name in &names {
                let resolved = self.fsm.state_names.get(name).cloned();
                match resolved {
                    Some(sid) => ids.push(sid),
                    None => {
                        self.link_issue(format!("Unresolved transition target '{}'", name))?;
                        broken = true;
                    }
                }
            }
            let t = self.fsm.transitions.get_mut(&tid).unwrap();
            if broken {
                t.selectable = false;
                t.target = Vec::new();
            } else {
                t.target = ids;
            }
        }
        Ok(())
    }
}

fn get_str(value: &Value, key: &str) -> Option<String> {
    match value.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

/// "a b c", ["a","b"] and "a" all become a list of names.
fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s.split_whitespace().map(|x| x.to_string()).collect(),
        Value::Array(a) => a
            .iter()
            .flat_map(|v| match v {
                Value::String(s) => s.split_whitespace().map(|x| x.to_string()).collect(),
                _ => Vec::new(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Single-element containers flatten where unambiguous.
fn first_of(value: &Value) -> Value {
    match value {
        Value::Array(a) if a.len() == 1 => a[0].clone(),
        other => other.clone(),
    }
}

fn flatten_content(value: &Value) -> Value {
    match value {
        Value::Array(a) if a.len() == 1 => a[0].clone(),
        other => other.clone(),
    }
}

/// `<content>`: either an expression or literal content, stored as JSON
/// text for later evaluation.
fn build_content(value: Option<&Value>) -> Option<CommonContent> {
    let value = value?;
    let value = first_of(value);
    if let Some(expr) = get_str(&value, "expr") {
        return Some(CommonContent {
            content: None,
            content_expr: Some(expr),
        });
    }
    let literal = match value.get("content") {
        Some(inner) => flatten_content(inner),
        None => value.clone(),
    };
    Some(CommonContent {
        content: Some(literal.to_string()),
        content_expr: None,
    })
}
