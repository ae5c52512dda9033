//! The runtime facade: owns one statechart model plus its data model and
//! drives them step by step. External events, virtual time and trace
//! records all pass through here; one [Runtime] is one session, and child
//! invocations are nested [Runtime] instances.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::datamodel::{create_datamodel, json_to_data, Data, Datamodel};
use crate::error::EngineError;
use crate::events::Event;
use crate::executable_content::route_event;
use crate::fsm::{Fsm, StateId};
use crate::reader::ExecutionMode;
use crate::tracer::{build_record, TraceOptions, TraceRecord};

static SESSION_ID_COUNTER: AtomicU32 = AtomicU32::new(1);

/// One interpreter session.
pub struct Runtime {
    pub fsm: Box<Fsm>,
    pub datamodel: Box<dyn Datamodel>,
    pub options: TraceOptions,
    started: bool,
}

impl Runtime {
    fn from_fsm(
        fsm: Box<Fsm>,
        warnings: Vec<String>,
        base_dir: Option<std::path::PathBuf>,
    ) -> Runtime {
        let mut global = crate::datamodel::GlobalData::new();
        global.session_id = SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        global.session_name = fsm.name.clone();
        global.base_dir = base_dir;
        global.load_warnings = warnings;
        let datamodel = create_datamodel(&fsm.datamodel, global);
        Runtime {
            fsm,
            datamodel,
            options: TraceOptions::default(),
            started: false,
        }
    }

    pub fn from_json_str(text: &str, mode: ExecutionMode) -> Result<Runtime, EngineError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        Self::from_json_value(&value, mode)
    }

    pub fn from_json_value(
        value: &serde_json::Value,
        mode: ExecutionMode,
    ) -> Result<Runtime, EngineError> {
        let (fsm, warnings) = crate::reader::read_from_value(value, mode)?;
        Ok(Self::from_fsm(fsm, warnings, None))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P, mode: ExecutionMode) -> Result<Runtime, EngineError> {
        let text = std::fs::read_to_string(&path)?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        let (fsm, warnings) = crate::reader::read_from_value(&value, mode)?;
        let base_dir = path.as_ref().parent().map(|p| p.to_path_buf());
        Ok(Self::from_fsm(fsm, warnings, base_dir))
    }

    #[cfg(feature = "xml")]
    pub fn from_xml_str(text: &str, mode: ExecutionMode) -> Result<Runtime, EngineError> {
        let value = crate::scxml_reader::xml_to_value(text)?;
        let (fsm, warnings) = crate::reader::read_from_value(&value, mode)?;
        Ok(Self::from_fsm(fsm, warnings, None))
    }

    #[cfg(feature = "xml")]
    pub fn from_xml_file<P: AsRef<Path>>(path: P, mode: ExecutionMode) -> Result<Runtime, EngineError> {
        let text = std::fs::read_to_string(&path)?;
        let value = crate::scxml_reader::xml_to_value(&text)?;
        let (fsm, warnings) = crate::reader::read_from_value(&value, mode)?;
        let base_dir = path.as_ref().parent().map(|p| p.to_path_buf());
        Ok(Self::from_fsm(fsm, warnings, base_dir))
    }

    /// Enables execution of `<script>` content through the sandboxed
    /// evaluator. Off by default.
    pub fn set_unsafe_script(&mut self, enabled: bool) {
        self.datamodel.global().allow_unsafe_script = enabled;
    }

    pub fn load_warnings(&self) -> &[String] {
        &self.datamodel.global_s().load_warnings
    }

    /// Performs the initial entry and the first macrostep. Idempotent.
    pub fn start_machine(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.fsm.start(self.datamodel.as_mut());
    }

    /// Queues an external event.
    pub fn enqueue(&mut self, name: &str, data: Option<&serde_json::Value>) {
        self.enqueue_event(Event::new_external(name, data.map(json_to_data)));
    }

    pub fn enqueue_event(&mut self, event: Event) {
        self.datamodel.global().external_queue.enqueue(event);
    }

    /// Advances the virtual clock by (fractional) seconds. Delayed sends
    /// whose due time was reached move into the external queue, in
    /// (due, seq) order; child sessions advance by the same amount.
    pub fn advance_time(&mut self, seconds: f64) {
        self.advance_time_us((seconds * 1_000_000.0).round() as u64);
    }

    pub fn advance_time_us(&mut self, delta_us: u64) {
        let due = self.datamodel.global().delays.advance(delta_us);
        for entry in due {
            route_event(&self.fsm, self.datamodel.as_mut(), entry.target, entry.event);
        }
        let order = self.datamodel.global().child_order.clone();
        let mut sessions = std::mem::take(&mut self.datamodel.global().child_sessions);
        let mut completed = Vec::new();
        for id in &order {
            if let Some(session) = sessions.get_mut(id) {
                session.runtime.advance_time_us(delta_us);
                session.runtime.run_to_idle();
                for event in session.runtime.take_outbox() {
                    self.datamodel.global().external_queue.enqueue(event);
                }
                if !session.runtime.is_running() {
                    completed.push(id.clone());
                }
            }
        }
        self.datamodel.global().child_sessions = sessions;
        crate::invoke::finish_completed(&self.fsm, self.datamodel.as_mut(), completed);
    }

    /// Runs one step: the initial entry if the machine was not started yet,
    /// else the processing of at most one external event (run to
    /// completion). Returns `None` when the runtime is idle or halted;
    /// `Some(None)` for the initial entry, `Some(Some(event))` for a
    /// consumed event.
    fn step_once(&mut self) -> Option<Option<Event>> {
        if !self.started {
            self.start_machine();
            return Some(None);
        }
        if !self.is_running() {
            return None;
        }
        // Flush delayed sends that are already due at the current clock.
        let due = self.datamodel.global().delays.advance(0);
        for entry in due {
            route_event(&self.fsm, self.datamodel.as_mut(), entry.target, entry.event);
        }
        match self.datamodel.global().external_queue.dequeue() {
            Some(event) => {
                self.fsm.deliver(self.datamodel.as_mut(), event.clone());
                Some(Some(event))
            }
            None => None,
        }
    }

    /// Drains all queued work without producing records. Used for child
    /// sessions, which never emit trace records of their own.
    pub fn run_to_idle(&mut self) {
        while self.step_once().is_some() {}
        self.datamodel.global().step = Default::default();
    }

    /// Runs one step and returns its trace record, or `None` when idle.
    pub fn poll_record(&mut self) -> Option<TraceRecord> {
        let consumed = self.step_once()?;
        Some(build_record(
            &self.fsm,
            self.datamodel.global(),
            consumed.as_ref(),
            &self.options,
        ))
    }

    /// Queues `event` (if any), then runs one step and returns the record.
    pub fn trace_step(&mut self, event: Option<Event>) -> Option<TraceRecord> {
        if let Some(e) = event {
            self.enqueue_event(e);
        }
        self.poll_record()
    }

    pub fn is_running(&self) -> bool {
        self.datamodel.global_s().running
    }

    /// Donedata of the root final state, once the machine completed.
    pub fn done_data(&self) -> Option<Data> {
        self.datamodel.global_s().done_data.clone()
    }

    /// Events produced for the parent session.
    pub fn take_outbox(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.datamodel.global().outbox)
    }

    pub fn in_configuration(&self, state_name: &str) -> bool {
        self.datamodel.global_s().in_state(state_name)
    }

    /// Active state names in document order (including the pseudo root).
    pub fn configuration(&self) -> Vec<String> {
        let global = self.datamodel.global_s();
        let mut ids: Vec<StateId> = global.configuration.to_list().iterator().cloned().collect();
        ids.sort_by(|a, b| self.fsm.state_document_order(a, b));
        ids.iter()
            .map(|sid| self.fsm.state_name(*sid).to_string())
            .collect()
    }

    /// Active atomic state names, sorted.
    pub fn leaf_configuration(&self) -> Vec<String> {
        let global = self.datamodel.global_s();
        let mut names: Vec<String> = global
            .configuration
            .to_list()
            .iterator()
            .filter(|sid| self.fsm.isAtomicState(**sid))
            .map(|sid| self.fsm.state_name(*sid).to_string())
            .collect();
        names.sort();
        names
    }

    /// Checks the structural configuration invariants. Returns a list of
    /// violations; an empty list means the configuration is legal.
    pub fn check_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let global = self.datamodel.global_s();
        if !global.running {
            return violations;
        }
        let config = &global.configuration;
        if !config.is_member(&self.fsm.pseudo_root) {
            violations.push("root state is not active".to_string());
        }
        for sid in config.iterator() {
            let state = self.fsm.get_state_by_id(*sid);
            if *sid != self.fsm.pseudo_root && !config.is_member(&state.parent) {
                violations.push(format!(
                    "state '{}' is active but its parent is not",
                    state.name
                ));
            }
            if state.is_parallel {
                for child in &state.states {
                    if !self.fsm.isHistoryState(*child) && !config.is_member(child) {
                        violations.push(format!(
                            "parallel '{}' is active but child '{}' is not",
                            state.name,
                            self.fsm.state_name(*child)
                        ));
                    }
                }
            } else if !state.is_final && !state.states.is_empty() {
                let active_children = state
                    .states
                    .iter()
                    .filter(|c| !self.fsm.isHistoryState(**c) && config.is_member(c))
                    .count();
                if active_children != 1 {
                    violations.push(format!(
                        "compound '{}' has {} active children",
                        state.name, active_children
                    ));
                }
            }
        }
        violations
    }
}
