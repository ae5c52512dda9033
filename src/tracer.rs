//! The trace recorder: collects the effects of one step and renders them
//! as one normalized JSON line, comparable across engine implementations.
//! Keys appear in stable (alphabetical) order in every record.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::datamodel::{data_to_json, Data, GlobalData};
use crate::events::Event;
use crate::fsm::{Fsm, StateId};

/// A transition committed during a step, in commit order.
#[derive(Debug, Clone)]
pub struct FiredRecord {
    pub source: String,
    pub targets: Vec<String>,
    pub event: Option<String>,
    pub cond: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FiredTransitionRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cond: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    pub source: String,
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionLogEntry {
    #[serde(rename = "type")]
    pub entry_type: String,
    pub value: serde_json::Value,
}

/// Accumulates the observable effects of the step currently executing.
/// Taken and reset by the recorder when the record is built.
#[derive(Default)]
pub struct StepAccumulator {
    pub fired: Vec<FiredRecord>,
    pub entered: Vec<StateId>,
    pub exited: Vec<StateId>,
    pub action_log: Vec<ActionLogEntry>,
    pub delta: BTreeMap<String, serde_json::Value>,
    pub errors: Vec<String>,
}

impl StepAccumulator {
    pub fn log_action(&mut self, entry_type: &str, value: serde_json::Value) {
        self.action_log.push(ActionLogEntry {
            entry_type: entry_type.to_string(),
            value,
        });
    }

    pub fn record_delta(&mut self, name: &str, value: &Data) {
        self.delta.insert(name.to_string(), data_to_json(value));
    }
}

/// Output shaping of trace records.
#[derive(Debug, Clone)]
pub struct TraceOptions {
    /// Restrict the configuration to atomic states.
    pub leaf_only: bool,
    pub omit_actions: bool,
    pub omit_delta: bool,
    pub omit_transitions: bool,
}

impl Default for TraceOptions {
    fn default() -> Self {
        TraceOptions {
            leaf_only: true,
            omit_actions: false,
            omit_delta: false,
            omit_transitions: false,
        }
    }
}

/// One JSONL record, fields in stable key order.
#[derive(Debug, Serialize)]
pub struct TraceRecord {
    #[serde(rename = "actionLog", skip_serializing_if = "Option::is_none")]
    pub action_log: Option<Vec<ActionLogEntry>>,

    pub configuration: Vec<String>,

    #[serde(rename = "datamodelDelta", skip_serializing_if = "Option::is_none")]
    pub datamodel_delta: Option<BTreeMap<String, serde_json::Value>>,

    #[serde(rename = "enteredStates")]
    pub entered_states: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,

    pub event: serde_json::Value,

    #[serde(rename = "exitedStates")]
    pub exited_states: Vec<String>,

    #[serde(rename = "firedTransitions", skip_serializing_if = "Option::is_none")]
    pub fired_transitions: Option<Vec<FiredTransitionRecord>>,
}

impl TraceRecord {
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Builds the record for the step whose effects are accumulated in
/// `global.step`, resetting the accumulator.
pub fn build_record(
    fsm: &Fsm,
    global: &mut GlobalData,
    event: Option<&Event>,
    options: &TraceOptions,
) -> TraceRecord {
    let step = std::mem::take(&mut global.step);

    let mut config_ids: Vec<StateId> = if global.running {
        global.configuration.to_list().iterator().cloned().collect()
    } else {
        // The interpreter exited; use the frozen final configuration.
        global
            .final_configuration
            .clone()
            .unwrap_or_default()
            .iter()
            .filter_map(|name| fsm.state_names.get(name).cloned())
            .collect()
    };
    if options.leaf_only {
        config_ids.retain(|sid| fsm.isAtomicState(*sid));
    }
    let mut configuration: Vec<String> = config_ids
        .iter()
        .map(|sid| fsm.state_name(*sid).to_string())
        .collect();
    configuration.sort();

    let entered_states = states_in_document_order(fsm, &step.entered);
    let exited_states = states_in_document_order(fsm, &step.exited);

    let event_value = match event {
        None => serde_json::Value::Null,
        Some(e) => {
            let mut o = serde_json::Map::new();
            o.insert(
                "data".to_string(),
                e.data
                    .as_ref()
                    .map(data_to_json)
                    .unwrap_or(serde_json::Value::Null),
            );
            o.insert("name".to_string(), serde_json::Value::String(e.name.clone()));
            serde_json::Value::Object(o)
        }
    };

    TraceRecord {
        action_log: if options.omit_actions {
            None
        } else {
            Some(step.action_log)
        },
        configuration,
        datamodel_delta: if options.omit_delta || step.delta.is_empty() {
            None
        } else {
            Some(step.delta)
        },
        entered_states,
        errors: step.errors,
        event: event_value,
        exited_states,
        fired_transitions: if options.omit_transitions {
            None
        } else {
            Some(
                step.fired
                    .into_iter()
                    .map(|f| FiredTransitionRecord {
                        cond: f.cond,
                        event: f.event,
                        source: f.source,
                        targets: f.targets,
                    })
                    .collect(),
            )
        },
    }
}

fn states_in_document_order(fsm: &Fsm, ids: &[StateId]) -> Vec<String> {
    let mut sorted: Vec<StateId> = ids.to_vec();
    sorted.sort_by(|a, b| fsm.state_document_order(a, b));
    sorted.dedup();
    sorted
        .iter()
        .map(|sid| fsm.state_name(*sid).to_string())
        .collect()
}
