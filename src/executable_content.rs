//! Implementation of "executable content" elements.
//! See [W3C:Executable Content](https://www.w3.org/TR/scxml/#executable)
//!
//! Action kinds are a tagged enum matched explicitly on the hot path; a
//! failing action raises `error.execution` and aborts the remainder of its
//! own block only.

use lazy_static::lazy_static;
use regex::Regex;

use crate::common::{debug, error};
use crate::datamodel::{data_to_json, data_to_string, Data, DataMap, Datamodel};
use crate::events::{Event, EventType, SendTarget};
use crate::fsm::{CommonContent, ExecutableContentId, Fsm, Parameter, StateId};

pub const TARGET_INTERNAL: &str = "#_internal";
pub const TARGET_PARENT: &str = "#_parent";
pub const TARGET_SESSION_PREFIX: &str = "#_scxml_";
pub const TARGET_INVOKE_PREFIX: &str = "#_";

pub const SCXML_EVENT_PROCESSOR: &str = "http://www.w3.org/TR/scxml/#SCXMLEventProcessor";

/// One executable content element.
#[derive(Debug)]
pub enum Action {
    /// *W3C says*:
    /// The `<raise>` element raises an event in the current SCXML session.
    /// Note that the event will not be processed until the current block of
    /// executable content has completed and all events that are already in
    /// the internal event queue have been processed.
    Raise { event: String },

    Assign { location: String, expr: String },

    Log { label: String, expr: String },

    /// `<if>` with its `<elseif>` chain; each branch pairs a condition with
    /// a content block. `else_content` is 0 when absent.
    If {
        branches: Vec<(String, ExecutableContentId)>,
        else_content: ExecutableContentId,
    },

    ForEach {
        array: String,
        item: String,
        index: String,
        content: ExecutableContentId,
    },

    Send(Box<SendParameters>),

    Cancel {
        send_id: String,
        send_id_expr: String,
    },

    /// `<script>`: ignored unless the runtime runs in unsafe-script mode,
    /// in which case the source goes through the sandboxed evaluator.
    Script { source: String },
}

/// Holds all parameters of a `<send>` call.
#[derive(Debug, Default)]
pub struct SendParameters {
    /// SCXML `<send>` attribute 'idlocation'.
    pub name_location: String,
    /// SCXML `<send>` attribute 'id'.
    pub name: String,
    pub event: String,
    pub event_expr: String,
    pub target: String,
    pub target_expr: String,
    pub type_value: String,
    pub type_expr: String,
    /// 'delay' in microseconds.
    pub delay_us: u64,
    pub delay_expr: String,
    pub name_list: Vec<String>,
    pub params: Option<Vec<Parameter>>,
    pub content: Option<CommonContent>,
    /// State whose actions scheduled this send; pending sends authored with
    /// 'idlocation' are cancelled when this state exits.
    pub parent_state_id: StateId,
}

/// Executes one content block. Returns false if the block was aborted by a
/// failing action; the failure has been raised as `error.execution` then.
pub fn execute_block(fsm: &Fsm, datamodel: &mut dyn Datamodel, content_id: ExecutableContentId) -> bool {
    let actions = match fsm.executable_content.get(&content_id) {
        Some(a) => a,
        None => return true,
    };
    for action in actions {
        if let Err(msg) = execute_action(fsm, datamodel, action) {
            if !msg.is_empty() {
                error!("Executable content failed: {}", msg);
                datamodel.internal_error_execution(&msg);
            }
            return false;
        }
    }
    true
}

/// An empty error message marks a failure that was already reported by a
/// nested block.
fn execute_action(fsm: &Fsm, datamodel: &mut dyn Datamodel, action: &Action) -> Result<(), String> {
    match action {
        Action::Raise { event } => {
            let global = datamodel.global();
            global.enqueue_internal(Event::raised(event));
            global
                .step
                .log_action("raise", serde_json::Value::String(event.clone()));
            Ok(())
        }
        Action::Assign { location, expr } => {
            datamodel.assign(location, expr)?;
            let value = datamodel
                .get_by_location(location)
                .map(|d| data_to_json(&d))
                .unwrap_or(serde_json::Value::Null);
            datamodel.global().step.log_action(
                "assign",
                serde_json::json!({"location": location, "value": value}),
            );
            Ok(())
        }
        Action::Log { label, expr } => {
            let value = if expr.is_empty() {
                Data::String(String::new())
            } else {
                datamodel.execute(expr)?
            };
            let msg = data_to_string(&value);
            datamodel.log(label, &msg);
            datamodel
                .global()
                .step
                .log_action("log", serde_json::Value::String(msg));
            Ok(())
        }
        Action::If {
            branches,
            else_content,
        } => {
            for (cond, content) in branches {
                if datamodel.execute_condition(cond)? {
                    // A nested abort stays contained in the branch block.
                    execute_block(fsm, datamodel, *content);
                    return Ok(());
                }
            }
            if *else_content != 0 {
                execute_block(fsm, datamodel, *else_content);
            }
            Ok(())
        }
        Action::ForEach {
            array,
            item,
            index,
            content,
        } => {
            let content = *content;
            let ok = datamodel.execute_for_each(array, item, index, &mut |dm| {
                execute_block(fsm, dm, content)
            });
            if ok {
                Ok(())
            } else {
                // The failure was reported where it happened.
                Err(String::new())
            }
        }
        Action::Send(params) => execute_send(fsm, datamodel, params),
        Action::Cancel {
            send_id,
            send_id_expr,
        } => {
            let id = datamodel.get_expression_alternative_value(send_id, send_id_expr)?;
            // Cancelling an unknown or delivered send-id is a silent no-op.
            datamodel.global().delays.cancel(&id);
            Ok(())
        }
        Action::Script { source } => {
            if datamodel.global().allow_unsafe_script {
                datamodel.execute(source)?;
            } else {
                debug!("<script> ignored (unsafe-script mode is off)");
            }
            Ok(())
        }
    }
}

/// Implements the execution of the `<send>` element.
/// Failures to reach the target put `error.communication` in the internal
/// queue; malformed attributes fail the action with `error.execution`.
fn execute_send(fsm: &Fsm, datamodel: &mut dyn Datamodel, p: &SendParameters) -> Result<(), String> {
    let target_spec = datamodel.get_expression_alternative_value(&p.target, &p.target_expr)?;
    let event_name = datamodel.get_expression_alternative_value(&p.event, &p.event_expr)?;
    if event_name.is_empty() {
        return Err("<send> without event".to_string());
    }

    // W3C: If the SCXML Processor does not support the type that is
    // specified, it must place the event error.execution on the internal
    // event queue.
    let type_value = datamodel.get_expression_alternative_value(&p.type_value, &p.type_expr)?;
    match type_value.as_str() {
        "" | "scxml" | SCXML_EVENT_PROCESSOR => {}
        other => {
            return Err(format!("Unsupported <send> type '{}'", other));
        }
    }

    let mut send_id = if p.name.is_empty() {
        None
    } else {
        Some(p.name.clone())
    };
    let mut owner: Option<StateId> = None;
    if !p.name_location.is_empty() {
        // W3C: If 'idlocation' is present, the processor generates an id
        // when the element is evaluated and stores it in that location.
        let state_part = if p.parent_state_id != 0 {
            fsm.state_name(p.parent_state_id).to_string()
        } else {
            "send".to_string()
        };
        let generated = {
            let global = datamodel.global();
            let n = global.next_generated_id();
            format!("{}.{}.{}", state_part, global.session_id, n)
        };
        datamodel
            .global()
            .set_scoped(&p.name_location, Data::String(generated.clone()));
        send_id = Some(generated);
        owner = Some(p.parent_state_id);
    }

    let mut values: Vec<(String, Data)> = Vec::new();
    for name in &p.name_list {
        let value = datamodel.get_by_location(name)?;
        values.push((name.clone(), value));
    }
    datamodel.evaluate_params(&p.params, &mut values);
    let content = datamodel.evaluate_content(&p.content);
    let data = match content {
        Some(c) => Some(c),
        None => {
            if values.is_empty() {
                None
            } else {
                let mut m = DataMap::new();
                for (name, value) in values {
                    m.insert(name, value);
                }
                Some(Data::Map(m))
            }
        }
    };

    let delay_us: i64 = if !p.delay_expr.is_empty() {
        let d = datamodel.execute(&p.delay_expr)?;
        parse_duration_to_micros(&data_to_string(&d))
    } else {
        p.delay_us as i64
    };
    if delay_us < 0 {
        return Err(format!("<send> has an invalid delay '{}'", p.delay_expr));
    }

    let target = resolve_target(datamodel, &target_spec)?;
    if delay_us > 0 && target == SendTarget::Internal {
        return Err("<send> with delay can't use the internal queue".to_string());
    }

    let event = Event {
        name: event_name,
        etype: if target == SendTarget::Internal {
            EventType::Internal
        } else {
            EventType::External
        },
        sendid: send_id.clone(),
        origin: None,
        invoke_id: datamodel.global().caller_invoke_id.clone(),
        data,
    };

    if delay_us > 0 {
        datamodel
            .global()
            .delays
            .schedule(event, delay_us as u64, send_id, target, owner);
    } else {
        route_event(fsm, datamodel, target, event);
    }
    Ok(())
}

/// Maps a `target` attribute value to a destination.
fn resolve_target(datamodel: &mut dyn Datamodel, target: &str) -> Result<SendTarget, String> {
    if target.is_empty() {
        return Ok(SendTarget::External);
    }
    match target {
        TARGET_INTERNAL => Ok(SendTarget::Internal),
        TARGET_PARENT => Ok(SendTarget::Parent),
        _ => {
            if let Some(session) = target.strip_prefix(TARGET_SESSION_PREFIX) {
                // Only the own session is addressable by session id.
                if session == datamodel.global().session_id.to_string() {
                    Ok(SendTarget::External)
                } else {
                    Err(format!("Unreachable <send> target '{}'", target))
                }
            } else if let Some(invoke_id) = target.strip_prefix(TARGET_INVOKE_PREFIX) {
                Ok(SendTarget::Child(invoke_id.to_string()))
            } else {
                Err(format!("Unsupported <send> target '{}'", target))
            }
        }
    }
}

/// Immediate delivery of a send. Unreachable destinations raise
/// `error.communication` without aborting the block.
pub fn route_event(fsm: &Fsm, datamodel: &mut dyn Datamodel, target: SendTarget, mut event: Event) {
    match target {
        SendTarget::Internal => {
            event.etype = EventType::Internal;
            datamodel.global().enqueue_internal(event);
        }
        SendTarget::External => {
            datamodel.global().external_queue.enqueue(event);
        }
        SendTarget::Parent => {
            let global = datamodel.global();
            if global.is_child {
                global.outbox.push(event);
            } else {
                let msg = "No parent session to send to".to_string();
                error!("{}", msg);
                datamodel.internal_error_communication(&msg);
            }
        }
        SendTarget::Child(invoke_id) => {
            if !crate::invoke::send_to_child(fsm, datamodel, &invoke_id, event) {
                let msg = format!("Unknown invoke target '{}'", invoke_id);
                error!("{}", msg);
                datamodel.internal_error_communication(&msg);
            }
        }
    }
}

/// Parses a duration like "200ms", "1.5s" or "2m" into microseconds.
/// RegExp: `\d*(\.\d+)?(ms|s|m|h|d)`. Returns -1 for malformed input.
pub fn parse_duration_to_micros(d: &str) -> i64 {
    lazy_static! {
        static ref DURATION_RE: Regex =
            Regex::new(r"^(\d*(\.\d+)?)(MS|S|M|H|D|ms|s|m|h|d)$").unwrap();
    }
    if d.is_empty() {
        return 0;
    }
    let caps = match DURATION_RE.captures(d) {
        None => return -1,
        Some(c) => c,
    };
    let value = caps.get(1).map_or("", |m| m.as_str());
    let unit = caps.get(3).map_or("", |m| m.as_str());
    if value.is_empty() {
        return 0;
    }
    let mut v: f64 = value.parse::<f64>().unwrap();
    match unit {
        "D" | "d" => {
            v = v * 24.0 * 60.0 * 60.0 * 1_000_000.0;
        }
        "H" | "h" => {
            v = v * 60.0 * 60.0 * 1_000_000.0;
        }
        "M" | "m" => {
            v = v * 60.0 * 1_000_000.0;
        }
        "S" | "s" => {
            v = v * 1_000_000.0;
        }
        "MS" | "ms" => {
            v *= 1000.0;
        }
        _ => {
            return -1;
        }
    }
    v.round() as i64
}

#[cfg(test)]
mod tests {
    use crate::executable_content::parse_duration_to_micros;

    #[test]
    fn delay_parse() {
        assert_eq!(parse_duration_to_micros("6.7s"), 6_700_000);
        assert_eq!(
            parse_duration_to_micros("0.5d"),
            12 * 60 * 60 * 1_000_000
        );
        assert_eq!(parse_duration_to_micros("1m"), 60 * 1_000_000);
        assert_eq!(parse_duration_to_micros("0.001s"), 1000);
        assert_eq!(parse_duration_to_micros("6.7S"), 6_700_000);
        assert_eq!(parse_duration_to_micros("100ms"), 100_000);
        assert_eq!(parse_duration_to_micros("1M"), 60 * 1_000_000);
        assert_eq!(parse_duration_to_micros(""), 0);

        assert_eq!(parse_duration_to_micros("x1S"), -1);
        assert_eq!(parse_duration_to_micros("1Sx"), -1);
    }
}
