//! Invocation of child machines.
//!
//! A child is an independent instance of the same interpreter core, owned
//! by the parent and keyed by invoke id. Children run to quiescence
//! synchronously whenever the parent interacts with them; events they
//! produce for the parent are pumped into the parent's external queue.
//! Finalize blocks run strictly before the associated `done.invoke.<id>`
//! becomes visible to parent transitions.

use crate::common::{debug, error};
use crate::datamodel::{
    data_to_json, Data, Datamodel, SCJSON_INVOKE_TYPE_SHORT, SCXML_INVOKE_TYPE,
    SCXML_INVOKE_TYPE_SHORT,
};
use crate::events::Event;
use crate::fsm::{DocumentId, ExecutableContentId, Fsm, Invoke, InvokeId, StateId};
use crate::interpreter::Runtime;
use crate::reader::ExecutionMode;

/// A running invocation.
pub struct ChildSession {
    pub invoke_id: InvokeId,
    /// State whose `<invoke>` created this session.
    pub state_id: StateId,
    pub doc_id: DocumentId,
    pub autoforward: bool,
    pub finalize: ExecutableContentId,
    pub runtime: Runtime,
}

/// Starts one invocation of a state that stayed active through the
/// macrostep.
///
/// *W3C says*: if the evaluation of its arguments produces an error, the
/// SCXML Processor must terminate the processing of the element without
/// further action.
pub fn start_invoke(fsm: &Fsm, datamodel: &mut dyn Datamodel, inv: &Invoke, state_id: StateId) {
    let type_name = match datamodel.get_expression_alternative_value(&inv.type_name, &inv.type_expr)
    {
        Ok(value) => value,
        Err(msg) => {
            datamodel.internal_error_execution(&msg);
            return;
        }
    };
    match type_name.as_str() {
        "" | SCXML_INVOKE_TYPE_SHORT | SCJSON_INVOKE_TYPE_SHORT | SCXML_INVOKE_TYPE => {}
        other => {
            let msg = format!("Unsupported <invoke> type '{}'", other);
            error!("{}", msg);
            datamodel.internal_error_communication(&msg);
            return;
        }
    }

    // W3C: If the 'idlocation' attribute is present, the SCXML Processor
    // must generate an id automatically when the <invoke> element is
    // evaluated. The automatically generated identifier must have the form
    // stateid.platformid.
    let invoke_id = if inv.invoke_id.is_empty() {
        format!(
            "{}.{}",
            inv.parent_state_name,
            datamodel.global().next_generated_id()
        )
    } else {
        inv.invoke_id.clone()
    };
    if !inv.external_id_location.is_empty() {
        datamodel.global().scope = fsm.scope_chain(state_id);
        datamodel
            .global()
            .set_scoped(&inv.external_id_location, Data::String(invoke_id.clone()));
    }

    let src = match datamodel.get_expression_alternative_value(&inv.src, &inv.src_expr) {
        Ok(value) => value,
        Err(msg) => {
            datamodel.internal_error_execution(&msg);
            return;
        }
    };

    // Payload from namelist and params.
    datamodel.global().scope = fsm.scope_chain(state_id);
    let mut payload: Vec<(String, Data)> = Vec::new();
    for name in &inv.name_list {
        match datamodel.get_by_location(name) {
            Ok(value) => payload.push((name.clone(), value)),
            Err(msg) => {
                datamodel.internal_error_execution(&msg);
                return;
            }
        }
    }
    datamodel.evaluate_params(&inv.params, &mut payload);

    let mut runtime = match build_child_runtime(fsm, datamodel, inv, &src) {
        Ok(rt) => rt,
        Err(msg) => {
            error!("<invoke> '{}' failed to load: {}", invoke_id, msg);
            datamodel.internal_error_communication(&msg);
            return;
        }
    };

    debug!("Invoke: '{}' src '{}'", invoke_id, src);

    // Payload is written into the child's root data scope before the
    // initial entry, so onentry sends can already see it.
    {
        let child_global = runtime.datamodel.global();
        child_global.is_child = true;
        child_global.caller_invoke_id = Some(invoke_id.clone());
        for (name, value) in payload {
            child_global.data.set(&name, value);
        }
        child_global.allow_unsafe_script = datamodel.global_s().allow_unsafe_script;
    }
    runtime.start_machine();

    let mut session = ChildSession {
        invoke_id: invoke_id.clone(),
        state_id,
        doc_id: inv.doc_id,
        autoforward: inv.autoforward,
        finalize: inv.finalize,
        runtime,
    };
    pump_outbox(datamodel, &mut session);
    let completed = !session.runtime.is_running();
    {
        let global = datamodel.global();
        global.child_sessions.insert(invoke_id.clone(), session);
        global.child_order.push(invoke_id.clone());
    }
    if completed {
        finish_completed(fsm, datamodel, vec![invoke_id]);
    }
}

fn build_child_runtime(
    _fsm: &Fsm,
    datamodel: &mut dyn Datamodel,
    inv: &Invoke,
    src: &str,
) -> Result<Runtime, String> {
    if !src.is_empty() {
        let mut path = std::path::PathBuf::from(src);
        if path.is_relative() {
            if let Some(base) = &datamodel.global_s().base_dir {
                path = base.join(path);
            }
        }
        let is_xml = path
            .extension()
            .map_or(false, |e| e.eq_ignore_ascii_case("scxml"));
        if is_xml {
            #[cfg(feature = "xml")]
            {
                return Runtime::from_xml_file(&path, ExecutionMode::Lax)
                    .map_err(|e| e.to_string());
            }
            #[cfg(not(feature = "xml"))]
            {
                return Err("XML support is not enabled".to_string());
            }
        }
        return Runtime::from_json_file(&path, ExecutionMode::Lax).map_err(|e| e.to_string());
    }
    let content = datamodel
        .evaluate_content(&inv.content)
        .ok_or_else(|| "<invoke> without src or content".to_string())?;
    match content {
        Data::Map(_) => {
            let value = data_to_json(&content);
            Runtime::from_json_value(&value, ExecutionMode::Lax).map_err(|e| e.to_string())
        }
        Data::String(text) => {
            let trimmed = text.trim();
            if trimmed.starts_with('<') {
                #[cfg(feature = "xml")]
                {
                    return Runtime::from_xml_str(trimmed, ExecutionMode::Lax)
                        .map_err(|e| e.to_string());
                }
                #[cfg(not(feature = "xml"))]
                {
                    return Err("XML support is not enabled".to_string());
                }
            }
            Runtime::from_json_str(trimmed, ExecutionMode::Lax).map_err(|e| e.to_string())
        }
        other => Err(format!("Unsupported <invoke> content '{}'", other)),
    }
}

/// Moves everything the child produced for its parent into the parent's
/// external queue, preserving order.
fn pump_outbox(datamodel: &mut dyn Datamodel, session: &mut ChildSession) {
    for event in session.runtime.take_outbox() {
        datamodel.global().external_queue.enqueue(event);
    }
}

/// Runs the finalize block of each completed invocation and then enqueues
/// the `done.invoke.<id>` events, both passes in child declaration order.
/// No `done.invoke` is emitted for cancelled sessions.
pub fn finish_completed(fsm: &Fsm, datamodel: &mut dyn Datamodel, completed: Vec<InvokeId>) {
    let mut done_events = Vec::new();
    for id in completed {
        let session = {
            let global = datamodel.global();
            global.child_order.retain(|x| *x != id);
            global.child_sessions.remove(&id)
        };
        let session = match session {
            None => continue,
            Some(s) => s,
        };
        let done_event = Event::done_invoke(&session.invoke_id, session.runtime.done_data());
        if session.finalize != 0 {
            // Finalize runs on the parent side, in the scope of the
            // invoking state, with the child's donedata bound as _event.
            datamodel.set_event(&done_event);
            datamodel.global().scope = fsm.scope_chain(session.state_id);
            fsm.executeContent(datamodel, session.finalize);
        }
        done_events.push(done_event);
    }
    for event in done_events {
        datamodel.global().external_queue.enqueue(event);
    }
}

/// Invoke handling applied to an external event before the transitions are
/// taken.
///
/// *W3C says*: First, if this event was generated by an invoked process,
/// apply `<finalize>` processing to it. Secondly, if any `<invoke>`
/// elements have autoforwarding set, forward the event to them. These
/// steps apply before the transitions are taken.
pub fn before_transition_processing(fsm: &Fsm, datamodel: &mut dyn Datamodel, event: &Event) {
    if let Some(invoke_id) = &event.invoke_id {
        let finalize = datamodel
            .global()
            .child_sessions
            .get(invoke_id)
            .map(|s| (s.state_id, s.finalize));
        if let Some((state_id, finalize_id)) = finalize {
            if finalize_id != 0 {
                datamodel.set_event(event);
                datamodel.global().scope = fsm.scope_chain(state_id);
                fsm.executeContent(datamodel, finalize_id);
            }
        }
    }

    // W3C: When the 'autoforward' attribute is set to true, the SCXML
    // Processor must send an exact copy of every external event it receives
    // to the invoked process, at the point at which it removes it from the
    // external event queue of the invoking session.
    let order = datamodel.global().child_order.clone();
    let mut sessions = std::mem::take(&mut datamodel.global().child_sessions);
    let mut completed = Vec::new();
    for id in &order {
        if let Some(session) = sessions.get_mut(id) {
            if session.autoforward {
                session.runtime.enqueue_event(event.clone());
                session.runtime.run_to_idle();
                pump_outbox(datamodel, session);
                if !session.runtime.is_running() {
                    completed.push(id.clone());
                }
            }
        }
    }
    datamodel.global().child_sessions = sessions;
    finish_completed(fsm, datamodel, completed);
}

/// Cancels every invocation owned by `state_id`. The child is dropped; no
/// `done.invoke` is emitted after a cancellation.
pub fn cancel_invocations_for_state(datamodel: &mut dyn Datamodel, state_id: StateId) {
    let global = datamodel.global();
    let ids: Vec<InvokeId> = global
        .child_order
        .iter()
        .filter(|id| {
            global
                .child_sessions
                .get(*id)
                .map_or(false, |s| s.state_id == state_id)
        })
        .cloned()
        .collect();
    for id in ids {
        debug!("Cancel invoke '{}'", id);
        global.child_sessions.remove(&id);
        global.child_order.retain(|x| *x != id);
    }
}

/// Delivers an event to the named child session. Returns false if the
/// session does not exist.
pub fn send_to_child(fsm: &Fsm, datamodel: &mut dyn Datamodel, invoke_id: &str, event: Event) -> bool {
    let mut session = match datamodel.global().child_sessions.remove(invoke_id) {
        None => return false,
        Some(s) => s,
    };
    session.runtime.enqueue_event(event);
    session.runtime.run_to_idle();
    pump_outbox(datamodel, &mut session);
    let completed = !session.runtime.is_running();
    datamodel
        .global()
        .child_sessions
        .insert(invoke_id.to_string(), session);
    if completed {
        finish_completed(fsm, datamodel, vec![invoke_id.to_string()]);
    }
    true
}
