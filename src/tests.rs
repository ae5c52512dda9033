//! Engine-level tests. Unit tests of the lexer, parser, queues and
//! duration parsing live next to their modules.

mod test_engine;
mod test_invoke;
mod test_ordered_set;
mod test_reader;
mod test_send;
mod test_trace;

use crate::interpreter::Runtime;
use crate::reader::ExecutionMode;

/// Loads a chart from JSON text and performs the initial entry, dropping
/// the initial trace record.
pub fn runtime_from(json: &str) -> Runtime {
    let mut rt = Runtime::from_json_str(json, ExecutionMode::Strict).expect("chart loads");
    let _ = rt.trace_step(None);
    rt
}

/// Delivers one external event and returns the resulting trace record.
pub fn step(rt: &mut Runtime, event: &str) -> crate::tracer::TraceRecord {
    rt.enqueue(event, None);
    rt.poll_record().expect("event is processed")
}
