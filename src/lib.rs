//! A conformance oriented SCXML/SCJSON statechart runtime.
//!
//! The interpreter loads a hierarchical state machine described in SCXML
//! or its SCJSON projection and executes it step by step against an
//! external stream of events, producing a deterministic configuration
//! trace. Time is a virtual clock controlled by the host; nothing inside
//! the core blocks or touches the wall clock.
//!
//! Entry point is [interpreter::Runtime]:
//!
//! ```no_run
//! use scjson_engine::interpreter::Runtime;
//! use scjson_engine::reader::ExecutionMode;
//!
//! let mut rt = Runtime::from_json_file("chart.scjson", ExecutionMode::Strict).unwrap();
//! let initial = rt.trace_step(None).unwrap();
//! rt.enqueue("go", None);
//! while let Some(record) = rt.poll_record() {
//!     println!("{}", record.to_json_line());
//! }
//! # let _ = initial;
//! ```

pub mod common;
pub mod datamodel;
pub mod error;
pub mod events;
pub mod executable_content;
pub mod expression_engine;
pub mod fsm;
pub mod interpreter;
pub mod invoke;
pub mod reader;
#[cfg(feature = "xml")]
pub mod scxml_reader;
pub mod tracer;

#[cfg(test)]
mod tests;

pub use common::{get_arguments, init_logging, ArgOption};
pub use error::EngineError;
pub use interpreter::Runtime;
pub use reader::ExecutionMode;
