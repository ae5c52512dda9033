//! Error taxonomy of the runtime.
//!
//! Load-time failures are returned as `Err` values. Failures during
//! expression or action evaluation are *not* raised through this type;
//! they surface as internal `error.execution` / `error.communication`
//! events and never abort the interpreter.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The document does not match the SCJSON schema (or contains an
    /// unknown construct in strict mode).
    #[error("schema error: {0}")]
    Schema(String),

    /// Unresolved transition target, history outside a compound state,
    /// duplicate id.
    #[error("link error: {0}")]
    Link(String),

    /// Sandbox violation or expression runtime failure during load.
    #[error("eval error: {0}")]
    Eval(String),

    /// Malformed executable content, e.g. a `<send>` with a bad delay.
    #[error("action error: {0}")]
    Action(String),

    /// Child machine load failure or missing handler type.
    #[error("invoke error: {0}")]
    Invoke(String),

    /// A child runtime was stopped before completion.
    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
