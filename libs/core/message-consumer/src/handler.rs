//! Message handlers.
//!
//! A handler receives a decoded queue message or the field mapping of a
//! stream entry and reports whether it processed it. Any
//! `Fn(&M) -> eyre::Result<bool>` closure is a handler:
//!
//! ```rust,ignore
//! use message_consumer::StreamFields;
//!
//! let handler = |fields: &StreamFields| -> eyre::Result<bool> {
//!     tracing::info!(?fields, "Processing");
//!     Ok(true)
//! };
//! ```
//!
//! Handlers run to completion on the consumer's task. They are never
//! interrupted by shutdown.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Processes one message of type `M`.
///
/// Return `Ok(true)` when the message was processed, `Ok(false)` to reject
/// it, or `Err` when processing failed.
pub trait MessageHandler<M: ?Sized>: Send + Sync {
    fn handle(&self, message: &M) -> eyre::Result<bool>;
}

impl<M: ?Sized, F> MessageHandler<M> for F
where
    F: Fn(&M) -> eyre::Result<bool> + Send + Sync,
{
    fn handle(&self, message: &M) -> eyre::Result<bool> {
        self(message)
    }
}

/// Why a handler did not process a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerFailure {
    /// The handler returned `false`
    Rejected,
    /// The handler returned an error or panicked
    Faulted(String),
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerFailure::Rejected => write!(f, "handler returned false"),
            HandlerFailure::Faulted(reason) => write!(f, "handler faulted: {}", reason),
        }
    }
}

/// Run a handler, turning `false`, errors and panics into a `HandlerFailure`.
pub(crate) fn invoke<M, H>(handler: &H, message: &M) -> Result<(), HandlerFailure>
where
    M: ?Sized,
    H: MessageHandler<M> + ?Sized,
{
    match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(message))) {
        Ok(Ok(true)) => Ok(()),
        Ok(Ok(false)) => Err(HandlerFailure::Rejected),
        Ok(Err(e)) => Err(HandlerFailure::Faulted(format!("{:#}", e))),
        Err(payload) => Err(HandlerFailure::Faulted(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic: {}", message)
    } else {
        "panic: <non-string payload>".to_string()
    }
}
