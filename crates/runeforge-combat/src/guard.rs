//! Fault isolation for externally supplied logic.
//!
//! Proc handlers, tick callbacks, conditions and pipeline hooks come from
//! content modules. A failure in one of them is logged here and converted into
//! a value, so it never aborts sibling callbacks or the surrounding sweep.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use runeforge_common::{HandlerError, HandlerResult};
use tracing::warn;

/// Runs a callback, containing both reported errors and panics.
///
/// Returns the error (already logged) so callers can count failures.
pub fn isolate<F>(label: &str, callback: F) -> HandlerResult
where
    F: FnOnce() -> HandlerResult,
{
    let outcome = match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::Panicked(panic_message(payload.as_ref()))),
    };
    if let Err(ref error) = outcome {
        warn!(callback = label, %error, "external callback failed");
    }
    outcome
}

/// Runs a value-producing callback, returning `fallback` on failure.
pub fn isolate_value<T, F>(label: &str, fallback: T, callback: F) -> T
where
    F: FnOnce() -> Result<T, HandlerError>,
{
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(value)) => value,
        Ok(Err(error)) => {
            warn!(callback = label, %error, "external callback failed");
            fallback
        },
        Err(payload) => {
            let error = HandlerError::Panicked(panic_message(payload.as_ref()));
            warn!(callback = label, %error, "external callback panicked");
            fallback
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
