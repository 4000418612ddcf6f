// Panic isolation for subscriber callbacks
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

/// Result of a panic-guarded call
#[derive(Debug, PartialEq, Eq)]
pub enum PanicGuardResult<T> {
    Success(T),
    Panicked(String),
}

/// Run `f`, catching a panic and logging it under `context`.
/// The caller keeps running either way.
pub fn execute_guarded<F, T>(context: &str, f: F) -> PanicGuardResult<T>
where
    F: FnOnce() -> T,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => PanicGuardResult::Success(result),
        Err(panic_info) => {
            let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };

            warn!(context = %context, panic_msg = %panic_msg, "Subscriber panicked");
            PanicGuardResult::Panicked(panic_msg)
        }
    }
}
