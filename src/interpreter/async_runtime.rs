// File: src/interpreter/async_runtime.rs
//
// Worker runtime behind Myco's asynchronous task primitives.
//
// User code runs on a single thread; the tokio pool here only services
// host-level tasks (timers, spawned computations). Results come back through
// a promise registry protected by a mutex, and the main thread collects them
// synchronously on await. User code never observes two statements
// interleaving.

use ahash::AHashMap;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;

use super::value::Value;
use crate::errors::{ErrorKind, MycoError, SourceLocation};

/// Global tokio runtime, initialized lazily on first use
static RUNTIME: Lazy<Runtime> =
    Lazy::new(|| Runtime::new().expect("Failed to create tokio runtime"));

/// Registry of outstanding promises, keyed by id
static PROMISES: Lazy<Mutex<AHashMap<u64, PromiseEntry>>> =
    Lazy::new(|| Mutex::new(AHashMap::new()));

static NEXT_PROMISE_ID: AtomicU64 = AtomicU64::new(1);

enum PromiseEntry {
    /// Result already available
    Ready(Value),
    /// A worker task will deliver the result
    Pending(oneshot::Receiver<Value>),
}

/// Async runtime wrapper providing task execution capabilities
pub struct AsyncRuntime;

impl AsyncRuntime {
    /// Get a reference to the global tokio runtime
    pub fn runtime() -> &'static Runtime {
        &RUNTIME
    }

    /// Register an already-resolved promise and return its id.
    /// Used by `spawn`, whose task body runs to completion on the main
    /// thread before the promise is observable.
    pub fn resolve_immediate(value: Value) -> u64 {
        let id = NEXT_PROMISE_ID.fetch_add(1, Ordering::Relaxed);
        PROMISES.lock().unwrap().insert(id, PromiseEntry::Ready(value));
        id
    }

    /// Register a promise resolved by a worker task after `ms` milliseconds
    pub fn sleep_promise(ms: u64) -> u64 {
        let id = NEXT_PROMISE_ID.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        Self::runtime().spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            let _ = tx.send(Value::Null);
        });
        PROMISES.lock().unwrap().insert(id, PromiseEntry::Pending(rx));
        id
    }

    /// Block the main thread until the promise resolves, then remove it
    /// from the registry. Awaiting an unknown id is an error.
    pub fn await_promise(id: u64) -> Result<Value, MycoError> {
        let entry = PROMISES.lock().unwrap().remove(&id);
        match entry {
            Some(PromiseEntry::Ready(value)) => Ok(value),
            Some(PromiseEntry::Pending(rx)) => {
                Self::runtime().block_on(rx).map_err(|_| {
                    MycoError::new(
                        ErrorKind::InternalError,
                        "Promise sender dropped before resolving".to_string(),
                        SourceLocation::unknown(),
                    )
                })
            }
            None => Err(MycoError::new(
                ErrorKind::InvalidFunctionCall,
                format!("Unknown or already-awaited promise id {}", id),
                SourceLocation::unknown(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_immediate_promise_round_trip() {
        let id = AsyncRuntime::resolve_immediate(Value::Number(42.0));
        let value = AsyncRuntime::await_promise(id).unwrap();
        assert!(value.equals(&Value::Number(42.0)));
    }

    #[test]
    fn test_double_await_is_an_error() {
        let id = AsyncRuntime::resolve_immediate(Value::Null);
        AsyncRuntime::await_promise(id).unwrap();
        let err = AsyncRuntime::await_promise(id).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidFunctionCall);
    }

    #[test]
    fn test_sleep_promise_blocks_for_duration() {
        let start = Instant::now();
        let id = AsyncRuntime::sleep_promise(50);
        let value = AsyncRuntime::await_promise(id).unwrap();
        assert!(value.equals(&Value::Null));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_promise_ids_are_distinct() {
        let a = AsyncRuntime::resolve_immediate(Value::Null);
        let b = AsyncRuntime::resolve_immediate(Value::Null);
        assert_ne!(a, b);
        let _ = AsyncRuntime::await_promise(a);
        let _ = AsyncRuntime::await_promise(b);
    }
}
