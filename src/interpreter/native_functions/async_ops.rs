// File: src/interpreter/native_functions/async_ops.rs
//
// Asynchronous task primitives exposed to user code.
//
// A promise is surfaced to user code as an object carrying a registry id;
// `spawn` itself is handled inside the VM (it must call a user function) and
// wraps the result through AsyncRuntime::resolve_immediate.

use crate::errors::{ErrorKind, MycoError, SourceLocation};
use crate::interpreter::{AsyncRuntime, ObjectMap, Value};

/// Reserved object key carrying the promise registry id
pub const PROMISE_ID_KEY: &str = "__promise_id__";

/// Wrap a registry id into the user-visible promise object
pub fn make_promise_value(id: u64) -> Value {
    let mut map = ObjectMap::new();
    map.set(PROMISE_ID_KEY, Value::Number(id as f64));
    Value::object(map)
}

/// Extract the registry id from a promise object
pub fn promise_id_of(v: &Value) -> Option<u64> {
    match v {
        Value::Object(map) => match map.get(PROMISE_ID_KEY) {
            Some(Value::Number(n)) => Some(*n as u64),
            _ => None,
        },
        _ => None,
    }
}

/// Free functions: await_promise and async_sleep
pub fn handle(name: &str, args: &[Value]) -> Option<Result<Value, MycoError>> {
    let result = match name {
        "await_promise" => {
            if args.len() != 1 {
                return Some(Err(MycoError::wrong_argument_count("await_promise", 1, args.len())));
            }
            match promise_id_of(&args[0]) {
                Some(id) => AsyncRuntime::await_promise(id),
                None => Err(MycoError::new(
                    ErrorKind::WrongArgumentType,
                    format!("await_promise expects a promise, got {}", args[0].type_name()),
                    SourceLocation::unknown(),
                )),
            }
        }
        "async_sleep" => {
            if args.len() != 1 {
                return Some(Err(MycoError::wrong_argument_count("async_sleep", 1, args.len())));
            }
            match &args[0] {
                Value::Number(ms) if *ms >= 0.0 => {
                    Ok(make_promise_value(AsyncRuntime::sleep_promise(*ms as u64)))
                }
                other => Err(MycoError::new(
                    ErrorKind::WrongArgumentType,
                    format!("async_sleep expects a non-negative number, got {}", other.to_display_string()),
                    SourceLocation::unknown(),
                )),
            }
        }
        _ => return None,
    };
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promise_object_round_trip() {
        let p = make_promise_value(7);
        assert_eq!(promise_id_of(&p), Some(7));
        assert_eq!(promise_id_of(&Value::Number(7.0)), None);
    }

    #[test]
    fn test_await_resolved_promise() {
        let id = AsyncRuntime::resolve_immediate(Value::str("done"));
        let p = make_promise_value(id);
        let v = handle("await_promise", &[p]).unwrap().unwrap();
        assert!(v.equals(&Value::str("done")));
    }

    #[test]
    fn test_sleep_then_await() {
        let p = handle("async_sleep", &[Value::Number(10.0)]).unwrap().unwrap();
        let v = handle("await_promise", &[p]).unwrap().unwrap();
        assert!(v.equals(&Value::Null));
    }

    #[test]
    fn test_await_rejects_non_promise() {
        let err = handle("await_promise", &[Value::Number(1.0)]).unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::WrongArgumentType);
    }
}
