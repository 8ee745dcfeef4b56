// File: src/interpreter/native_functions/type_ops.rs
//
// Type inspection, conversion, and the universal method table shared by
// every receiver type.

use super::{MethodFn, MethodTable};
use crate::errors::{ErrorKind, MycoError, SourceLocation};
use crate::interpreter::value::cast_to_number;
use crate::interpreter::Value;

/// Length of a value: characters, elements, entries, or iteration count
pub fn length_of(v: &Value) -> Result<Value, MycoError> {
    let len = match v {
        Value::Str(s) => s.chars().count() as f64,
        Value::Array(items) => items.len() as f64,
        Value::Set(items) => items.len() as f64,
        Value::Object(map) => map.len() as f64,
        Value::Range { start, end, step, inclusive } => {
            range_iteration_count(*start, *end, *step, *inclusive) as f64
        }
        other => {
            return Err(MycoError::new(
                ErrorKind::WrongArgumentType,
                format!("{} has no length", other.type_name()),
                SourceLocation::unknown(),
            ))
        }
    };
    Ok(Value::Number(len))
}

/// Number of values a range yields when iterated
pub fn range_iteration_count(start: f64, end: f64, step: f64, inclusive: bool) -> usize {
    if step == 0.0 {
        return 0;
    }
    let span = if step > 0.0 { end - start } else { start - end };
    if span < 0.0 {
        return 0;
    }
    let steps = span / step.abs();
    let count = if inclusive { steps.floor() + 1.0 } else { steps.ceil() };
    count.max(0.0) as usize
}

fn m_to_string(recv: &mut Value, _args: &[Value]) -> Result<Value, MycoError> {
    Ok(Value::str(recv.to_display_string()))
}

fn m_type(recv: &mut Value, _args: &[Value]) -> Result<Value, MycoError> {
    Ok(Value::str(recv.type_name()))
}

fn m_length(recv: &mut Value, _args: &[Value]) -> Result<Value, MycoError> {
    length_of(recv)
}

fn m_clone(recv: &mut Value, _args: &[Value]) -> Result<Value, MycoError> {
    Ok(recv.deep_clone())
}

macro_rules! is_method {
    ($name:ident, $pred:expr) => {
        fn $name(recv: &mut Value, _args: &[Value]) -> Result<Value, MycoError> {
            let pred: fn(&Value) -> bool = $pred;
            Ok(Value::Bool(pred(recv)))
        }
    };
}

is_method!(m_is_string, |v| matches!(v, Value::Str(_)));
is_method!(m_is_number, |v| matches!(v, Value::Number(_)));
is_method!(m_is_int, |v| matches!(v, Value::Number(n) if n.fract() == 0.0 && n.is_finite()));
is_method!(m_is_float, |v| matches!(v, Value::Number(n) if n.fract() != 0.0 || !n.is_finite()));
is_method!(m_is_bool, |v| matches!(v, Value::Bool(_)));
is_method!(m_is_array, |v| matches!(v, Value::Array(_)));
is_method!(m_is_null, |v| matches!(v, Value::Null));
is_method!(m_is_object, |v| matches!(v, Value::Object(_)));
is_method!(m_is_function, |v| matches!(v, Value::Function(_) | Value::NativeFunction(_)));

/// Methods available on every value
pub fn method_table() -> MethodTable {
    let entries: &[(&'static str, MethodFn)] = &[
        ("toString", m_to_string),
        ("type", m_type),
        ("length", m_length),
        ("clone", m_clone),
        ("isString", m_is_string),
        ("isNumber", m_is_number),
        ("isInt", m_is_int),
        ("isFloat", m_is_float),
        ("isBool", m_is_bool),
        ("isArray", m_is_array),
        ("isNull", m_is_null),
        ("isObject", m_is_object),
        ("isFunction", m_is_function),
    ];
    MethodTable::from_entries(entries)
}

fn expect_one<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value, MycoError> {
    if args.len() != 1 {
        return Err(MycoError::wrong_argument_count(name, 1, args.len()));
    }
    Ok(&args[0])
}

/// Free functions: type inspection and conversions
pub fn handle(name: &str, args: &[Value]) -> Option<Result<Value, MycoError>> {
    let result = match name {
        "type" => expect_one("type", args).map(|v| Value::str(v.type_name())),
        "len" => expect_one("len", args).and_then(length_of),
        "str" => expect_one("str", args).map(|v| Value::str(v.to_display_string())),
        "int" => expect_one("int", args)
            .and_then(cast_to_number)
            .map(|n| Value::Number(n.trunc())),
        "float" => expect_one("float", args).and_then(cast_to_number).map(Value::Number),
        "bool" => expect_one("bool", args).map(|v| Value::Bool(v.is_truthy())),
        "clone" => expect_one("clone", args).map(|v| v.deep_clone()),
        "assert" => {
            if args.is_empty() || args.len() > 2 {
                return Some(Err(MycoError::wrong_argument_count("assert", 1, args.len())));
            }
            if args[0].is_truthy() {
                Ok(Value::Null)
            } else {
                let message = args
                    .get(1)
                    .map(|m| m.to_display_string())
                    .unwrap_or_else(|| "Assertion failed".to_string());
                Err(MycoError::new(
                    ErrorKind::InternalError,
                    message,
                    SourceLocation::unknown(),
                ))
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
    fn test_length_of_each_type() {
        assert!(length_of(&Value::str("héllo")).unwrap().equals(&Value::Number(5.0)));
        assert!(length_of(&Value::array(vec![Value::Null; 3])).unwrap().equals(&Value::Number(3.0)));
        assert!(length_of(&Value::Number(1.0)).is_err());
    }

    #[test]
    fn test_range_iteration_count() {
        assert_eq!(range_iteration_count(0.0, 5.0, 1.0, false), 5);
        assert_eq!(range_iteration_count(0.0, 5.0, 1.0, true), 6);
        assert_eq!(range_iteration_count(0.0, 5.0, 2.0, false), 3);
        assert_eq!(range_iteration_count(0.0, 0.0, 1.0, false), 0);
        assert_eq!(range_iteration_count(5.0, 0.0, 1.0, false), 0);
        assert_eq!(range_iteration_count(5.0, 0.0, -1.0, false), 5);
    }

    #[test]
    fn test_int_truncates_and_float_preserves() {
        let v = handle("int", &[Value::str("3.9")]).unwrap().unwrap();
        assert!(v.equals(&Value::Number(3.0)));
        let v = handle("float", &[Value::str("3.9")]).unwrap().unwrap();
        assert!(v.equals(&Value::Number(3.9)));
    }

    #[test]
    fn test_bool_follows_truthiness() {
        let v = handle("bool", &[Value::str("")]).unwrap().unwrap();
        assert!(v.equals(&Value::Bool(false)));
        let v = handle("bool", &[Value::Number(2.0)]).unwrap().unwrap();
        assert!(v.equals(&Value::Bool(true)));
    }

    #[test]
    fn test_assert_failure_carries_message() {
        let err = handle("assert", &[Value::Bool(false), Value::str("boom")])
            .unwrap()
            .unwrap_err();
        assert_eq!(err.message, "boom");
    }

    #[test]
    fn test_is_int_vs_is_float() {
        let mut three = Value::Number(3.0);
        assert!(m_is_int(&mut three, &[]).unwrap().equals(&Value::Bool(true)));
        let mut frac = Value::Number(3.5);
        assert!(m_is_int(&mut frac, &[]).unwrap().equals(&Value::Bool(false)));
        assert!(m_is_float(&mut frac, &[]).unwrap().equals(&Value::Bool(true)));
    }
}
