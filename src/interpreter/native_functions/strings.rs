// File: src/interpreter/native_functions/strings.rs
//
// String-related native functions: the string method table and the free
// functions exposed by the string library.

use super::{MethodFn, MethodTable};
use crate::errors::{ErrorKind, MycoError, SourceLocation};
use crate::interpreter::Value;

fn string_of(v: &Value, context: &str) -> Result<String, MycoError> {
    match v {
        Value::Str(s) => Ok(s.as_ref().clone()),
        other => Err(MycoError::new(
            ErrorKind::WrongArgumentType,
            format!("{} expects a string, got {}", context, other.type_name()),
            SourceLocation::unknown(),
        )),
    }
}

pub fn upper(s: &str) -> Value {
    Value::str(s.to_uppercase())
}

pub fn lower(s: &str) -> Value {
    Value::str(s.to_lowercase())
}

pub fn trim(s: &str) -> Value {
    Value::str(s.trim())
}

pub fn split(s: &str, sep: &str) -> Value {
    let parts: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| Value::str(c.to_string())).collect()
    } else {
        s.split(sep).map(Value::str).collect()
    };
    Value::array(parts)
}

pub fn replace(s: &str, from: &str, to: &str) -> Value {
    Value::str(s.replace(from, to))
}

fn m_upper(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if !args.is_empty() {
        return Err(MycoError::wrong_argument_count("upper", 0, args.len()));
    }
    Ok(upper(&string_of(recv, "upper")?))
}

fn m_lower(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if !args.is_empty() {
        return Err(MycoError::wrong_argument_count("lower", 0, args.len()));
    }
    Ok(lower(&string_of(recv, "lower")?))
}

fn m_trim(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if !args.is_empty() {
        return Err(MycoError::wrong_argument_count("trim", 0, args.len()));
    }
    Ok(trim(&string_of(recv, "trim")?))
}

fn m_split(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if args.len() != 1 {
        return Err(MycoError::wrong_argument_count("split", 1, args.len()));
    }
    let s = string_of(recv, "split")?;
    let sep = string_of(&args[0], "split")?;
    Ok(split(&s, &sep))
}

fn m_replace(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if args.len() != 2 {
        return Err(MycoError::wrong_argument_count("replace", 2, args.len()));
    }
    let s = string_of(recv, "replace")?;
    let from = string_of(&args[0], "replace")?;
    let to = string_of(&args[1], "replace")?;
    Ok(replace(&s, &from, &to))
}

/// Methods on string receivers
pub fn method_table() -> MethodTable {
    let entries: &[(&'static str, MethodFn)] = &[
        ("upper", m_upper),
        ("lower", m_lower),
        ("trim", m_trim),
        ("split", m_split),
        ("replace", m_replace),
    ];
    MethodTable::from_entries(entries)
}

/// Free functions: string library members taking the string first
pub fn handle(name: &str, args: &[Value]) -> Option<Result<Value, MycoError>> {
    let result = match name {
        "upper" | "lower" | "trim" => {
            if args.len() != 1 {
                return Some(Err(MycoError::wrong_argument_count(name, 1, args.len())));
            }
            string_of(&args[0], name).map(|s| match name {
                "upper" => upper(&s),
                "lower" => lower(&s),
                _ => trim(&s),
            })
        }
        "split" => {
            if args.len() != 2 {
                return Some(Err(MycoError::wrong_argument_count("split", 2, args.len())));
            }
            string_of(&args[0], "split")
                .and_then(|s| string_of(&args[1], "split").map(|sep| split(&s, &sep)))
        }
        "replace" => {
            if args.len() != 3 {
                return Some(Err(MycoError::wrong_argument_count("replace", 3, args.len())));
            }
            string_of(&args[0], "replace").and_then(|s| {
                string_of(&args[1], "replace").and_then(|from| {
                    string_of(&args[2], "replace").map(|to| replace(&s, &from, &to))
                })
            })
        }
        _ => return None,
    };
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_trim_methods() {
        let mut s = Value::str("  Hello  ");
        assert!(m_trim(&mut s, &[]).unwrap().equals(&Value::str("Hello")));
        let mut s = Value::str("Hello");
        assert!(m_upper(&mut s, &[]).unwrap().equals(&Value::str("HELLO")));
        assert!(m_lower(&mut s, &[]).unwrap().equals(&Value::str("hello")));
    }

    #[test]
    fn test_split_with_separator_and_empty() {
        let v = split("a,b,c", ",");
        assert!(v.equals(&Value::array(vec![Value::str("a"), Value::str("b"), Value::str("c")])));
        let v = split("ab", "");
        assert!(v.equals(&Value::array(vec![Value::str("a"), Value::str("b")])));
    }

    #[test]
    fn test_replace_all_occurrences() {
        let v = replace("a-b-c", "-", "_");
        assert!(v.equals(&Value::str("a_b_c")));
    }

    #[test]
    fn test_free_functions_take_string_first() {
        let v = handle("upper", &[Value::str("x")]).unwrap().unwrap();
        assert!(v.equals(&Value::str("X")));
        let err = handle("split", &[Value::str("a")]).unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::WrongArgumentCount);
    }
}
