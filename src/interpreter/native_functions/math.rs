// File: src/interpreter/native_functions/math.rs
//
// Math-related native functions: the number method table and the free
// functions exposed by the math library.

use super::{MethodFn, MethodTable};
use crate::builtins;
use crate::errors::{ErrorKind, MycoError, SourceLocation};
use crate::interpreter::Value;

fn number_of(v: &Value, context: &str) -> Result<f64, MycoError> {
    match v {
        Value::Number(n) => Ok(*n),
        other => Err(MycoError::new(
            ErrorKind::WrongArgumentType,
            format!("{} expects a number, got {}", context, other.type_name()),
            SourceLocation::unknown(),
        )),
    }
}

macro_rules! unary_method {
    ($name:ident, $f:path) => {
        fn $name(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
            if !args.is_empty() {
                return Err(MycoError::wrong_argument_count(stringify!($name), 0, args.len()));
            }
            let x = number_of(recv, stringify!($name))?;
            Ok(Value::Number($f(x)))
        }
    };
}

unary_method!(m_abs, builtins::abs);
unary_method!(m_sqrt, builtins::sqrt);
unary_method!(m_sin, builtins::sin);
unary_method!(m_cos, builtins::cos);
unary_method!(m_tan, builtins::tan);
unary_method!(m_floor, builtins::floor);
unary_method!(m_ceil, builtins::ceil);
unary_method!(m_round, builtins::round);

fn m_pow(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if args.len() != 1 {
        return Err(MycoError::wrong_argument_count("pow", 1, args.len()));
    }
    let base = number_of(recv, "pow")?;
    let exp = number_of(&args[0], "pow")?;
    Ok(Value::Number(builtins::pow(base, exp)))
}

/// Methods on number receivers
pub fn method_table() -> MethodTable {
    let entries: &[(&'static str, MethodFn)] = &[
        ("abs", m_abs),
        ("sqrt", m_sqrt),
        ("pow", m_pow),
        ("sin", m_sin),
        ("cos", m_cos),
        ("tan", m_tan),
        ("floor", m_floor),
        ("ceil", m_ceil),
        ("round", m_round),
    ];
    MethodTable::from_entries(entries)
}

/// Free functions: math library members plus random and range
pub fn handle(name: &str, args: &[Value]) -> Option<Result<Value, MycoError>> {
    let result = match name {
        "abs" | "sqrt" | "sin" | "cos" | "tan" | "floor" | "ceil" | "round" => {
            if args.len() != 1 {
                return Some(Err(MycoError::wrong_argument_count(name, 1, args.len())));
            }
            number_of(&args[0], name).map(|x| {
                Value::Number(match name {
                    "abs" => builtins::abs(x),
                    "sqrt" => builtins::sqrt(x),
                    "sin" => builtins::sin(x),
                    "cos" => builtins::cos(x),
                    "tan" => builtins::tan(x),
                    "floor" => builtins::floor(x),
                    "ceil" => builtins::ceil(x),
                    _ => builtins::round(x),
                })
            })
        }
        "pow" | "min" | "max" => {
            if args.len() != 2 {
                return Some(Err(MycoError::wrong_argument_count(name, 2, args.len())));
            }
            number_of(&args[0], name).and_then(|a| {
                number_of(&args[1], name).map(|b| {
                    Value::Number(match name {
                        "pow" => builtins::pow(a, b),
                        "min" => builtins::min(a, b),
                        _ => builtins::max(a, b),
                    })
                })
            })
        }
        "random" => {
            if !args.is_empty() {
                return Some(Err(MycoError::wrong_argument_count("random", 0, args.len())));
            }
            Ok(Value::Number(builtins::random()))
        }
        "random_int" => {
            if args.len() != 2 {
                return Some(Err(MycoError::wrong_argument_count("random_int", 2, args.len())));
            }
            number_of(&args[0], "random_int").and_then(|a| {
                number_of(&args[1], "random_int")
                    .map(|b| Value::Number(builtins::random_int(a, b)))
            })
        }
        "range" => {
            let mut nums = Vec::with_capacity(args.len());
            for arg in args {
                match number_of(arg, "range") {
                    Ok(n) => nums.push(n),
                    Err(e) => return Some(Err(e)),
                }
            }
            match builtins::make_range(&nums) {
                Some(range) => Ok(range),
                None => Err(MycoError::new(
                    ErrorKind::WrongArgumentCount,
                    "range() expects 1 to 3 numeric arguments with a nonzero step".to_string(),
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
    fn test_number_methods() {
        let mut nine = Value::Number(9.0);
        assert!(m_sqrt(&mut nine, &[]).unwrap().equals(&Value::Number(3.0)));
        let mut neg = Value::Number(-4.5);
        assert!(m_abs(&mut neg, &[]).unwrap().equals(&Value::Number(4.5)));
        let mut two = Value::Number(2.0);
        assert!(m_pow(&mut two, &[Value::Number(10.0)]).unwrap().equals(&Value::Number(1024.0)));
    }

    #[test]
    fn test_method_rejects_non_number_receiver() {
        let mut s = Value::str("x");
        assert!(m_sqrt(&mut s, &[]).is_err());
    }

    #[test]
    fn test_free_function_arity_checks() {
        let err = handle("sqrt", &[Value::Number(1.0), Value::Number(2.0)]).unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::WrongArgumentCount);
        let err = handle("pow", &[Value::Number(1.0)]).unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::WrongArgumentCount);
    }

    #[test]
    fn test_range_free_function() {
        let v = handle("range", &[Value::Number(3.0)]).unwrap().unwrap();
        assert!(matches!(v, Value::Range { start, end, .. } if start == 0.0 && end == 3.0));
        let err = handle("range", &[]).unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::WrongArgumentCount);
    }
}
