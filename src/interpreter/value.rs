// File: src/interpreter/value.rs
//
// Runtime value types for the Myco programming language.
// Defines the tagged Value enum, the insertion-ordered object map, and the
// operator semantics shared by the compiler fast path and the VM.

use crate::ast::{Param, Stmt};
use crate::bytecode::Op;
use crate::errors::{ErrorKind, MycoError, SourceLocation};
use std::sync::Arc;

use super::environment::EnvRef;

/// Reserved object key naming the class of an instance
pub const CLASS_NAME_KEY: &str = "__class_name__";

/// Insertion-ordered string-keyed map backing objects and class instances
#[derive(Debug, Clone, Default)]
pub struct ObjectMap {
    entries: Vec<(String, Value)>,
}

impl ObjectMap {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert or update; insertion order is preserved on update
    pub fn set(&mut self, key: &str, value: Value) {
        for (k, v) in self.entries.iter_mut() {
            if k == key {
                *v = value;
                return;
            }
        }
        self.entries.push((key.to_string(), value));
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A user function value. The compiled body travels with the value (shared,
/// not copied) so functions stay callable after their defining program is
/// gone: REPL lines and module exports both outlive their compilation unit.
#[derive(Debug, Clone)]
pub struct FunctionValue {
    pub name: String,
    /// Id in the defining program's function table, kept for diagnostics
    pub func_id: usize,
    pub params: Vec<Param>,
    pub return_type: Option<String>,
    pub code: Arc<Vec<Op>>,
    /// Slot-to-name mapping when the body uses frame slots
    pub local_names: Arc<Vec<String>>,
    pub uses_slots: bool,
    /// Environment captured at definition time
    pub capture: Option<EnvRef>,
}

/// A class value: the body stays as AST because field initializers and
/// methods are evaluated at instantiation time
#[derive(Debug, Clone)]
pub struct ClassValue {
    pub name: String,
    pub parent: Option<String>,
    pub body: Arc<Vec<Stmt>>,
    pub env: EnvRef,
}

/// A loaded module: name plus its exports object
#[derive(Debug, Clone)]
pub struct ModuleValue {
    pub name: String,
    pub exports: ObjectMap,
}

/// Runtime values in the Myco interpreter
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    /// The sole numeric type; integer-ness is a display-time distinction
    Number(f64),
    /// Reference-counted for cheap cloning; contents are immutable
    Str(Arc<String>),
    Range { start: f64, end: f64, step: f64, inclusive: bool },
    Array(Arc<Vec<Value>>),
    Object(Arc<ObjectMap>),
    /// Unique elements, insertion-ordered
    Set(Arc<Vec<Value>>),
    Function(Arc<FunctionValue>),
    /// Host-provided callable, dispatched by name through the registry
    NativeFunction(String),
    Class(Arc<ClassValue>),
    Module(Arc<ModuleValue>),
    Error { message: String, code: i32 },
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(Arc::new(s.into()))
    }

    pub fn array(vec: Vec<Value>) -> Self {
        Value::Array(Arc::new(vec))
    }

    pub fn object(map: ObjectMap) -> Self {
        Value::Object(Arc::new(map))
    }

    pub fn set_of(vec: Vec<Value>) -> Self {
        let mut unique: Vec<Value> = Vec::with_capacity(vec.len());
        for v in vec {
            if !unique.iter().any(|u| u.equals(&v)) {
                unique.push(v);
            }
        }
        Value::Set(Arc::new(unique))
    }

    pub fn error(message: impl Into<String>, code: i32) -> Self {
        Value::Error { message: message.into(), code }
    }

    /// Runtime type name; numbers report Int or Float by exact-integer check
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    "Int"
                } else {
                    "Float"
                }
            }
            Value::Str(_) => "String",
            Value::Range { .. } => "Range",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
            Value::Set(_) => "Set",
            Value::Function(_) | Value::NativeFunction(_) => "Function",
            Value::Class(_) => "Class",
            Value::Module(_) => "Module",
            Value::Error { .. } => "Error",
        }
    }

    /// Truthiness: Null false, Bool itself, Number nonzero, String nonempty,
    /// every composite true
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Structural equality; functions and classes compare by identity
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (
                Value::Range { start: s1, end: e1, step: p1, inclusive: i1 },
                Value::Range { start: s2, end: e2, step: p2, inclusive: i2 },
            ) => s1 == s2 && e1 == e2 && p1 == p2 && i1 == i2,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Set(a), Value::Set(b)) => {
                a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| x.equals(y)))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).map(|w| v.equals(w)).unwrap_or(false))
            }
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::NativeFunction(a), Value::NativeFunction(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => Arc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Arc::ptr_eq(a, b),
            (Value::Error { message: m1, code: c1 }, Value::Error { message: m2, code: c2 }) => {
                m1 == m2 && c1 == c2
            }
            _ => false,
        }
    }

    /// Structural deep copy that shares nothing with the original
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::Str(s) => Value::Str(Arc::new(s.as_ref().clone())),
            Value::Array(items) => {
                Value::Array(Arc::new(items.iter().map(|v| v.deep_clone()).collect()))
            }
            Value::Set(items) => {
                Value::Set(Arc::new(items.iter().map(|v| v.deep_clone()).collect()))
            }
            Value::Object(map) => {
                let mut out = ObjectMap::new();
                for (k, v) in map.iter() {
                    out.set(k, v.deep_clone());
                }
                Value::Object(Arc::new(out))
            }
            other => other.clone(),
        }
    }

    /// Display form: exact integers print bare, other numbers six-decimal
    /// fixed, booleans and null capitalized, strings verbatim
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "Null".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.as_ref().clone(),
            Value::Range { start, end, inclusive, .. } => {
                let op = if *inclusive { "..=" } else { ".." };
                format!("{}{}{}", format_number(*start), op, format_number(*end))
            }
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_display_string()).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Set(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_display_string()).collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Object(map) => {
                if let Some(Value::Str(class)) = map.get(CLASS_NAME_KEY) {
                    format!("<{} instance>", class)
                } else {
                    "<object>".to_string()
                }
            }
            Value::Function(f) => format!("<function {}>", f.name),
            Value::NativeFunction(name) => format!("<native fn {}>", name),
            Value::Class(c) => format!("<class {}>", c.name),
            Value::Module(m) => format!("<module {}>", m.name),
            Value::Error { message, .. } => format!("Error: {}", message),
        }
    }
}

/// Exact integers print bare, everything else six-decimal fixed
/// (no scientific notation)
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.2e18 {
        format!("{}", n as i64)
    } else {
        format!("{:.6}", n)
    }
}

fn loc() -> SourceLocation {
    SourceLocation::unknown()
}

fn number_pair(a: &Value, b: &Value) -> Option<(f64, f64)> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Some((*x, *y)),
        _ => None,
    }
}

/// `+`: numeric addition, string concatenation, array concat/append
pub fn add(a: &Value, b: &Value) -> Result<Value, MycoError> {
    if let Some((x, y)) = number_pair(a, b) {
        return Ok(Value::Number(x + y));
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => {
            let mut s = x.as_ref().clone();
            s.push_str(y);
            Ok(Value::str(s))
        }
        (Value::Array(x), Value::Array(y)) => {
            let mut items = x.as_ref().clone();
            items.extend(y.iter().cloned());
            Ok(Value::array(items))
        }
        (Value::Array(x), scalar) => {
            let mut items = x.as_ref().clone();
            items.push(scalar.clone());
            Ok(Value::array(items))
        }
        _ => Err(MycoError::type_mismatch(
            format!("Cannot add {} and {}", a.type_name(), b.type_name()),
            loc(),
        )),
    }
}

pub fn subtract(a: &Value, b: &Value) -> Result<Value, MycoError> {
    number_pair(a, b).map(|(x, y)| Value::Number(x - y)).ok_or_else(|| {
        MycoError::type_mismatch(
            format!("Cannot subtract {} from {}", b.type_name(), a.type_name()),
            loc(),
        )
    })
}

pub fn multiply(a: &Value, b: &Value) -> Result<Value, MycoError> {
    number_pair(a, b).map(|(x, y)| Value::Number(x * y)).ok_or_else(|| {
        MycoError::type_mismatch(
            format!("Cannot multiply {} and {}", a.type_name(), b.type_name()),
            loc(),
        )
    })
}

pub fn divide(a: &Value, b: &Value) -> Result<Value, MycoError> {
    let (x, y) = number_pair(a, b).ok_or_else(|| {
        MycoError::type_mismatch(
            format!("Cannot divide {} by {}", a.type_name(), b.type_name()),
            loc(),
        )
    })?;
    if y == 0.0 {
        return Err(MycoError::division_by_zero(loc()));
    }
    Ok(Value::Number(x / y))
}

pub fn modulo(a: &Value, b: &Value) -> Result<Value, MycoError> {
    let (x, y) = number_pair(a, b).ok_or_else(|| {
        MycoError::type_mismatch(
            format!("Cannot take {} modulo {}", a.type_name(), b.type_name()),
            loc(),
        )
    })?;
    if y == 0.0 {
        return Err(MycoError::division_by_zero(loc()));
    }
    Ok(Value::Number(x % y))
}

pub fn power(a: &Value, b: &Value) -> Result<Value, MycoError> {
    number_pair(a, b).map(|(x, y)| Value::Number(x.powf(y))).ok_or_else(|| {
        MycoError::type_mismatch(
            format!("Cannot raise {} to {}", a.type_name(), b.type_name()),
            loc(),
        )
    })
}

fn compare(a: &Value, b: &Value, op: &str) -> Result<std::cmp::Ordering, MycoError> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x.partial_cmp(y).ok_or_else(|| {
                MycoError::type_mismatch("Cannot order NaN".to_string(), loc())
            })
        }
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        _ => Err(MycoError::type_mismatch(
            format!("Cannot compare {} {} {}", a.type_name(), op, b.type_name()),
            loc(),
        )),
    }
}

pub fn less_than(a: &Value, b: &Value) -> Result<Value, MycoError> {
    Ok(Value::Bool(compare(a, b, "<")? == std::cmp::Ordering::Less))
}

pub fn less_equal(a: &Value, b: &Value) -> Result<Value, MycoError> {
    Ok(Value::Bool(compare(a, b, "<=")? != std::cmp::Ordering::Greater))
}

pub fn greater_than(a: &Value, b: &Value) -> Result<Value, MycoError> {
    Ok(Value::Bool(compare(a, b, ">")? == std::cmp::Ordering::Greater))
}

pub fn greater_equal(a: &Value, b: &Value) -> Result<Value, MycoError> {
    Ok(Value::Bool(compare(a, b, ">=")? != std::cmp::Ordering::Less))
}

pub fn logical_and(a: &Value, b: &Value) -> Value {
    Value::Bool(a.is_truthy() && b.is_truthy())
}

pub fn logical_or(a: &Value, b: &Value) -> Value {
    Value::Bool(a.is_truthy() || b.is_truthy())
}

pub fn logical_xor(a: &Value, b: &Value) -> Value {
    Value::Bool(a.is_truthy() != b.is_truthy())
}

pub fn logical_not(a: &Value) -> Value {
    Value::Bool(!a.is_truthy())
}

pub fn negate(a: &Value) -> Result<Value, MycoError> {
    match a {
        Value::Number(n) => Ok(Value::Number(-n)),
        _ => Err(MycoError::type_mismatch(format!("Cannot negate {}", a.type_name()), loc())),
    }
}

fn bit_pair(a: &Value, b: &Value, op: &str) -> Result<(i64, i64), MycoError> {
    number_pair(a, b).map(|(x, y)| (x as i64, y as i64)).ok_or_else(|| {
        MycoError::type_mismatch(
            format!("Bitwise {} requires numbers, got {} and {}", op, a.type_name(), b.type_name()),
            loc(),
        )
    })
}

pub fn bitwise_and(a: &Value, b: &Value) -> Result<Value, MycoError> {
    let (x, y) = bit_pair(a, b, "&")?;
    Ok(Value::Number((x & y) as f64))
}

pub fn bitwise_or(a: &Value, b: &Value) -> Result<Value, MycoError> {
    let (x, y) = bit_pair(a, b, "|")?;
    Ok(Value::Number((x | y) as f64))
}

pub fn bitwise_xor(a: &Value, b: &Value) -> Result<Value, MycoError> {
    let (x, y) = bit_pair(a, b, "^")?;
    Ok(Value::Number((x ^ y) as f64))
}

pub fn shift_left(a: &Value, b: &Value) -> Result<Value, MycoError> {
    let (x, y) = bit_pair(a, b, "<<")?;
    Ok(Value::Number(((x as u64).wrapping_shl(y as u32)) as i64 as f64))
}

pub fn shift_right(a: &Value, b: &Value) -> Result<Value, MycoError> {
    let (x, y) = bit_pair(a, b, ">>")?;
    Ok(Value::Number((x.wrapping_shr(y as u32)) as f64))
}

/// Casts for the str/int/float/bool builtins
pub fn cast_to_number(v: &Value) -> Result<f64, MycoError> {
    match v {
        Value::Number(n) => Ok(*n),
        Value::Bool(true) => Ok(1.0),
        Value::Bool(false) => Ok(0.0),
        Value::Str(s) => s.trim().parse::<f64>().map_err(|_| {
            MycoError::new(
                ErrorKind::InvalidCast,
                format!("Cannot convert '{}' to a number", s),
                loc(),
            )
        }),
        Value::Null => Ok(0.0),
        other => Err(MycoError::new(
            ErrorKind::InvalidCast,
            format!("Cannot convert {} to a number", other.type_name()),
            loc(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_leaves_original_intact() {
        let original = Value::array(vec![
            Value::Number(1.0),
            Value::str("two"),
            Value::object({
                let mut m = ObjectMap::new();
                m.set("k", Value::Bool(true));
                m
            }),
        ]);
        let copy = original.deep_clone();
        assert!(copy.equals(&original));
        drop(original);
        // The copy still holds its own storage
        assert_eq!(copy.to_display_string(), "[1, two, <object>]");
    }

    #[test]
    fn test_truthiness_table() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(Value::Number(-1.5).is_truthy());
        assert!(!Value::str("").is_truthy());
        assert!(Value::str("x").is_truthy());
        assert!(Value::array(vec![]).is_truthy());
        assert!(Value::object(ObjectMap::new()).is_truthy());
    }

    #[test]
    fn test_number_display_integer_vs_fixed() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(2.5), "2.500000");
        assert_eq!(Value::Number(0.1).to_display_string(), "0.100000");
    }

    #[test]
    fn test_bool_and_null_display() {
        assert_eq!(Value::Bool(true).to_display_string(), "True");
        assert_eq!(Value::Bool(false).to_display_string(), "False");
        assert_eq!(Value::Null.to_display_string(), "Null");
    }

    #[test]
    fn test_array_display() {
        let arr = Value::array(vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]);
        assert_eq!(arr.to_display_string(), "[1, 2, 3]");
    }

    #[test]
    fn test_range_display() {
        let r = Value::Range { start: 0.0, end: 5.0, step: 1.0, inclusive: false };
        assert_eq!(r.to_display_string(), "0..5");
        let ri = Value::Range { start: 1.0, end: 3.0, step: 1.0, inclusive: true };
        assert_eq!(ri.to_display_string(), "1..=3");
    }

    #[test]
    fn test_add_overloads() {
        let n = add(&Value::Number(2.0), &Value::Number(3.0)).unwrap();
        assert!(n.equals(&Value::Number(5.0)));

        let s = add(&Value::str("foo"), &Value::str("bar")).unwrap();
        assert!(s.equals(&Value::str("foobar")));

        let a = add(
            &Value::array(vec![Value::Number(1.0)]),
            &Value::array(vec![Value::Number(2.0)]),
        )
        .unwrap();
        assert!(a.equals(&Value::array(vec![Value::Number(1.0), Value::Number(2.0)])));

        // Appending a scalar to an array
        let appended = add(&Value::array(vec![Value::Number(1.0)]), &Value::Number(2.0)).unwrap();
        assert!(appended.equals(&Value::array(vec![Value::Number(1.0), Value::Number(2.0)])));
    }

    #[test]
    fn test_add_type_mismatch() {
        let err = add(&Value::Bool(true), &Value::Number(1.0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_division_by_zero_is_error_not_fault() {
        let err = divide(&Value::Number(1.0), &Value::Number(0.0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
        let err = modulo(&Value::Number(1.0), &Value::Number(0.0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
    }

    #[test]
    fn test_arithmetic_matches_ieee754() {
        for (a, b) in [(1.5, 2.25), (-3.0, 7.0), (0.1, 0.2)] {
            let sum = add(&Value::Number(a), &Value::Number(b)).unwrap();
            assert!(sum.equals(&Value::Number(a + b)));
            let prod = multiply(&Value::Number(a), &Value::Number(b)).unwrap();
            assert!(prod.equals(&Value::Number(a * b)));
            let quot = divide(&Value::Number(a), &Value::Number(b)).unwrap();
            assert!(quot.equals(&Value::Number(a / b)));
        }
    }

    #[test]
    fn test_string_comparison_is_lexicographic() {
        let lt = less_than(&Value::str("apple"), &Value::str("banana")).unwrap();
        assert!(lt.equals(&Value::Bool(true)));
        let err = less_than(&Value::str("a"), &Value::Number(1.0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_structural_equality() {
        let a = Value::array(vec![Value::Number(1.0), Value::str("x")]);
        let b = Value::array(vec![Value::Number(1.0), Value::str("x")]);
        assert!(a.equals(&b));

        let mut m1 = ObjectMap::new();
        m1.set("a", Value::Number(1.0));
        let mut m2 = ObjectMap::new();
        m2.set("a", Value::Number(1.0));
        assert!(Value::object(m1).equals(&Value::object(m2)));
    }

    #[test]
    fn test_object_map_preserves_insertion_order() {
        let mut m = ObjectMap::new();
        m.set("z", Value::Number(1.0));
        m.set("a", Value::Number(2.0));
        m.set("z", Value::Number(3.0));
        let keys: Vec<&str> = m.keys().collect();
        assert_eq!(keys, vec!["z", "a"]);
        assert!(m.get("z").unwrap().equals(&Value::Number(3.0)));
    }

    #[test]
    fn test_set_deduplicates() {
        let s = Value::set_of(vec![Value::Number(1.0), Value::Number(1.0), Value::Number(2.0)]);
        match s {
            Value::Set(items) => assert_eq!(items.len(), 2),
            other => panic!("Expected Set, got {:?}", other),
        }
    }

    #[test]
    fn test_type_names_split_int_float() {
        assert_eq!(Value::Number(3.0).type_name(), "Int");
        assert_eq!(Value::Number(3.5).type_name(), "Float");
    }

    #[test]
    fn test_bitwise_and_shifts() {
        let v = bitwise_and(&Value::Number(6.0), &Value::Number(3.0)).unwrap();
        assert!(v.equals(&Value::Number(2.0)));
        let v = shift_left(&Value::Number(1.0), &Value::Number(4.0)).unwrap();
        assert!(v.equals(&Value::Number(16.0)));
        let v = shift_right(&Value::Number(16.0), &Value::Number(2.0)).unwrap();
        assert!(v.equals(&Value::Number(4.0)));
    }
}
