// File: src/interpreter/native_functions/collections.rs
//
// Collection-related native functions: method tables for arrays, objects
// (the map representation), and sets, plus the free functions of the arrays
// library.
//
// Mutating methods rewrite the receiver in place through copy-on-write; the
// VM writes the updated receiver back into its owning binding.

use super::{MethodFn, MethodTable};
use crate::errors::{ErrorKind, MycoError, SourceLocation};
use crate::interpreter::{ObjectMap, Value};
use std::sync::Arc;

fn wrong_type(context: &str, v: &Value) -> MycoError {
    MycoError::new(
        ErrorKind::WrongArgumentType,
        format!("{} cannot operate on {}", context, v.type_name()),
        SourceLocation::unknown(),
    )
}

fn string_of(v: &Value, context: &str) -> Result<String, MycoError> {
    match v {
        Value::Str(s) => Ok(s.as_ref().clone()),
        other => Err(wrong_type(context, other)),
    }
}

// === Array helpers shared by methods and free functions ===

pub fn array_contains(items: &[Value], needle: &Value) -> Value {
    Value::Bool(items.iter().any(|v| v.equals(needle)))
}

pub fn array_index_of(items: &[Value], needle: &Value) -> Value {
    match items.iter().position(|v| v.equals(needle)) {
        Some(i) => Value::Number(i as f64),
        None => Value::Number(-1.0),
    }
}

pub fn array_join(items: &[Value], sep: &str) -> Value {
    let parts: Vec<String> = items.iter().map(|v| v.to_display_string()).collect();
    Value::str(parts.join(sep))
}

pub fn array_unique(items: &[Value]) -> Value {
    let mut out: Vec<Value> = Vec::with_capacity(items.len());
    for v in items {
        if !out.iter().any(|u| u.equals(v)) {
            out.push(v.clone());
        }
    }
    Value::array(out)
}

/// Slice with Python-style negative index handling, clamped to bounds
pub fn array_slice(items: &[Value], start: f64, end: f64) -> Value {
    let len = items.len() as i64;
    let norm = |i: f64| -> i64 {
        let i = i as i64;
        if i < 0 {
            (len + i).max(0)
        } else {
            i.min(len)
        }
    };
    let s = norm(start);
    let e = norm(end);
    if s >= e {
        return Value::array(Vec::new());
    }
    Value::array(items[s as usize..e as usize].to_vec())
}

fn m_array_push(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if args.len() != 1 {
        return Err(MycoError::wrong_argument_count("push", 1, args.len()));
    }
    match recv {
        Value::Array(items) => {
            Arc::make_mut(items).push(args[0].clone());
            Ok(Value::Null)
        }
        other => Err(wrong_type("push", other)),
    }
}

fn m_array_pop(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if !args.is_empty() {
        return Err(MycoError::wrong_argument_count("pop", 0, args.len()));
    }
    match recv {
        Value::Array(items) => Ok(Arc::make_mut(items).pop().unwrap_or(Value::Null)),
        other => Err(wrong_type("pop", other)),
    }
}

fn m_array_contains(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if args.len() != 1 {
        return Err(MycoError::wrong_argument_count("contains", 1, args.len()));
    }
    match recv {
        Value::Array(items) => Ok(array_contains(items, &args[0])),
        other => Err(wrong_type("contains", other)),
    }
}

fn m_array_index_of(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if args.len() != 1 {
        return Err(MycoError::wrong_argument_count("indexOf", 1, args.len()));
    }
    match recv {
        Value::Array(items) => Ok(array_index_of(items, &args[0])),
        other => Err(wrong_type("indexOf", other)),
    }
}

fn m_array_join(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if args.len() != 1 {
        return Err(MycoError::wrong_argument_count("join", 1, args.len()));
    }
    let sep = string_of(&args[0], "join")?;
    match recv {
        Value::Array(items) => Ok(array_join(items, &sep)),
        other => Err(wrong_type("join", other)),
    }
}

fn m_array_unique(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if !args.is_empty() {
        return Err(MycoError::wrong_argument_count("unique", 0, args.len()));
    }
    match recv {
        Value::Array(items) => Ok(array_unique(items)),
        other => Err(wrong_type("unique", other)),
    }
}

fn m_array_slice(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    let items = match recv {
        Value::Array(items) => items.clone(),
        other => return Err(wrong_type("slice", other)),
    };
    let start = match args.first() {
        Some(Value::Number(n)) => *n,
        Some(other) => return Err(wrong_type("slice", other)),
        None => 0.0,
    };
    let end = match args.get(1) {
        Some(Value::Number(n)) => *n,
        Some(other) => return Err(wrong_type("slice", other)),
        None => items.len() as f64,
    };
    if args.len() > 2 {
        return Err(MycoError::wrong_argument_count("slice", 2, args.len()));
    }
    Ok(array_slice(&items, start, end))
}

fn m_array_concat(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if args.len() != 1 {
        return Err(MycoError::wrong_argument_count("concat", 1, args.len()));
    }
    match (&*recv, &args[0]) {
        (Value::Array(a), Value::Array(b)) => {
            let mut out = a.as_ref().clone();
            out.extend(b.iter().cloned());
            Ok(Value::array(out))
        }
        (Value::Array(_), other) | (other, _) => Err(wrong_type("concat", other)),
    }
}

pub fn array_method_table() -> MethodTable {
    let entries: &[(&'static str, MethodFn)] = &[
        ("push", m_array_push),
        ("pop", m_array_pop),
        ("contains", m_array_contains),
        ("indexOf", m_array_index_of),
        ("join", m_array_join),
        ("unique", m_array_unique),
        ("slice", m_array_slice),
        ("concat", m_array_concat),
    ];
    MethodTable::from_entries(entries)
}

// === Object (map) methods ===

fn m_map_has(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if args.len() != 1 {
        return Err(MycoError::wrong_argument_count("has", 1, args.len()));
    }
    let key = string_of(&args[0], "has")?;
    match recv {
        Value::Object(map) => Ok(Value::Bool(map.has(&key))),
        other => Err(wrong_type("has", other)),
    }
}

fn m_map_size(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if !args.is_empty() {
        return Err(MycoError::wrong_argument_count("size", 0, args.len()));
    }
    match recv {
        Value::Object(map) => Ok(Value::Number(map.len() as f64)),
        other => Err(wrong_type("size", other)),
    }
}

fn m_map_keys(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if !args.is_empty() {
        return Err(MycoError::wrong_argument_count("keys", 0, args.len()));
    }
    match recv {
        Value::Object(map) => {
            Ok(Value::array(map.keys().map(Value::str).collect()))
        }
        other => Err(wrong_type("keys", other)),
    }
}

fn m_map_values(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if !args.is_empty() {
        return Err(MycoError::wrong_argument_count("values", 0, args.len()));
    }
    match recv {
        Value::Object(map) => Ok(Value::array(map.iter().map(|(_, v)| v.clone()).collect())),
        other => Err(wrong_type("values", other)),
    }
}

fn m_map_delete(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if args.len() != 1 {
        return Err(MycoError::wrong_argument_count("delete", 1, args.len()));
    }
    let key = string_of(&args[0], "delete")?;
    match recv {
        Value::Object(map) => {
            let removed = Arc::make_mut(map).remove(&key);
            Ok(Value::Bool(removed.is_some()))
        }
        other => Err(wrong_type("delete", other)),
    }
}

fn m_map_clear(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if !args.is_empty() {
        return Err(MycoError::wrong_argument_count("clear", 0, args.len()));
    }
    match recv {
        Value::Object(map) => {
            Arc::make_mut(map).clear();
            Ok(Value::Null)
        }
        other => Err(wrong_type("clear", other)),
    }
}

fn m_map_update(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if args.len() != 1 {
        return Err(MycoError::wrong_argument_count("update", 1, args.len()));
    }
    let other = match &args[0] {
        Value::Object(map) => map.clone(),
        other => return Err(wrong_type("update", other)),
    };
    match recv {
        Value::Object(map) => {
            let map = Arc::make_mut(map);
            for (k, v) in other.iter() {
                map.set(k, v.clone());
            }
            Ok(Value::Null)
        }
        other => Err(wrong_type("update", other)),
    }
}

pub fn object_method_table() -> MethodTable {
    let entries: &[(&'static str, MethodFn)] = &[
        ("has", m_map_has),
        ("size", m_map_size),
        ("keys", m_map_keys),
        ("values", m_map_values),
        ("delete", m_map_delete),
        ("clear", m_map_clear),
        ("update", m_map_update),
    ];
    MethodTable::from_entries(entries)
}

// === Set methods ===

fn m_set_add(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if args.len() != 1 {
        return Err(MycoError::wrong_argument_count("add", 1, args.len()));
    }
    match recv {
        Value::Set(items) => {
            if !items.iter().any(|v| v.equals(&args[0])) {
                Arc::make_mut(items).push(args[0].clone());
            }
            Ok(Value::Null)
        }
        other => Err(wrong_type("add", other)),
    }
}

fn m_set_has(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if args.len() != 1 {
        return Err(MycoError::wrong_argument_count("has", 1, args.len()));
    }
    match recv {
        Value::Set(items) => Ok(array_contains(items, &args[0])),
        other => Err(wrong_type("has", other)),
    }
}

fn m_set_remove(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if args.len() != 1 {
        return Err(MycoError::wrong_argument_count("remove", 1, args.len()));
    }
    match recv {
        Value::Set(items) => {
            let pos = items.iter().position(|v| v.equals(&args[0]));
            if let Some(i) = pos {
                Arc::make_mut(items).remove(i);
            }
            Ok(Value::Bool(pos.is_some()))
        }
        other => Err(wrong_type("remove", other)),
    }
}

fn m_set_size(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if !args.is_empty() {
        return Err(MycoError::wrong_argument_count("size", 0, args.len()));
    }
    match recv {
        Value::Set(items) => Ok(Value::Number(items.len() as f64)),
        other => Err(wrong_type("size", other)),
    }
}

fn m_set_clear(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if !args.is_empty() {
        return Err(MycoError::wrong_argument_count("clear", 0, args.len()));
    }
    match recv {
        Value::Set(items) => {
            Arc::make_mut(items).clear();
            Ok(Value::Null)
        }
        other => Err(wrong_type("clear", other)),
    }
}

fn m_set_to_array(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if !args.is_empty() {
        return Err(MycoError::wrong_argument_count("toArray", 0, args.len()));
    }
    match recv {
        Value::Set(items) => Ok(Value::array(items.as_ref().clone())),
        other => Err(wrong_type("toArray", other)),
    }
}

fn m_set_union(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if args.len() != 1 {
        return Err(MycoError::wrong_argument_count("union", 1, args.len()));
    }
    match (&*recv, &args[0]) {
        (Value::Set(a), Value::Set(b)) => {
            let mut out = a.as_ref().clone();
            for v in b.iter() {
                if !out.iter().any(|u| u.equals(v)) {
                    out.push(v.clone());
                }
            }
            Ok(Value::Set(Arc::new(out)))
        }
        (Value::Set(_), other) | (other, _) => Err(wrong_type("union", other)),
    }
}

fn m_set_intersection(recv: &mut Value, args: &[Value]) -> Result<Value, MycoError> {
    if args.len() != 1 {
        return Err(MycoError::wrong_argument_count("intersection", 1, args.len()));
    }
    match (&*recv, &args[0]) {
        (Value::Set(a), Value::Set(b)) => {
            let out: Vec<Value> =
                a.iter().filter(|v| b.iter().any(|u| u.equals(v))).cloned().collect();
            Ok(Value::Set(Arc::new(out)))
        }
        (Value::Set(_), other) | (other, _) => Err(wrong_type("intersection", other)),
    }
}

pub fn set_method_table() -> MethodTable {
    let entries: &[(&'static str, MethodFn)] = &[
        ("add", m_set_add),
        ("has", m_set_has),
        ("remove", m_set_remove),
        ("size", m_set_size),
        ("clear", m_set_clear),
        ("toArray", m_set_to_array),
        ("union", m_set_union),
        ("intersection", m_set_intersection),
    ];
    MethodTable::from_entries(entries)
}

/// Free functions: arrays library members plus keys/values over objects
pub fn handle(name: &str, args: &[Value]) -> Option<Result<Value, MycoError>> {
    let result = match name {
        "contains" => {
            if args.len() != 2 {
                return Some(Err(MycoError::wrong_argument_count("contains", 2, args.len())));
            }
            match &args[0] {
                Value::Array(items) | Value::Set(items) => Ok(array_contains(items, &args[1])),
                Value::Str(s) => match &args[1] {
                    Value::Str(needle) => Ok(Value::Bool(s.contains(needle.as_str()))),
                    other => Err(wrong_type("contains", other)),
                },
                other => Err(wrong_type("contains", other)),
            }
        }
        "index_of" => {
            if args.len() != 2 {
                return Some(Err(MycoError::wrong_argument_count("index_of", 2, args.len())));
            }
            match &args[0] {
                Value::Array(items) => Ok(array_index_of(items, &args[1])),
                other => Err(wrong_type("index_of", other)),
            }
        }
        "join" => {
            if args.len() != 2 {
                return Some(Err(MycoError::wrong_argument_count("join", 2, args.len())));
            }
            match (&args[0], &args[1]) {
                (Value::Array(items), Value::Str(sep)) => Ok(array_join(items, sep)),
                (other, _) => Err(wrong_type("join", other)),
            }
        }
        "unique" => {
            if args.len() != 1 {
                return Some(Err(MycoError::wrong_argument_count("unique", 1, args.len())));
            }
            match &args[0] {
                Value::Array(items) => Ok(array_unique(items)),
                other => Err(wrong_type("unique", other)),
            }
        }
        "slice" => {
            if args.len() != 3 {
                return Some(Err(MycoError::wrong_argument_count("slice", 3, args.len())));
            }
            match (&args[0], &args[1], &args[2]) {
                (Value::Array(items), Value::Number(s), Value::Number(e)) => {
                    Ok(array_slice(items, *s, *e))
                }
                (other, _, _) => Err(wrong_type("slice", other)),
            }
        }
        "concat" => {
            if args.len() != 2 {
                return Some(Err(MycoError::wrong_argument_count("concat", 2, args.len())));
            }
            match (&args[0], &args[1]) {
                (Value::Array(a), Value::Array(b)) => {
                    let mut out = a.as_ref().clone();
                    out.extend(b.iter().cloned());
                    Ok(Value::array(out))
                }
                (other, _) => Err(wrong_type("concat", other)),
            }
        }
        "keys" => {
            if args.len() != 1 {
                return Some(Err(MycoError::wrong_argument_count("keys", 1, args.len())));
            }
            match &args[0] {
                Value::Object(map) => Ok(Value::array(map.keys().map(Value::str).collect())),
                other => Err(wrong_type("keys", other)),
            }
        }
        "values" => {
            if args.len() != 1 {
                return Some(Err(MycoError::wrong_argument_count("values", 1, args.len())));
            }
            match &args[0] {
                Value::Object(map) => {
                    Ok(Value::array(map.iter().map(|(_, v)| v.clone()).collect()))
                }
                other => Err(wrong_type("values", other)),
            }
        }
        _ => return None,
    };
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(values: &[f64]) -> Vec<Value> {
        values.iter().map(|n| Value::Number(*n)).collect()
    }

    #[test]
    fn test_push_and_pop_mutate_receiver() {
        let mut arr = Value::array(nums(&[1.0, 2.0]));
        m_array_push(&mut arr, &[Value::Number(3.0)]).unwrap();
        assert!(arr.equals(&Value::array(nums(&[1.0, 2.0, 3.0]))));

        let popped = m_array_pop(&mut arr, &[]).unwrap();
        assert!(popped.equals(&Value::Number(3.0)));
        assert!(arr.equals(&Value::array(nums(&[1.0, 2.0]))));
    }

    #[test]
    fn test_pop_on_empty_returns_null() {
        let mut arr = Value::array(vec![]);
        assert!(m_array_pop(&mut arr, &[]).unwrap().equals(&Value::Null));
    }

    #[test]
    fn test_push_does_not_affect_shared_clone() {
        let original = Value::array(nums(&[1.0]));
        let mut shared = original.clone();
        m_array_push(&mut shared, &[Value::Number(2.0)]).unwrap();
        // Copy-on-write keeps the original untouched
        assert!(original.equals(&Value::array(nums(&[1.0]))));
        assert!(shared.equals(&Value::array(nums(&[1.0, 2.0]))));
    }

    #[test]
    fn test_index_of_and_contains() {
        let items = nums(&[10.0, 20.0, 30.0]);
        assert!(array_index_of(&items, &Value::Number(20.0)).equals(&Value::Number(1.0)));
        assert!(array_index_of(&items, &Value::Number(99.0)).equals(&Value::Number(-1.0)));
        assert!(array_contains(&items, &Value::Number(30.0)).equals(&Value::Bool(true)));
    }

    #[test]
    fn test_join_and_unique() {
        let items = nums(&[1.0, 2.0, 2.0, 3.0]);
        assert!(array_join(&items, ", ").equals(&Value::str("1, 2, 2, 3")));
        assert!(array_unique(&items).equals(&Value::array(nums(&[1.0, 2.0, 3.0]))));
    }

    #[test]
    fn test_slice_negative_and_clamped() {
        let items = nums(&[1.0, 2.0, 3.0, 4.0]);
        assert!(array_slice(&items, 1.0, 3.0).equals(&Value::array(nums(&[2.0, 3.0]))));
        assert!(array_slice(&items, -2.0, 99.0).equals(&Value::array(nums(&[3.0, 4.0]))));
        assert!(array_slice(&items, 3.0, 1.0).equals(&Value::array(vec![])));
    }

    #[test]
    fn test_map_methods() {
        let mut map = ObjectMap::new();
        map.set("a", Value::Number(1.0));
        map.set("b", Value::Number(2.0));
        let mut obj = Value::object(map);

        assert!(m_map_has(&mut obj, &[Value::str("a")]).unwrap().equals(&Value::Bool(true)));
        assert!(m_map_size(&mut obj, &[]).unwrap().equals(&Value::Number(2.0)));
        assert!(m_map_keys(&mut obj, &[])
            .unwrap()
            .equals(&Value::array(vec![Value::str("a"), Value::str("b")])));

        assert!(m_map_delete(&mut obj, &[Value::str("a")]).unwrap().equals(&Value::Bool(true)));
        assert!(m_map_has(&mut obj, &[Value::str("a")]).unwrap().equals(&Value::Bool(false)));

        m_map_clear(&mut obj, &[]).unwrap();
        assert!(m_map_size(&mut obj, &[]).unwrap().equals(&Value::Number(0.0)));
    }

    #[test]
    fn test_set_union_and_intersection() {
        let mut a = Value::set_of(nums(&[1.0, 2.0]));
        let b = Value::set_of(nums(&[2.0, 3.0]));

        let union = m_set_union(&mut a, std::slice::from_ref(&b)).unwrap();
        match &union {
            Value::Set(items) => assert_eq!(items.len(), 3),
            other => panic!("Expected Set, got {:?}", other),
        }

        let inter = m_set_intersection(&mut a, &[b]).unwrap();
        match &inter {
            Value::Set(items) => {
                assert_eq!(items.len(), 1);
                assert!(items[0].equals(&Value::Number(2.0)));
            }
            other => panic!("Expected Set, got {:?}", other),
        }
    }

    #[test]
    fn test_set_add_deduplicates() {
        let mut s = Value::set_of(nums(&[1.0]));
        m_set_add(&mut s, &[Value::Number(1.0)]).unwrap();
        m_set_add(&mut s, &[Value::Number(2.0)]).unwrap();
        match &s {
            Value::Set(items) => assert_eq!(items.len(), 2),
            other => panic!("Expected Set, got {:?}", other),
        }
    }
}
