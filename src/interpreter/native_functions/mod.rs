// File: src/interpreter/native_functions/mod.rs
//
// Host-callable dispatch for the Myco interpreter.
//
// Two surfaces live here:
//   * free functions installed in the global environment (print, len, ...),
//     dispatched by category module;
//   * per-receiver-type method tables registered once at startup, used by
//     the VM's method-call opcodes.

pub mod async_ops;
pub mod collections;
pub mod io;
pub mod math;
pub mod strings;
pub mod type_ops;

use super::{Interpreter, ObjectMap, Value};
use crate::errors::{find_closest_match, MycoError, SourceLocation};
use ahash::AHashMap;
use once_cell::sync::Lazy;

/// A built-in method: receives the receiver by mutable reference (mutators
/// rewrite it in place; the VM handles write-back to the owning binding)
pub type MethodFn = fn(&mut Value, &[Value]) -> Result<Value, MycoError>;

pub struct MethodTable {
    map: AHashMap<&'static str, MethodFn>,
}

impl MethodTable {
    pub fn from_entries(entries: &[(&'static str, MethodFn)]) -> Self {
        let mut map = AHashMap::new();
        for (name, f) in entries {
            map.insert(*name, *f);
        }
        Self { map }
    }

    pub fn get(&self, name: &str) -> Option<MethodFn> {
        self.map.get(name).copied()
    }
}

static UNIVERSAL_METHODS: Lazy<MethodTable> = Lazy::new(type_ops::method_table);
static STRING_METHODS: Lazy<MethodTable> = Lazy::new(strings::method_table);
static NUMBER_METHODS: Lazy<MethodTable> = Lazy::new(math::method_table);
static ARRAY_METHODS: Lazy<MethodTable> = Lazy::new(collections::array_method_table);
static OBJECT_METHODS: Lazy<MethodTable> = Lazy::new(collections::object_method_table);
static SET_METHODS: Lazy<MethodTable> = Lazy::new(collections::set_method_table);

/// Find the built-in method for a receiver: the universal table first, then
/// the receiver type's own table
pub fn lookup_method(receiver: &Value, name: &str) -> Option<MethodFn> {
    if let Some(f) = UNIVERSAL_METHODS.get(name) {
        return Some(f);
    }
    let table: &MethodTable = match receiver {
        Value::Str(_) => &STRING_METHODS,
        Value::Number(_) => &NUMBER_METHODS,
        Value::Array(_) => &ARRAY_METHODS,
        Value::Object(_) => &OBJECT_METHODS,
        Value::Set(_) => &SET_METHODS,
        _ => return None,
    };
    table.get(name)
}

/// Call a free host function by name. Unknown names produce an
/// UndefinedFunction error with a "Did you mean" suggestion.
pub fn call(
    interp: &mut Interpreter,
    name: &str,
    args: &[Value],
    line: u32,
    column: u32,
) -> Result<Value, MycoError> {
    if let Some(result) = io::handle(interp, name, args) {
        return result;
    }
    if let Some(result) = type_ops::handle(name, args) {
        return result;
    }
    if let Some(result) = math::handle(name, args) {
        return result;
    }
    if let Some(result) = strings::handle(name, args) {
        return result;
    }
    if let Some(result) = collections::handle(name, args) {
        return result;
    }
    if let Some(result) = async_ops::handle(name, args) {
        return result;
    }

    let mut err = MycoError::undefined_function(
        name,
        SourceLocation::new(line as usize, column as usize),
    );
    let candidates = interp.visible_names();
    if let Some(suggestion) = find_closest_match(name, &candidates) {
        err = err.with_suggestion(suggestion.to_string());
    }
    Err(err)
}

/// Materialize a builtin library as a namespace object for `use`
pub fn builtin_library(name: &str) -> Option<ObjectMap> {
    let members: &[&str] = match name {
        "math" => &[
            "abs", "sqrt", "pow", "sin", "cos", "tan", "floor", "ceil", "round", "min", "max",
            "random", "random_int",
        ],
        "string" => &["upper", "lower", "trim", "split", "replace"],
        "arrays" => &["contains", "index_of", "join", "unique", "slice", "concat"],
        _ => return None,
    };

    let mut exports = ObjectMap::new();
    if name == "math" {
        exports.set("PI", Value::Number(std::f64::consts::PI));
        exports.set("E", Value::Number(std::f64::consts::E));
    }
    for member in members {
        exports.set(member, Value::NativeFunction(member.to_string()));
    }
    Some(exports)
}
