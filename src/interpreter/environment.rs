// File: src/interpreter/environment.rs
//
// Lexical scoping environment for the Myco interpreter.
// A parent-linked chain of frames; closures retain a snapshot of the chain.

use super::value::Value;
use ahash::AHashMap;
use std::sync::{Arc, Mutex};

/// Shared handle to an environment frame. Frames are shared between the
/// interpreter's scope chain and closure captures.
pub type EnvRef = Arc<Mutex<Environment>>;

/// One frame of the scope chain: local bindings plus a parent pointer
#[derive(Debug, Default)]
pub struct Environment {
    bindings: AHashMap<String, Value>,
    parent: Option<EnvRef>,
}

impl Environment {
    /// Create a new frame chained onto an optional parent
    pub fn new(parent: Option<EnvRef>) -> EnvRef {
        Arc::new(Mutex::new(Environment { bindings: AHashMap::new(), parent }))
    }

    pub fn parent(&self) -> Option<EnvRef> {
        self.parent.clone()
    }

    /// Define a binding in this frame, shadowing any outer binding
    pub fn define(&mut self, name: &str, value: Value) {
        self.bindings.insert(name.to_string(), value);
    }

    /// All names bound in this frame (for REPL inspection and suggestions)
    pub fn local_names(&self) -> Vec<String> {
        self.bindings.keys().cloned().collect()
    }
}

/// Look a name up the chain, cloning the nearest binding
pub fn env_get(env: &EnvRef, name: &str) -> Option<Value> {
    let mut current = env.clone();
    loop {
        let next = {
            let frame = current.lock().unwrap();
            if let Some(value) = frame.bindings.get(name) {
                return Some(value.clone());
            }
            frame.parent.clone()
        };
        match next {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}

/// True if the name is bound anywhere in the chain
pub fn env_exists(env: &EnvRef, name: &str) -> bool {
    env_get(env, name).is_some()
}

/// Define in the given frame (shadowing)
pub fn env_define(env: &EnvRef, name: &str, value: Value) {
    env.lock().unwrap().define(name, value);
}

/// Assign to the nearest existing binding up the chain; if the name is
/// unbound, create it in the given frame
pub fn env_assign(env: &EnvRef, name: &str, value: Value) {
    let mut current = env.clone();
    loop {
        let next = {
            let mut frame = current.lock().unwrap();
            if frame.bindings.contains_key(name) {
                frame.bindings.insert(name.to_string(), value);
                return;
            }
            frame.parent.clone()
        };
        match next {
            Some(parent) => current = parent,
            None => {
                env.lock().unwrap().define(name, value);
                return;
            }
        }
    }
}

/// Snapshot for closure capture: clone this frame's bindings into a new
/// frame that shares the same parent chain. Later rebinding in the original
/// frame is not observed; assignment through the shared parents is.
pub fn env_copy(env: &EnvRef) -> EnvRef {
    let frame = env.lock().unwrap();
    Arc::new(Mutex::new(Environment {
        bindings: frame.bindings.clone(),
        parent: frame.parent.clone(),
    }))
}

/// Collect every name visible from the chain (for "Did you mean" hints)
pub fn env_visible_names(env: &EnvRef) -> Vec<String> {
    let mut names = Vec::new();
    let mut current = Some(env.clone());
    while let Some(frame_ref) = current {
        let frame = frame_ref.lock().unwrap();
        names.extend(frame.bindings.keys().cloned());
        current = frame.parent.clone();
    }
    names
}
