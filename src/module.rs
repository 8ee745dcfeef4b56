// File: src/module.rs
//
// File-module loading for the Myco interpreter.
// Modules resolve relative to the importing file, execute in their own
// global environment, and are cached by canonical path plus source hash so
// an on-disk edit invalidates the cached compilation.

use crate::compiler::Compiler;
use crate::errors::{ErrorKind, MycoError, SourceLocation};
use crate::interpreter::{Interpreter, Value};
use crate::lexer::tokenize;
use crate::parser::Parser;
use crate::vm::{collect_exports, Vm};
use ahash::AHashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Cache of loaded modules plus the in-progress loading stack used for
/// circular-import detection
pub struct ModuleCache {
    loaded: AHashMap<String, Value>,
    loading: Vec<String>,
    search_paths: Vec<PathBuf>,
}

impl ModuleCache {
    pub fn new() -> Self {
        ModuleCache {
            loaded: AHashMap::new(),
            loading: Vec::new(),
            search_paths: vec![PathBuf::from("."), PathBuf::from("./modules")],
        }
    }

    #[allow(dead_code)]
    pub fn add_search_path<P: AsRef<Path>>(&mut self, path: P) {
        self.search_paths.push(path.as_ref().to_path_buf());
    }
}

impl Default for ModuleCache {
    fn default() -> Self {
        Self::new()
    }
}

/// FNV-1a over the module source; part of the cache key
fn source_hash(source: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in source.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Resolve a module name to an existing file path. Paths are tried relative
/// to the importing file's directory first, then the search paths.
fn resolve_module_path(
    name: &str,
    importing_file: Option<&str>,
    search_paths: &[PathBuf],
) -> Option<PathBuf> {
    let filename = if name.ends_with(".myco") {
        PathBuf::from(name)
    } else {
        PathBuf::from(format!("{}.myco", name))
    };

    if let Some(importer) = importing_file {
        if let Some(dir) = Path::new(importer).parent() {
            let candidate = dir.join(&filename);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    for search_path in search_paths {
        let candidate = search_path.join(&filename);
        if candidate.exists() {
            return Some(candidate);
        }
    }

    None
}

/// Load a file module, returning its Module value.
/// The module runs against a fresh global environment; bindings flagged
/// `export` become the module's exports.
pub fn load_module(interp: &mut Interpreter, name: &str) -> Result<Value, MycoError> {
    let path = resolve_module_path(
        name,
        interp.source_name.as_deref(),
        &interp.modules.search_paths,
    )
    .ok_or_else(|| MycoError::module_not_found(name))?;

    let canonical = path
        .canonicalize()
        .map_err(|e| {
            MycoError::new(
                ErrorKind::ModuleNotFound,
                format!("Cannot resolve module path {}: {}", path.display(), e),
                SourceLocation::unknown(),
            )
        })?
        .to_string_lossy()
        .to_string();

    let source = fs::read_to_string(&path).map_err(|e| {
        MycoError::new(
            ErrorKind::ModuleNotFound,
            format!("Failed to read module {}: {}", name, e),
            SourceLocation::unknown(),
        )
    })?;

    let key = format!("{}#{:016x}", canonical, source_hash(&source));

    if let Some(module) = interp.modules.loaded.get(&key) {
        return Ok(module.clone());
    }

    if interp.modules.loading.contains(&canonical) {
        return Err(MycoError::new(
            ErrorKind::ModuleNotFound,
            format!("Circular import detected: {}", name),
            SourceLocation::unknown(),
        ));
    }

    let tokens = tokenize(&source);
    let stmts = Parser::new(tokens).parse()?;
    let program = Compiler::compile(&stmts, false)?;
    let export_names = program.exports.clone();

    // The module runs in its own interpreter but shares the module cache so
    // nested imports see the loading stack and already-loaded modules
    let mut module_interp = Interpreter::new();
    module_interp.set_source(canonical.clone(), &source);
    module_interp.modules = std::mem::take(&mut interp.modules);
    module_interp.modules.loading.push(canonical.clone());

    let run_result = {
        let mut vm = Vm::new(&mut module_interp, program);
        vm.run()
    };

    module_interp.modules.loading.pop();
    interp.modules = std::mem::take(&mut module_interp.modules);
    run_result?;

    let module = collect_exports(&module_interp.globals, &export_names, name);
    interp.modules.loaded.insert(key, module.clone());
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn temp_module(name_hint: &str, source: &str) -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let dir = std::env::temp_dir()
            .join(format!("myco_mod_{}_{}", name_hint, COUNTER.fetch_add(1, Ordering::Relaxed)));
        fs::create_dir_all(&dir).expect("failed to create temp module dir");
        let path = dir.join(format!("{}.myco", name_hint));
        fs::write(&path, source).expect("failed to write temp module");
        path
    }

    #[test]
    fn test_source_hash_is_stable_and_content_sensitive() {
        assert_eq!(source_hash("abc"), source_hash("abc"));
        assert_ne!(source_hash("abc"), source_hash("abd"));
    }

    #[test]
    fn test_load_module_collects_exports() {
        let path = temp_module("greeter", "export let greeting = \"hi\"\nlet hidden = 1");
        let mut interp = Interpreter::new();
        interp.source_name = Some(path.parent().unwrap().join("main.myco").to_string_lossy().to_string());

        let module = load_module(&mut interp, "greeter").expect("load failed");
        match &module {
            Value::Module(m) => {
                assert!(m.exports.get("greeting").unwrap().equals(&Value::str("hi")));
                assert!(m.exports.get("hidden").is_none());
            }
            other => panic!("Expected module, got {:?}", other),
        }

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_module_cache_returns_same_module() {
        let path = temp_module("cached", "export let n = 42");
        let mut interp = Interpreter::new();
        interp.source_name = Some(path.parent().unwrap().join("main.myco").to_string_lossy().to_string());

        let first = load_module(&mut interp, "cached").expect("load failed");
        let second = load_module(&mut interp, "cached").expect("load failed");
        match (&first, &second) {
            (Value::Module(a), Value::Module(b)) => assert!(std::sync::Arc::ptr_eq(a, b)),
            other => panic!("Expected modules, got {:?}", other),
        }

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_module_reports_kind() {
        let mut interp = Interpreter::new();
        let err = load_module(&mut interp, "does_not_exist_anywhere").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ModuleNotFound);
    }

    #[test]
    fn test_exported_function_is_callable_through_module() {
        let path = temp_module("mathy", "export fn double(x) { return x * 2 }");
        let mut interp = Interpreter::new();
        interp.source_name = Some(path.parent().unwrap().join("main.myco").to_string_lossy().to_string());

        let module = load_module(&mut interp, "mathy").expect("load failed");
        match &module {
            Value::Module(m) => {
                assert!(matches!(m.exports.get("double"), Some(Value::Function(_))));
            }
            other => panic!("Expected module, got {:?}", other),
        }

        fs::remove_file(&path).ok();
    }
}
