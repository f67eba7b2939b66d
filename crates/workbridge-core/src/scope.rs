//! Bindings visible to an executor.
//!
//! A scope mirrors what a bootstrap program declares: top-level bindings for
//! a classic program, the `workerMethods` object for a module program. The
//! executor resolves call targets here.

use rustc_hash::FxHashMap;

use crate::codegen::WorkerType;
use crate::method::{Callable, Method, Methods};

#[derive(Debug, Clone, Default)]
pub struct ScriptScope {
    globals: FxHashMap<String, Method>,
    exports: FxHashMap<String, Method>,
}

impl ScriptScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bindings a program serialized from `methods` would declare.
    pub fn from_methods(methods: &Methods, worker_type: WorkerType) -> Self {
        let mut scope = Self::new();
        for (name, method) in methods.iter() {
            scope.bind(name, method.clone(), worker_type.is_module());
        }
        scope
    }

    fn table(&self, is_module: bool) -> &FxHashMap<String, Method> {
        if is_module { &self.exports } else { &self.globals }
    }

    /// Bind `name` unless it is already bound. Returns whether it was bound.
    pub fn bind(&mut self, name: impl Into<String>, method: Method, is_module: bool) -> bool {
        let table = if is_module {
            &mut self.exports
        } else {
            &mut self.globals
        };
        let name = name.into();
        if table.contains_key(&name) {
            return false;
        }
        table.insert(name, method);
        true
    }

    /// Resolve a call target. Plain values are not callable.
    pub fn resolve(&self, name: &str, is_module: bool) -> Option<&Callable> {
        self.table(is_module).get(name).and_then(Method::as_callable)
    }

    pub fn is_bound(&self, name: &str, is_module: bool) -> bool {
        self.table(is_module).contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.globals.len() + self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
