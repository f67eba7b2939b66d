//! Method mappings: named callables and plain values handed to a context.
//!
//! A [`Callable`] pairs the source text the code generator introspects with
//! the native handler the executor runs. Mappings are copied into a context
//! at creation or expose time; later edits to the caller's [`Methods`] have
//! no effect on contexts already built from it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::proxy::Peer;

type ImmediateFn = dyn Fn(Args) -> Result<Value> + Send + Sync;
type DeferredFn = dyn Fn(Args) -> BoxFuture<'static, Result<Value>> + Send + Sync;

/// Native body of a callable.
#[derive(Clone)]
pub(crate) enum Handler {
    /// Returns its result directly.
    Immediate(Arc<ImmediateFn>),
    /// Returns a deferred result that the executor awaits before replying.
    Deferred(Arc<DeferredFn>),
}

/// A function value that can be serialized into a bootstrap program and
/// executed by a context.
#[derive(Clone)]
pub struct Callable {
    source: Arc<str>,
    handler: Handler,
}

impl Callable {
    /// Create a callable whose handler completes synchronously.
    ///
    /// `source` is the function's own textual representation, in one of the
    /// declared-function, arrow or method-shorthand forms.
    pub fn new<F>(source: impl Into<String>, f: F) -> Self
    where
        F: Fn(Args) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            source: Arc::from(source.into()),
            handler: Handler::Immediate(Arc::new(f)),
        }
    }

    /// Create a callable whose handler returns a future.
    pub fn deferred<F, Fut>(source: impl Into<String>, f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handler: Arc<DeferredFn> = Arc::new(move |args| Box::pin(f(args)));
        Self {
            source: Arc::from(source.into()),
            handler: Handler::Deferred(handler),
        }
    }

    /// The function's source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether invoking this callable yields a deferred result.
    pub fn is_deferred(&self) -> bool {
        matches!(self.handler, Handler::Deferred(_))
    }

    pub(crate) fn handler(&self) -> &Handler {
        &self.handler
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("source", &self.source)
            .field("deferred", &self.is_deferred())
            .finish()
    }
}

/// A single entry of a method mapping.
#[derive(Debug, Clone)]
pub enum Method {
    /// A function, exposed through RPC stubs.
    Callable(Callable),
    /// Plain data, bound to its serialized literal.
    Plain(Value),
}

impl Method {
    /// Convert any serializable value into a plain entry.
    pub fn plain(value: impl Serialize) -> Result<Self> {
        Ok(Self::Plain(serde_json::to_value(value)?))
    }

    /// The callable, if this entry is one.
    pub fn as_callable(&self) -> Option<&Callable> {
        match self {
            Self::Callable(callable) => Some(callable),
            Self::Plain(_) => None,
        }
    }
}

impl From<Callable> for Method {
    fn from(callable: Callable) -> Self {
        Self::Callable(callable)
    }
}

impl From<Value> for Method {
    fn from(value: Value) -> Self {
        Self::Plain(value)
    }
}

/// Insertion-ordered mapping of names to methods.
#[derive(Debug, Clone, Default)]
pub struct Methods {
    entries: Vec<(String, Method)>,
}

impl Methods {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry. A replaced entry keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, method: impl Into<Method>) {
        let name = name.into();
        let method = method.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = method,
            None => self.entries.push((name, method)),
        }
    }

    /// Builder form of [`Methods::insert`] for callables.
    pub fn with_callable(mut self, name: impl Into<String>, callable: Callable) -> Self {
        self.insert(name, callable);
        self
    }

    /// Builder form of [`Methods::insert`] for plain values.
    pub fn with_plain(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Method> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, method)| method)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Method)> {
        self.entries.iter().map(|(name, method)| (name.as_str(), method))
    }

    /// Iterate only the callable entries, in insertion order.
    pub fn callables(&self) -> impl Iterator<Item = (&str, &Callable)> {
        self.iter()
            .filter_map(|(name, method)| method.as_callable().map(|c| (name, c)))
    }
}

impl<N: Into<String>, M: Into<Method>> FromIterator<(N, M)> for Methods {
    fn from_iter<I: IntoIterator<Item = (N, M)>>(iter: I) -> Self {
        let mut methods = Self::new();
        for (name, method) in iter {
            methods.insert(name, method);
        }
        methods
    }
}

/// Positional arguments of one invocation, plus a link back to the caller.
pub struct Args {
    values: Vec<Value>,
    peer: Option<Peer>,
}

impl Args {
    /// Arguments with no caller link (direct invocation).
    pub fn new(values: Vec<Value>) -> Self {
        Self { values, peer: None }
    }

    pub(crate) fn with_peer(values: Vec<Value>, peer: Peer) -> Self {
        Self {
            values,
            peer: Some(peer),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Decode the argument at `index`. A missing argument decodes from `null`,
    /// so `Option<T>` parameters may be omitted by the caller.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let value = self.values.get(index).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| Error::Argument {
            index,
            message: e.to_string(),
        })
    }

    /// The side that issued this call, for calling back into it.
    pub fn peer(&self) -> Option<&Peer> {
        self.peer.as_ref()
    }
}
