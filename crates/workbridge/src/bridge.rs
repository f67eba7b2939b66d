//! The bridge instance: registry of named contexts, shared call
//! correlation and the event bus.
//!
//! ## Lifecycle
//!
//! A name moves from absent to created on [`Bridge::create_worker`] and back
//! to absent on destroy. Creating a name that is already present returns the
//! existing handle; creating it again after destroy builds a new context.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::runtime::Handle;
use workbridge_core::{
    Bootstrap, CapabilityTable, Correlation, Endpoint, Entrypoint, Error, EventBus, Imports,
    Intrinsic, Listener, MAIN_CONTEXT, Methods, Peer, Result, ScriptScope, WorkerType, expose,
};

use crate::config::BridgeConfig;
use crate::context::{ContextHandle, ContextParts};
use crate::pump::listen;
use crate::platform::{Platform, ThreadPlatform, Transport};

/// Options for creating a context.
#[derive(Debug, Clone, Default)]
pub struct WorkerOptions {
    methods: Methods,
    imports: Option<Imports>,
    is_shared_worker: bool,
    worker_type: WorkerType,
}

impl WorkerOptions {
    pub fn new(methods: Methods) -> Self {
        Self {
            methods,
            ..Self::default()
        }
    }

    /// Scripts to load ahead of the methods.
    pub fn imports(mut self, imports: impl Into<Imports>) -> Self {
        self.imports = Some(imports.into());
        self
    }

    /// Use the port-based transport.
    pub fn shared(mut self, is_shared_worker: bool) -> Self {
        self.is_shared_worker = is_shared_worker;
        self
    }

    pub fn worker_type(mut self, worker_type: WorkerType) -> Self {
        self.worker_type = worker_type;
        self
    }
}

/// Options for exposing more methods on an existing context.
#[derive(Debug, Clone, Default)]
pub struct ExposeOptions {
    methods: Methods,
    is_module: Option<bool>,
}

impl ExposeOptions {
    pub fn new(methods: Methods) -> Self {
        Self {
            methods,
            is_module: None,
        }
    }

    /// Resolve calls through the module export object. Defaults to the
    /// context's own worker type.
    pub fn module(mut self, is_module: bool) -> Self {
        self.is_module = Some(is_module);
        self
    }
}

/// Host-side RPC bridge.
///
/// Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

pub(crate) struct BridgeInner {
    config: BridgeConfig,
    platform: Arc<dyn Platform>,
    contexts: Mutex<FxHashMap<String, ContextHandle>>,
    correlation: Arc<Correlation>,
    events: Arc<EventBus>,
}

impl BridgeInner {
    /// Clear `handle`'s slot if it still holds `handle`, then shut it down.
    pub(crate) fn destroy_context(&self, handle: &ContextHandle) {
        {
            let mut contexts = self.contexts.lock();
            if contexts.get(handle.name()) == Some(handle) {
                contexts.remove(handle.name());
            }
        }
        handle.shutdown();
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Bridge {
    /// A bridge on the thread platform with default settings.
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        let platform = ThreadPlatform::new(&config);
        Self::with_platform(config, platform)
    }

    pub fn with_platform(config: BridgeConfig, platform: impl Platform) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                correlation: Arc::new(Correlation::with_prefix(config.call_id_prefix.clone())),
                config,
                platform: Arc::new(platform),
                contexts: Mutex::new(FxHashMap::default()),
                events: Arc::new(EventBus::new()),
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Create the default context, or return it if it already exists.
    pub fn init(&self, options: WorkerOptions) -> Result<ContextHandle> {
        self.create_worker(MAIN_CONTEXT, options)
    }

    /// Create the context `name`, or return the live one of that name.
    ///
    /// Must be called from within a tokio runtime; the host's router runs on
    /// it.
    pub fn create_worker(&self, name: &str, options: WorkerOptions) -> Result<ContextHandle> {
        if options.methods.is_empty() {
            return Err(Error::Config(format!(
                "methods are required to create context `{name}`"
            )));
        }

        let mut contexts = self.inner.contexts.lock();
        if let Some(existing) = contexts.get(name) {
            tracing::debug!(context = name, "context already exists");
            return Ok(existing.clone());
        }

        let runtime = Handle::try_current().map_err(|_| {
            Error::Platform("creating a context requires a running tokio runtime".to_string())
        })?;

        let WorkerOptions {
            methods,
            imports,
            is_shared_worker,
            worker_type,
        } = options;

        let bootstrap = Bootstrap::assemble(
            &methods,
            imports.as_ref(),
            worker_type,
            Entrypoint::for_shared(is_shared_worker),
        )?;
        let mut transport = if is_shared_worker {
            Transport::Shared(self.inner.platform.create_shared_worker(name, bootstrap)?)
        } else {
            Transport::Dedicated(self.inner.platform.create_worker(name, bootstrap)?)
        };

        let port = transport.port_mut();
        let inbox = port.start()?;
        let worker_name = (name != MAIN_CONTEXT).then(|| name.to_string());
        let peer = Peer::new(
            Arc::new(port.sender()),
            self.inner.correlation.clone(),
            worker_name,
        );

        let host_scope = Arc::new(RwLock::new(ScriptScope::new()));
        let endpoint =
            Endpoint::new(peer.clone(), host_scope.clone()).with_events(self.inner.events.clone());
        let listener = runtime.spawn(listen(endpoint, inbox));

        let channel = if is_shared_worker {
            Intrinsic::Port
        } else {
            Intrinsic::Terminate
        };
        let mut members =
            CapabilityTable::with_intrinsics(&[Intrinsic::PostMessage, channel, Intrinsic::Destroy]);
        let stubs = expose(&mut members, &methods, &peer, worker_type.is_module());

        let handle = ContextHandle::from_parts(ContextParts {
            name: name.to_string(),
            worker_type,
            members,
            peer,
            host_scope,
            transport,
            listener,
            bridge: Arc::downgrade(&self.inner),
        });
        contexts.insert(name.to_string(), handle.clone());

        tracing::info!(
            context = name,
            shared = is_shared_worker,
            ?worker_type,
            stubs,
            "context created"
        );
        Ok(handle)
    }

    /// Install stubs for more callables on `name`. Existing members are kept.
    /// Returns the number of stubs installed; zero if `name` is absent.
    pub fn expose(&self, name: &str, options: ExposeOptions) -> usize {
        let Some(handle) = self.get(name) else {
            tracing::debug!(context = name, "expose on absent context");
            return 0;
        };
        let is_module = options.is_module.unwrap_or_else(|| handle.is_module());
        handle.expose(&options.methods, is_module)
    }

    /// Make host methods callable from inside `name`, through
    /// [`workbridge_core::Args::peer`]. Existing bindings are kept. Returns the
    /// number of entries bound; zero if `name` is absent.
    pub fn expose_host(&self, name: &str, methods: &Methods) -> usize {
        match self.get(name) {
            Some(handle) => handle.bind_host(methods),
            None => 0,
        }
    }

    pub fn get(&self, name: &str) -> Option<ContextHandle> {
        self.inner.contexts.lock().get(name).cloned()
    }

    /// The default context.
    pub fn worker(&self) -> Option<ContextHandle> {
        self.get(MAIN_CONTEXT)
    }

    /// Names of live contexts, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.contexts.lock().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Destroy the context `name`. No-op if absent.
    pub fn destroy_worker(&self, name: &str) {
        if let Some(handle) = self.get(name) {
            self.inner.destroy_context(&handle);
        }
    }

    /// Destroy every context.
    pub fn destroy(&self) {
        let drained: Vec<_> = self.inner.contexts.lock().drain().map(|(_, h)| h).collect();
        for handle in &drained {
            handle.shutdown();
        }
        tracing::debug!(count = drained.len(), "all contexts destroyed");
    }

    /// Calls issued by the host that have not settled yet.
    pub fn pending_calls(&self) -> usize {
        self.inner.correlation.pending_count()
    }

    pub fn on(&self, event: impl Into<String>, listener: Listener) {
        self.inner.events.on(event, listener);
    }

    /// Remove `listener` from `event`, or every listener when `None`.
    pub fn off(&self, event: &str, listener: Option<&Listener>) {
        self.inner.events.off(event, listener);
    }

    pub fn emit(&self, event: &str, data: &Value) {
        self.inner.events.emit(event, data);
    }
}
