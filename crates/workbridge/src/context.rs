//! Live handles to created contexts.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::task::JoinHandle;
use workbridge_core::{
    CapabilityTable, Error, Member, Methods, PendingCall, Peer, Result, ScriptScope, WorkerType,
    expose,
};

use crate::bridge::BridgeInner;
use crate::platform::{MessagePort, Transport};

/// A created context, as seen from the host.
///
/// Cloning yields another handle to the same context. Handles compare equal
/// only when they refer to the same creation.
#[derive(Clone)]
pub struct ContextHandle {
    inner: Arc<ContextInner>,
}

pub(crate) struct ContextInner {
    name: String,
    worker_type: WorkerType,
    is_shared: bool,
    members: RwLock<CapabilityTable>,
    peer: Peer,
    host_scope: Arc<RwLock<ScriptScope>>,
    transport: Mutex<Option<Transport>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    bridge: Weak<BridgeInner>,
}

pub(crate) struct ContextParts {
    pub name: String,
    pub worker_type: WorkerType,
    pub members: CapabilityTable,
    pub peer: Peer,
    pub host_scope: Arc<RwLock<ScriptScope>>,
    pub transport: Transport,
    pub listener: JoinHandle<()>,
    pub bridge: Weak<BridgeInner>,
}

impl ContextHandle {
    pub(crate) fn from_parts(parts: ContextParts) -> Self {
        let is_shared = parts.transport.is_shared();
        Self {
            inner: Arc::new(ContextInner {
                name: parts.name,
                worker_type: parts.worker_type,
                is_shared,
                members: RwLock::new(parts.members),
                peer: parts.peer,
                host_scope: parts.host_scope,
                transport: Mutex::new(Some(parts.transport)),
                listener: Mutex::new(Some(parts.listener)),
                bridge: parts.bridge,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn worker_type(&self) -> WorkerType {
        self.inner.worker_type
    }

    pub fn is_module(&self) -> bool {
        self.inner.worker_type.is_module()
    }

    pub fn is_shared(&self) -> bool {
        self.inner.is_shared
    }

    /// Whether the context is still reachable through this handle.
    pub fn is_alive(&self) -> bool {
        self.inner
            .transport
            .lock()
            .as_mut()
            .is_some_and(|transport| !transport.port_mut().is_closed())
    }

    /// Call the stub installed for `method`.
    pub fn call(&self, method: &str, args: Vec<Value>) -> PendingCall {
        self.inner.members.read().call(method, args)
    }

    /// Look up a member of the capability table.
    pub fn member(&self, name: &str) -> Option<Member> {
        self.inner.members.read().get(name).cloned()
    }

    /// Names of installed stubs, sorted.
    pub fn stub_names(&self) -> Vec<String> {
        self.inner
            .members
            .read()
            .stub_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Send data outside the RPC protocol.
    pub fn post_message(&self, data: Value) -> Result<()> {
        self.inner.peer.outbox().post_raw(data)
    }

    /// Open another port to a shared context.
    pub fn connect(&self) -> Result<MessagePort> {
        match self.inner.transport.lock().as_ref() {
            Some(Transport::Shared(worker)) => worker.connect(),
            Some(Transport::Dedicated(_)) => Err(Error::Platform(format!(
                "context `{}` is not shared",
                self.inner.name
            ))),
            None => Err(Error::ContextClosed(self.inner.name.clone())),
        }
    }

    /// Stop a dedicated context without removing it from its bridge.
    pub fn terminate(&self) -> Result<()> {
        match self.inner.transport.lock().as_ref() {
            Some(Transport::Dedicated(worker)) => {
                worker.terminate();
                Ok(())
            }
            Some(Transport::Shared(_)) => Err(Error::Platform(format!(
                "shared context `{}` cannot be terminated",
                self.inner.name
            ))),
            None => Ok(()),
        }
    }

    /// Remove this context from its bridge and shut it down.
    pub fn destroy(&self) {
        match self.inner.bridge.upgrade() {
            Some(bridge) => bridge.destroy_context(self),
            None => self.shutdown(),
        }
    }

    pub(crate) fn expose(&self, methods: &Methods, is_module: bool) -> usize {
        expose(&mut self.inner.members.write(), methods, &self.inner.peer, is_module)
    }

    /// Bind host methods this context may call back into.
    pub(crate) fn bind_host(&self, methods: &Methods) -> usize {
        let mut scope = self.inner.host_scope.write();
        let mut bound = 0;
        for (name, method) in methods.iter() {
            if scope.bind(name, method.clone(), false) {
                bound += 1;
            }
        }
        bound
    }

    /// Detach the router and release the transport. Idempotent.
    pub(crate) fn shutdown(&self) {
        self.inner.shutdown();
        tracing::debug!(context = %self.inner.name, "context shut down");
    }
}

impl ContextInner {
    fn shutdown(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        if let Some(transport) = self.transport.lock().take() {
            transport.close();
        }
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl PartialEq for ContextHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ContextHandle {}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle")
            .field("name", &self.inner.name)
            .field("worker_type", &self.inner.worker_type)
            .field("is_shared", &self.inner.is_shared)
            .finish()
    }
}
