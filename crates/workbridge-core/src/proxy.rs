//! # Call stubs and capability tables
//!
//! A [`Peer`] is one side's view of the other end of a channel: it posts call
//! messages and registers their pending entries. A [`Stub`] binds a peer to a
//! method name. Stubs live in a [`CapabilityTable`], the explicit per-context
//! member table that [`expose`] fills.
//!
//! ## Invariants
//!
//! - `expose` never replaces an existing member, intrinsic or stub.
//! - A call's pending entry exists before its message is posted, and is
//!   dropped again if posting fails.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::correlation::{Correlation, PendingCall};
use crate::error::Error;
use crate::method::Methods;
use crate::protocol::{Message, Outbox};

/// Sending side of a channel plus the registry its calls settle in.
#[derive(Clone)]
pub struct Peer {
    outbox: Arc<dyn Outbox>,
    correlation: Arc<Correlation>,
    worker_name: Option<String>,
}

impl Peer {
    /// `worker_name` is stamped on every call; `None` for the default context.
    pub fn new(
        outbox: Arc<dyn Outbox>,
        correlation: Arc<Correlation>,
        worker_name: Option<String>,
    ) -> Self {
        Self {
            outbox,
            correlation,
            worker_name,
        }
    }

    pub fn worker_name(&self) -> Option<&str> {
        self.worker_name.as_deref()
    }

    pub fn correlation(&self) -> &Arc<Correlation> {
        &self.correlation
    }

    pub fn outbox(&self) -> &Arc<dyn Outbox> {
        &self.outbox
    }

    /// Call a classic-mode binding on the other side.
    pub fn call(&self, method: &str, args: Vec<Value>) -> PendingCall {
        self.call_with(method, args, false)
    }

    /// Register a pending entry, post the call and return its future.
    ///
    /// The message is posted before this returns; only the reply is awaited.
    pub fn call_with(&self, method: &str, args: Vec<Value>, is_module: bool) -> PendingCall {
        let id = self.correlation.next_id();
        let pending = match self.correlation.register(id.clone()) {
            Ok(pending) => pending,
            Err(e) => return PendingCall::failed(id, e),
        };

        let message = Message::call(
            id.clone(),
            method,
            args,
            self.worker_name.clone(),
            is_module,
        );
        if let Err(e) = self.outbox.post(&message) {
            self.correlation.forget(&id);
            return PendingCall::failed(id, e);
        }

        tracing::trace!(call_id = %id, method, worker = ?self.worker_name, "call posted");
        pending
    }
}

/// An installed RPC stub.
#[derive(Clone)]
pub struct Stub {
    method: String,
    is_module: bool,
    peer: Peer,
}

impl Stub {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn is_module(&self) -> bool {
        self.is_module
    }

    /// Perform a correlated round trip.
    pub fn call(&self, args: Vec<Value>) -> PendingCall {
        self.peer.call_with(&self.method, args, self.is_module)
    }
}

/// Members a live context handle carries before any stub is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    /// Raw message posting.
    PostMessage,
    /// Termination of a dedicated context.
    Terminate,
    /// The port of a shared context.
    Port,
    /// Teardown through the registry.
    Destroy,
}

impl Intrinsic {
    pub fn name(self) -> &'static str {
        match self {
            Self::PostMessage => "postMessage",
            Self::Terminate => "terminate",
            Self::Port => "port",
            Self::Destroy => "destroy",
        }
    }
}

/// One entry of a capability table.
#[derive(Clone)]
pub enum Member {
    Intrinsic(Intrinsic),
    Stub(Stub),
}

impl Member {
    pub fn as_stub(&self) -> Option<&Stub> {
        match self {
            Self::Stub(stub) => Some(stub),
            Self::Intrinsic(_) => None,
        }
    }
}

/// Name → member table standing in for a handle's dynamic properties.
#[derive(Clone, Default)]
pub struct CapabilityTable {
    members: FxHashMap<String, Member>,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table pre-populated with intrinsic members.
    pub fn with_intrinsics(intrinsics: &[Intrinsic]) -> Self {
        let members = intrinsics
            .iter()
            .map(|i| (i.name().to_string(), Member::Intrinsic(*i)))
            .collect();
        Self { members }
    }

    pub fn get(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    pub fn stub(&self, name: &str) -> Option<&Stub> {
        self.get(name).and_then(Member::as_stub)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// Names of installed stubs, sorted.
    pub fn stub_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self
            .members
            .iter()
            .filter(|(_, m)| m.as_stub().is_some())
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Invoke the stub called `name`.
    ///
    /// Without such a stub nothing is sent; the returned call is already
    /// failed and carries `name` as its id.
    pub fn call(&self, name: &str, args: Vec<Value>) -> PendingCall {
        match self.stub(name) {
            Some(stub) => stub.call(args),
            None => PendingCall::failed(name, Error::StubNotFound(name.to_string())),
        }
    }
}

/// Install a stub for every callable in `methods` whose name is not already
/// a member of `table`. Returns the number of stubs installed.
pub fn expose(table: &mut CapabilityTable, methods: &Methods, peer: &Peer, is_module: bool) -> usize {
    let mut installed = 0;

    for (name, _) in methods.callables() {
        if table.contains(name) {
            tracing::debug!(method = name, "member already present; stub not installed");
            continue;
        }

        table.members.insert(
            name.to_string(),
            Member::Stub(Stub {
                method: name.to_string(),
                is_module,
                peer: peer.clone(),
            }),
        );
        installed += 1;
    }

    installed
}
