//! # Message Router
//!
//! The single dispatch entrypoint installed on every side of a channel.
//!
//! Inbound data that is not a bridge message is ignored. A bridge message
//! carrying an argument list is a call and is executed against the local
//! scope; anything else is a response and settles a pending call. Execution
//! is handed back to the caller as a future so the transport loop can keep
//! taking messages in arrival order while slow calls run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;

use crate::correlation::Correlation;
use crate::error::{Error, Result};
use crate::events::{EventBus, event_key, panic_message};
use crate::method::{Args, Callable, Handler};
use crate::protocol::{Message, NO_SUCH_METHOD, Outbox, Payload};
use crate::proxy::Peer;
use crate::scope::ScriptScope;

/// Outcome of routing one inbound message.
pub enum Dispatch {
    /// Not bridge traffic.
    Ignored,
    /// A pending call was settled.
    Settled { id: String },
    /// A call to run; the future posts its own response.
    Execute(BoxFuture<'static, ()>),
}

/// One side's router: its bindings, its pending calls and its channel.
pub struct Endpoint {
    peer: Peer,
    scope: Arc<RwLock<ScriptScope>>,
    events: Option<Arc<EventBus>>,
}

impl Endpoint {
    /// Route for the side that sends through `peer` and executes from `scope`.
    pub fn new(peer: Peer, scope: Arc<RwLock<ScriptScope>>) -> Self {
        Self {
            peer,
            scope,
            events: None,
        }
    }

    /// Broadcast response results on `events` before settling.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    fn correlation(&self) -> &Arc<Correlation> {
        self.peer.correlation()
    }

    /// Route one inbound message.
    ///
    /// Returns [`Error::Protocol`] for a response whose id has no pending
    /// entry; that is never converted into a rejected call.
    pub fn dispatch(&self, raw: Value) -> Result<Dispatch> {
        let Some(message) = Message::parse(raw) else {
            tracing::trace!("ignoring non-bridge message");
            return Ok(Dispatch::Ignored);
        };

        if message.is_call() {
            Ok(Dispatch::Execute(self.execute(message.payload)))
        } else {
            self.settle(message.payload)
        }
    }

    fn settle(&self, payload: Payload) -> Result<Dispatch> {
        let Payload {
            id,
            method,
            result,
            error,
            worker_name,
            ..
        } = payload;
        let id = id.unwrap_or_default();

        if !self.correlation().is_pending(&id) {
            return Err(Error::Protocol {
                id,
                message: "response for unknown call".to_string(),
            });
        }

        let result = result.unwrap_or(Value::Null);
        if let (Some(events), Some(method)) = (&self.events, method.as_deref()) {
            events.emit(&event_key(worker_name.as_deref(), method), &result);
        }

        let outcome = match error {
            Some(message) => Err(Error::from_response(method, message)),
            None => Ok(result),
        };
        self.correlation().settle(&id, outcome)?;

        Ok(Dispatch::Settled { id })
    }

    fn execute(&self, payload: Payload) -> BoxFuture<'static, ()> {
        let Payload {
            id,
            method,
            args,
            worker_name,
            is_module,
            ..
        } = payload;
        let id = id.unwrap_or_default();

        // Resolve now so calls bind in arrival order.
        let callable = method
            .as_deref()
            .and_then(|name| self.scope.read().resolve(name, is_module.unwrap_or(false)).cloned());
        let args = Args::with_peer(args.unwrap_or_default(), self.peer.clone());
        let outbox = self.peer.outbox().clone();

        async move {
            let reply = match callable {
                Some(callable) => match invoke(&callable, args).await {
                    Ok(result) => Message::result(id, method, result, worker_name),
                    Err(description) => Message::error(id, method, description, worker_name),
                },
                None => {
                    tracing::debug!(call_id = %id, method = ?method, "no such method");
                    Message::error(id, method, NO_SUCH_METHOD, worker_name)
                }
            };
            post_reply(outbox.as_ref(), &reply);
        }
        .boxed()
    }
}

fn post_reply(outbox: &dyn Outbox, reply: &Message) {
    if let Err(e) = outbox.post(reply) {
        tracing::warn!(call_id = reply.id(), error = %e, "response dropped");
    }
}

/// Run a callable, awaiting a deferred result. Failures and panics become
/// their textual description.
pub async fn invoke(callable: &Callable, args: Args) -> std::result::Result<Value, String> {
    match callable.handler() {
        Handler::Immediate(f) => match catch_unwind(AssertUnwindSafe(|| (**f)(args))) {
            Ok(outcome) => outcome.map_err(|e| e.to_string()),
            Err(panic) => Err(panic_message(panic.as_ref())),
        },
        Handler::Deferred(f) => {
            let future = catch_unwind(AssertUnwindSafe(|| (**f)(args)))
                .map_err(|panic| panic_message(panic.as_ref()))?;
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(outcome) => outcome.map_err(|e| e.to_string()),
                Err(panic) => Err(panic_message(panic.as_ref())),
            }
        }
    }
}
