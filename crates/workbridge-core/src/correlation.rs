//! Correlation of outbound calls with their eventual responses.
//!
//! Every call gets an id from a counter owned by one registry. The pending
//! entry for that id is removed before it is settled, so a second response
//! for the same id finds nothing and is reported as a protocol error.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Default prefix for generated call ids.
pub const DEFAULT_CALL_ID_PREFIX: &str = "rpc";

/// Pending calls keyed by id.
pub struct Correlation {
    prefix: String,
    counter: AtomicU64,
    pending: Mutex<FxHashMap<String, oneshot::Sender<Result<Value>>>>,
}

impl Correlation {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_CALL_ID_PREFIX)
    }

    /// Create a registry whose ids read `<prefix><n>`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
            pending: Mutex::new(FxHashMap::default()),
        }
    }

    /// Generate the next call id. The first id ends in `1`.
    pub fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}{}", self.prefix, n)
    }

    /// Store a pending entry for `id` and return the future it settles.
    pub fn register(&self, id: impl Into<String>) -> Result<PendingCall> {
        let id = id.into();
        let (tx, rx) = oneshot::channel();

        let mut pending = self.pending.lock();
        if pending.contains_key(&id) {
            return Err(Error::Protocol {
                id,
                message: "call id registered twice".to_string(),
            });
        }
        pending.insert(id.clone(), tx);

        Ok(PendingCall {
            id,
            state: State::Waiting(rx),
        })
    }

    /// Settle the pending entry for `id`.
    ///
    /// Fails with [`Error::Protocol`] if no entry exists; that is an invariant
    /// violation rather than a per-call failure.
    pub fn settle(&self, id: &str, outcome: Result<Value>) -> Result<()> {
        let sender = self.pending.lock().remove(id).ok_or_else(|| Error::Protocol {
            id: id.to_string(),
            message: "no pending call for response".to_string(),
        })?;

        if sender.send(outcome).is_err() {
            tracing::debug!(call_id = id, "caller dropped its future before settlement");
        }
        Ok(())
    }

    /// Whether `id` still has a pending entry.
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.lock().contains_key(id)
    }

    /// Drop the entry for a call whose message never left.
    pub(crate) fn forget(&self, id: &str) {
        self.pending.lock().remove(id);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Default for Correlation {
    fn default() -> Self {
        Self::new()
    }
}

enum State {
    Waiting(oneshot::Receiver<Result<Value>>),
    Failed(Option<Error>),
}

/// Future for one outstanding call.
///
/// Resolves with the response's `result`, or fails with the response's
/// `error`. A call whose response never arrives stays pending.
pub struct PendingCall {
    id: String,
    state: State,
}

impl PendingCall {
    /// A call that failed before its message was sent.
    pub(crate) fn failed(id: impl Into<String>, error: Error) -> Self {
        Self {
            id: id.into(),
            state: State::Failed(Some(error)),
        }
    }

    /// The call id this future is waiting on.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Future for PendingCall {
    type Output = Result<Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            State::Waiting(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
                Poll::Ready(Err(_)) => Poll::Ready(Err(Error::ContextClosed(format!(
                    "call {} abandoned by its registry",
                    this.id
                )))),
                Poll::Pending => Poll::Pending,
            },
            State::Failed(error) => Poll::Ready(Err(error.take().unwrap_or_else(|| {
                Error::ContextClosed(format!("call {} polled after completion", this.id))
            }))),
        }
    }
}
