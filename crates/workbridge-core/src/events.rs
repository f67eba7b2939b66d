//! Broadcast of call results to passive listeners.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;

/// A listener callback. Identity (for [`EventBus::off`]) is the `Arc` pointer.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Wrap a closure as a [`Listener`].
pub fn listener(f: impl Fn(&Value) + Send + Sync + 'static) -> Listener {
    Arc::new(f)
}

/// Event key for a method's results: the bare method for the default
/// context, `"<context>/<method>"` otherwise.
pub fn event_key(worker_name: Option<&str>, method: &str) -> String {
    match worker_name {
        Some(name) => format!("{name}/{method}"),
        None => method.to_string(),
    }
}

/// Listener table keyed by event name.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<FxHashMap<String, Vec<Listener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener. Registering the same listener twice makes it fire twice.
    pub fn on(&self, event: impl Into<String>, listener: Listener) {
        self.listeners
            .lock()
            .entry(event.into())
            .or_default()
            .push(listener);
    }

    /// Remove one listener, or every listener for `event` when `listener` is `None`.
    pub fn off(&self, event: &str, listener: Option<&Listener>) {
        let mut listeners = self.listeners.lock();
        let Some(list) = listeners.get_mut(event) else {
            return;
        };

        match listener {
            Some(target) => {
                list.retain(|existing| !Arc::ptr_eq(existing, target));
                if list.is_empty() {
                    listeners.remove(event);
                }
            }
            None => {
                listeners.remove(event);
            }
        }
    }

    /// Invoke every listener for `event` in registration order.
    ///
    /// A panicking listener is reported and skipped; the rest still run.
    pub fn emit(&self, event: &str, data: &Value) {
        // Snapshot so listeners may call on/off while being invoked.
        let snapshot = match self.listeners.lock().get(event) {
            Some(list) => list.clone(),
            None => return,
        };

        for listener in snapshot {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(data))) {
                tracing::error!(
                    event,
                    reason = %panic_message(panic.as_ref()),
                    "event listener failed"
                );
            }
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.lock().get(event).map_or(0, Vec::len)
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
