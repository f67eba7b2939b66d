//! The receive loop that feeds a port into a router.

use tokio::task::JoinSet;
use workbridge_core::router::{Dispatch, Endpoint};

use crate::platform::PortReceiver;

/// Route every message from `inbox` until the other end closes.
///
/// Messages are dispatched one at a time in arrival order; the calls they
/// start run concurrently. Dropping the returned future aborts those calls.
pub async fn listen(endpoint: Endpoint, mut inbox: PortReceiver) {
    let mut running = JoinSet::new();

    loop {
        tokio::select! {
            data = inbox.recv() => {
                let Some(data) = data else { break };
                match endpoint.dispatch(data) {
                    Ok(Dispatch::Execute(call)) => {
                        running.spawn(call);
                    }
                    Ok(Dispatch::Settled { id }) => {
                        tracing::trace!(call_id = %id, "call settled");
                    }
                    Ok(Dispatch::Ignored) => {}
                    Err(e) => {
                        tracing::error!(
                            context = ?endpoint.peer().worker_name(),
                            error = %e,
                            "router fault"
                        );
                    }
                }
            }
            Some(_) = running.join_next() => {}
        }
    }

    tracing::debug!(context = ?endpoint.peer().worker_name(), "channel closed");
}
