//! Contexts backed by OS threads.
//!
//! Each context gets a named thread running a private current-thread tokio
//! runtime. The thread executes the bindings recorded in the bootstrap's
//! scope; the program text itself travels along as the context's resource.

use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use workbridge_core::{
    Bootstrap, Correlation, Endpoint, Error, MAIN_CONTEXT, Peer, Result, ScriptScope,
};

use super::channel::{DedicatedWorker, MessagePort, PortSender, SharedWorker};
use super::Platform;
use crate::config::BridgeConfig;
use crate::pump::listen;

/// In-process platform: one thread per context.
#[derive(Debug, Clone)]
pub struct ThreadPlatform {
    thread_name_prefix: String,
    stack_size: Option<usize>,
    call_id_prefix: String,
}

impl Default for ThreadPlatform {
    fn default() -> Self {
        Self::new(&BridgeConfig::default())
    }
}

impl ThreadPlatform {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            thread_name_prefix: config.thread_name_prefix.clone(),
            stack_size: config.worker_stack_size,
            call_id_prefix: config.call_id_prefix.clone(),
        }
    }

    /// Run `task` to completion on a fresh thread.
    fn spawn<F>(&self, name: &str, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Built here so a failure reaches the caller.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Platform(format!("failed to build runtime for `{name}`: {e}")))?;

        let mut builder =
            std::thread::Builder::new().name(format!("{}-{}", self.thread_name_prefix, name));
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }

        builder
            .spawn(move || runtime.block_on(task))
            .map_err(|e| Error::Platform(format!("failed to spawn thread for `{name}`: {e}")))?;
        Ok(())
    }
}

/// Router for the context side of one port.
fn context_endpoint(
    name: &str,
    sender: PortSender,
    correlation: Arc<Correlation>,
    scope: Arc<RwLock<ScriptScope>>,
) -> Endpoint {
    let worker_name = (name != MAIN_CONTEXT).then(|| name.to_string());
    Endpoint::new(Peer::new(Arc::new(sender), correlation, worker_name), scope)
}

impl Platform for ThreadPlatform {
    fn create_worker(&self, name: &str, bootstrap: Bootstrap) -> Result<DedicatedWorker> {
        tracing::trace!(context = name, resource = bootstrap.resource().url().len(), "loading program");

        let (host, mut port) = MessagePort::pair();
        let inbox = port.start()?;
        let endpoint = context_endpoint(
            name,
            port.sender(),
            Arc::new(Correlation::with_prefix(self.call_id_prefix.clone())),
            Arc::new(RwLock::new(bootstrap.into_scope())),
        );

        let context = name.to_string();
        self.spawn(name, async move {
            tracing::debug!(context = %context, "dedicated context running");
            listen(endpoint, inbox).await;
            drop(port);
            tracing::debug!(context = %context, "dedicated context stopped");
        })?;

        Ok(DedicatedWorker::new(host))
    }

    fn create_shared_worker(&self, name: &str, bootstrap: Bootstrap) -> Result<SharedWorker> {
        tracing::trace!(context = name, resource = bootstrap.resource().url().len(), "loading program");

        let (connector, mut incoming) = mpsc::unbounded_channel::<MessagePort>();
        let (host, first) = MessagePort::pair();
        connector
            .send(first)
            .map_err(|_| Error::Platform("shared context connector closed".to_string()))?;

        let scope = Arc::new(RwLock::new(bootstrap.into_scope()));
        let correlation = Arc::new(Correlation::with_prefix(self.call_id_prefix.clone()));
        let context = name.to_string();

        self.spawn(name, async move {
            tracing::debug!(context = %context, "shared context running");
            let mut ports = JoinSet::new();

            loop {
                tokio::select! {
                    port = incoming.recv() => {
                        let Some(mut port) = port else { break };
                        let inbox = match port.start() {
                            Ok(inbox) => inbox,
                            Err(e) => {
                                tracing::warn!(context = %context, error = %e, "rejected port");
                                continue;
                            }
                        };
                        let endpoint =
                            context_endpoint(&context, port.sender(), correlation.clone(), scope.clone());
                        ports.spawn(async move {
                            listen(endpoint, inbox).await;
                            drop(port);
                        });
                        tracing::debug!(context = %context, ports = ports.len(), "port connected");
                    }
                    Some(_) = ports.join_next() => {}
                }
            }

            // No new connections; serve the ones still open.
            while ports.join_next().await.is_some() {}
            tracing::debug!(context = %context, "shared context stopped");
        })?;

        Ok(SharedWorker::new(host, connector))
    }
}
