//! The execution-context primitive the bridge drives.
//!
//! A [`Platform`] turns an assembled [`Bootstrap`] into a running context and
//! hands back the host's end of its channel. [`ThreadPlatform`] is the
//! in-process implementation.

mod channel;
mod thread;

use workbridge_core::{Bootstrap, Result};

pub use channel::{DedicatedWorker, MessagePort, PortReceiver, PortSender, SharedWorker};
pub use thread::ThreadPlatform;

/// Creates isolated contexts.
pub trait Platform: Send + Sync + 'static {
    /// Start a context reachable through a single direct channel.
    fn create_worker(&self, name: &str, bootstrap: Bootstrap) -> Result<DedicatedWorker>;

    /// Start a context that accepts any number of port connections.
    fn create_shared_worker(&self, name: &str, bootstrap: Bootstrap) -> Result<SharedWorker>;
}

/// The host's end of either transport shape.
pub enum Transport {
    Dedicated(DedicatedWorker),
    Shared(SharedWorker),
}

impl Transport {
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }

    pub fn port_mut(&mut self) -> &mut MessagePort {
        match self {
            Self::Dedicated(worker) => worker.port_mut(),
            Self::Shared(worker) => worker.port_mut(),
        }
    }

    /// Release the context: terminate a dedicated one, disconnect from a
    /// shared one.
    pub fn close(&self) {
        match self {
            Self::Dedicated(worker) => worker.terminate(),
            Self::Shared(worker) => worker.close(),
        }
    }
}
