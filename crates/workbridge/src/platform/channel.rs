//! Message ports and the two context transport shapes.
//!
//! A [`MessagePort`] is one end of an entangled pair. Data posted on one end
//! is queued on the other until that end is started. Closing (or dropping) a
//! port tells the other end that no more data will come.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::mpsc;
use workbridge_core::{Error, Message, Outbox, Result};

enum Envelope {
    Data(Value),
    Close,
}

/// Cloneable sending half of a port.
#[derive(Clone)]
pub struct PortSender {
    tx: mpsc::UnboundedSender<Envelope>,
    closed: Arc<AtomicBool>,
}

impl Outbox for PortSender {
    fn post(&self, message: &Message) -> Result<()> {
        self.post_raw(message.to_value()?)
    }

    fn post_raw(&self, data: Value) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ContextClosed("port is closed".to_string()));
        }
        self.tx
            .send(Envelope::Data(data))
            .map_err(|_| Error::ContextClosed("other end of the port is gone".to_string()))
    }
}

/// Receiving half of a started port.
pub struct PortReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl PortReceiver {
    /// Next message, or `None` once the other end closed.
    pub async fn recv(&mut self) -> Option<Value> {
        match self.rx.recv().await? {
            Envelope::Data(data) => Some(data),
            Envelope::Close => {
                self.rx.close();
                None
            }
        }
    }
}

/// One end of a message channel.
pub struct MessagePort {
    sender: PortSender,
    inbox: Option<mpsc::UnboundedReceiver<Envelope>>,
}

impl MessagePort {
    /// Create two entangled ports.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let a = Self {
            sender: PortSender {
                tx: b_tx,
                closed: closed.clone(),
            },
            inbox: Some(a_rx),
        };
        let b = Self {
            sender: PortSender { tx: a_tx, closed },
            inbox: Some(b_rx),
        };
        (a, b)
    }

    /// A handle for posting to the other end.
    pub fn sender(&self) -> PortSender {
        self.sender.clone()
    }

    pub fn post_message(&self, data: Value) -> Result<()> {
        self.sender.post_raw(data)
    }

    /// Begin delivery. Messages queued before this call are delivered first.
    pub fn start(&mut self) -> Result<PortReceiver> {
        self.inbox
            .take()
            .map(|rx| PortReceiver { rx })
            .ok_or_else(|| Error::Platform("port already started".to_string()))
    }

    /// Disentangle the pair. Later posts from either end fail.
    pub fn close(&self) {
        if !self.sender.closed.swap(true, Ordering::AcqRel) {
            let _ = self.sender.tx.send(Envelope::Close);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.closed.load(Ordering::Acquire)
    }
}

impl Drop for MessagePort {
    fn drop(&mut self) {
        self.close();
    }
}

/// Host side of a dedicated context: its port, and termination.
pub struct DedicatedWorker {
    port: MessagePort,
}

impl DedicatedWorker {
    /// Wrap the host end of a port whose other end a context listens on.
    pub fn new(port: MessagePort) -> Self {
        Self { port }
    }

    pub fn port_mut(&mut self) -> &mut MessagePort {
        &mut self.port
    }

    pub fn post_message(&self, data: Value) -> Result<()> {
        self.port.post_message(data)
    }

    /// Stop the context. Calls in flight inside it are abandoned.
    pub fn terminate(&self) {
        self.port.close();
    }

    pub fn is_terminated(&self) -> bool {
        self.port.is_closed()
    }
}

/// Host side of a shared context: the host's port, plus the means to open
/// more ports to the same context.
pub struct SharedWorker {
    port: MessagePort,
    connector: mpsc::UnboundedSender<MessagePort>,
}

impl SharedWorker {
    /// `connector` hands new ports to the context.
    pub fn new(port: MessagePort, connector: mpsc::UnboundedSender<MessagePort>) -> Self {
        Self { port, connector }
    }

    pub fn port(&self) -> &MessagePort {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut MessagePort {
        &mut self.port
    }

    /// Open another connection to the context.
    pub fn connect(&self) -> Result<MessagePort> {
        let (local, remote) = MessagePort::pair();
        self.connector
            .send(remote)
            .map_err(|_| Error::ContextClosed("shared context stopped accepting ports".to_string()))?;
        Ok(local)
    }

    /// Close the host's own port. The context lives on while other ports are
    /// open.
    pub fn close(&self) {
        self.port.close();
    }
}
