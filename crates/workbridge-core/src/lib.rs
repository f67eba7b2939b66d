//! Core of the workbridge RPC bridge.
//!
//! This crate provides:
//! - Method mappings pairing source text with native handlers
//! - Bootstrap program generation (imports, method serialization, handler)
//! - The `global` wire protocol
//! - Call correlation and RPC stubs
//! - The message router used on both sides of a channel
//! - Method-completion events

pub mod codegen;
pub mod correlation;
pub mod error;
pub mod events;
pub mod method;
pub mod protocol;
pub mod proxy;
pub mod router;
pub mod scope;

pub use codegen::{Bootstrap, Entrypoint, Imports, Resource, WorkerType};
pub use correlation::{Correlation, DEFAULT_CALL_ID_PREFIX, PendingCall};
pub use error::{Error, Result};
pub use events::{EventBus, Listener, event_key, listener};
pub use method::{Args, Callable, Method, Methods};
pub use protocol::{MAIN_CONTEXT, Message, NO_SUCH_METHOD, Outbox, Payload};
pub use proxy::{CapabilityTable, Intrinsic, Member, Peer, Stub, expose};
pub use router::{Dispatch, Endpoint};
pub use scope::ScriptScope;
