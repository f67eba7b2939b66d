//! Call functions inside isolated worker contexts as local async calls.
//!
//! A [`Bridge`] serializes a set of methods into a bootstrap program, starts
//! a context for it through a [`Platform`], and installs a stub per callable
//! on the returned [`ContextHandle`]. Calling a stub posts a correlated call
//! message and yields a future that settles with the context's response.
//!
//! ```no_run
//! use serde_json::json;
//! use workbridge::{Bridge, Callable, Methods, WorkerOptions};
//!
//! # async fn run() -> workbridge::Result<()> {
//! let bridge = Bridge::new();
//! let methods = Methods::new().with_callable(
//!     "add",
//!     Callable::new("add(a, b) { return a + b; }", |args| {
//!         Ok(json!(args.arg::<i64>(0)? + args.arg::<i64>(1)?))
//!     }),
//! );
//! let calc = bridge.create_worker("calc", WorkerOptions::new(methods))?;
//! assert_eq!(calc.call("add", vec![json!(2), json!(3)]).await?, json!(5));
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod context;
pub mod platform;
mod pump;

pub use bridge::{Bridge, ExposeOptions, WorkerOptions};
pub use config::BridgeConfig;
pub use context::ContextHandle;
pub use platform::{DedicatedWorker, MessagePort, Platform, SharedWorker, ThreadPlatform, Transport};
pub use workbridge_core::{
    Args, Callable, Error, Imports, Intrinsic, Listener, Member, Message, Method, Methods,
    NO_SUCH_METHOD, PendingCall, Peer, Result, WorkerType, event_key, listener,
};
