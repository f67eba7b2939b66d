//! Shared helpers for workbridge integration tests.

#![allow(dead_code)]

use std::time::Duration;

use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;
use workbridge::{Callable, Error, Methods, PendingCall, Result};

/// Route bridge logs to the test harness. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Await a call, failing the test if it never settles.
pub async fn settle(call: PendingCall) -> Result<Value> {
    tokio::time::timeout(Duration::from_secs(5), call)
        .await
        .expect("call did not settle")
}

/// A small calculator with one of each handler flavor.
pub fn calc_methods() -> Methods {
    Methods::new()
        .with_callable(
            "add",
            Callable::new("add(a, b) { return a + b; }", |args| {
                Ok(json!(args.arg::<i64>(0)? + args.arg::<i64>(1)?))
            }),
        )
        .with_callable(
            "delayed",
            Callable::deferred(
                "async delayed(value, ms) { await sleep(ms); return value; }",
                |args| async move {
                    let ms = args.arg::<u64>(1)?;
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok::<_, Error>(args.get(0).cloned().unwrap_or(Value::Null))
                },
            ),
        )
        .with_callable(
            "fail",
            Callable::new("function fail() { throw new Error('boom'); }", |_| {
                Err(Error::thrown("Error: boom"))
            }),
        )
        .with_callable(
            "explode",
            Callable::new("() => null.x", |_| panic!("null has no properties")),
        )
        .with_plain("version", json!("1.0"))
}
