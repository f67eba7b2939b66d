//! Integration tests for the bridge running contexts on the thread platform.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{calc_methods, init_tracing, settle};
use parking_lot::Mutex;
use serde_json::{Value, json};
use workbridge::{
    Bridge, Callable, Error, ExposeOptions, Intrinsic, Member, Message, Methods, WorkerOptions,
    WorkerType, listener,
};

// =============================================================================
// Round trips
// =============================================================================

#[tokio::test]
async fn test_round_trip() {
    init_tracing();
    let bridge = Bridge::new();
    let calc = bridge
        .create_worker("calc", WorkerOptions::new(calc_methods()))
        .unwrap();

    assert_eq!(calc.stub_names(), vec!["add", "delayed", "explode", "fail"]);
    assert_eq!(settle(calc.call("add", vec![json!(2), json!(3)])).await.unwrap(), json!(5));
    assert_eq!(
        settle(calc.call("delayed", vec![json!("later"), json!(5)])).await.unwrap(),
        json!("later")
    );
    assert_eq!(bridge.pending_calls(), 0);
}

#[tokio::test]
async fn test_thrown_failures_reject() {
    let bridge = Bridge::new();
    let calc = bridge
        .create_worker("calc", WorkerOptions::new(calc_methods()))
        .unwrap();

    let err = settle(calc.call("fail", vec![])).await.unwrap_err();
    assert!(matches!(err, Error::Remote { .. }));
    assert_eq!(err.to_string(), "Error: boom");

    let err = settle(calc.call("explode", vec![])).await.unwrap_err();
    assert_eq!(err.to_string(), "null has no properties");

    let err = settle(calc.call("add", vec![json!("two")])).await.unwrap_err();
    assert!(err.to_string().starts_with("invalid argument 0"));

    // The context keeps serving after failures.
    assert_eq!(settle(calc.call("add", vec![json!(1), json!(1)])).await.unwrap(), json!(2));
}

#[tokio::test]
async fn test_unknown_method_rejects() {
    let bridge = Bridge::new();
    let calc = bridge
        .create_worker("calc", WorkerOptions::new(calc_methods()))
        .unwrap();

    let extra = Methods::new().with_callable("missing", Callable::new("missing() {}", |_| Ok(Value::Null)));
    assert_eq!(bridge.expose("calc", ExposeOptions::new(extra)), 1);

    let err = settle(calc.call("missing", vec![])).await.unwrap_err();
    assert!(matches!(err, Error::NoSuchMethod { method: Some(ref m) } if m == "missing"));

    let err = settle(calc.call("nothing", vec![])).await.unwrap_err();
    assert!(matches!(err, Error::StubNotFound(_)));
}

#[tokio::test]
async fn test_out_of_order_completion() {
    let bridge = Bridge::new();
    let calc = bridge
        .create_worker("calc", WorkerOptions::new(calc_methods()))
        .unwrap();

    // Issued 1, 2, 3; completes 3, 1, 2.
    let first = calc.call("delayed", vec![json!("first"), json!(60)]);
    let second = calc.call("delayed", vec![json!("second"), json!(120)]);
    let third = calc.call("delayed", vec![json!("third"), json!(0)]);

    let (first, second, third) = tokio::join!(settle(first), settle(second), settle(third));
    assert_eq!(first.unwrap(), json!("first"));
    assert_eq!(second.unwrap(), json!("second"));
    assert_eq!(third.unwrap(), json!("third"));
}

#[tokio::test]
async fn test_module_mode() {
    let bridge = Bridge::new();
    let calc = bridge
        .create_worker(
            "calc",
            WorkerOptions::new(calc_methods())
                .worker_type(WorkerType::Module)
                .imports(vec!["./helpers.js", "lodash"]),
        )
        .unwrap();

    assert!(calc.is_module());
    assert_eq!(settle(calc.call("add", vec![json!(20), json!(22)])).await.unwrap(), json!(42));

    // A classic-mode stub looks in the globals, which a module program lacks.
    let classic = Methods::new().with_callable("add2", Callable::new("add2() {}", |_| Ok(Value::Null)));
    bridge.expose("calc", ExposeOptions::new(classic).module(false));
    let err = settle(calc.call("add2", vec![])).await.unwrap_err();
    assert!(matches!(err, Error::NoSuchMethod { .. }));
}

// =============================================================================
// Registry lifecycle
// =============================================================================

#[tokio::test]
async fn test_create_is_idempotent() {
    let bridge = Bridge::new();
    let first = bridge
        .create_worker("calc", WorkerOptions::new(calc_methods()))
        .unwrap();
    let other = Methods::new().with_callable("other", Callable::new("other() {}", |_| Ok(Value::Null)));
    let second = bridge
        .create_worker("calc", WorkerOptions::new(other).shared(true))
        .unwrap();

    assert_eq!(first, second);
    assert!(!second.is_shared());
    assert!(second.member("other").is_none());
    assert_eq!(bridge.names(), vec!["calc"]);
}

#[tokio::test]
async fn test_empty_methods_rejected_even_when_present() {
    let bridge = Bridge::new();
    bridge
        .create_worker("calc", WorkerOptions::new(calc_methods()))
        .unwrap();
    let err = bridge
        .create_worker("calc", WorkerOptions::new(Methods::new()))
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn test_destroy_clears_slot() {
    let bridge = Bridge::new();
    let old = bridge
        .create_worker("calc", WorkerOptions::new(calc_methods()))
        .unwrap();

    bridge.destroy_worker("calc");
    assert!(bridge.get("calc").is_none());
    assert!(!old.is_alive());
    let err = settle(old.call("add", vec![json!(1), json!(2)])).await.unwrap_err();
    assert!(matches!(err, Error::ContextClosed(_)));

    // Destroying again is a no-op.
    bridge.destroy_worker("calc");

    let fresh = bridge
        .create_worker("calc", WorkerOptions::new(calc_methods()))
        .unwrap();
    assert_ne!(old, fresh);
    assert_eq!(settle(fresh.call("add", vec![json!(1), json!(2)])).await.unwrap(), json!(3));
}

#[tokio::test]
async fn test_handle_destroy_and_stale_handles() {
    let bridge = Bridge::new();
    let old = bridge
        .create_worker("calc", WorkerOptions::new(calc_methods()))
        .unwrap();
    old.destroy();
    assert!(bridge.get("calc").is_none());

    let fresh = bridge
        .create_worker("calc", WorkerOptions::new(calc_methods()))
        .unwrap();
    // A stale handle must not tear down its successor.
    old.destroy();
    assert_eq!(bridge.get("calc"), Some(fresh.clone()));
    assert!(fresh.is_alive());
}

#[tokio::test]
async fn test_destroy_all() {
    let bridge = Bridge::new();
    bridge.init(WorkerOptions::new(calc_methods())).unwrap();
    bridge
        .create_worker("a", WorkerOptions::new(calc_methods()))
        .unwrap();
    bridge
        .create_worker("b", WorkerOptions::new(calc_methods()).shared(true))
        .unwrap();
    assert_eq!(bridge.names(), vec!["a", "b", "main"]);

    bridge.destroy();
    assert!(bridge.names().is_empty());
    assert!(bridge.worker().is_none());
}

#[tokio::test]
async fn test_init_creates_main_once() {
    let bridge = Bridge::new();
    let main = bridge.init(WorkerOptions::new(calc_methods())).unwrap();
    assert_eq!(main.name(), "main");
    assert_eq!(bridge.init(WorkerOptions::new(calc_methods())).unwrap(), main);
    assert_eq!(bridge.worker(), Some(main.clone()));
    assert_eq!(settle(main.call("add", vec![json!(4), json!(4)])).await.unwrap(), json!(8));
}

#[tokio::test]
async fn test_terminate() {
    let bridge = Bridge::new();
    let calc = bridge
        .create_worker("calc", WorkerOptions::new(calc_methods()))
        .unwrap();
    calc.terminate().unwrap();

    let err = settle(calc.call("add", vec![json!(1), json!(1)])).await.unwrap_err();
    assert!(matches!(err, Error::ContextClosed(_)));
    // Terminating does not clear the registry slot.
    assert_eq!(bridge.get("calc"), Some(calc));
}

// =============================================================================
// Capability table
// =============================================================================

#[tokio::test]
async fn test_expose_never_overwrites() {
    let bridge = Bridge::new();
    let calc = bridge
        .create_worker("calc", WorkerOptions::new(calc_methods()))
        .unwrap();

    let clashing = Methods::new()
        .with_callable("destroy", Callable::new("destroy() {}", |_| Ok(Value::Null)))
        .with_callable("postMessage", Callable::new("postMessage() {}", |_| Ok(Value::Null)))
        .with_callable("add", Callable::new("add() { return 0; }", |_| Ok(json!(0))));
    assert_eq!(bridge.expose("calc", ExposeOptions::new(clashing)), 0);

    assert!(matches!(calc.member("destroy"), Some(Member::Intrinsic(Intrinsic::Destroy))));
    assert!(matches!(calc.member("postMessage"), Some(Member::Intrinsic(Intrinsic::PostMessage))));
    assert!(matches!(calc.member("terminate"), Some(Member::Intrinsic(Intrinsic::Terminate))));
    assert_eq!(settle(calc.call("add", vec![json!(1), json!(2)])).await.unwrap(), json!(3));
}

#[tokio::test]
async fn test_plain_values_get_no_stub() {
    let bridge = Bridge::new();
    let calc = bridge
        .create_worker("calc", WorkerOptions::new(calc_methods()))
        .unwrap();
    assert!(calc.member("version").is_none());
}

// =============================================================================
// Events
// =============================================================================

#[tokio::test]
async fn test_events_fire_before_settlement() {
    let bridge = Bridge::new();
    let calc = bridge
        .create_worker("calc", WorkerOptions::new(calc_methods()))
        .unwrap();
    let main = bridge.init(WorkerOptions::new(calc_methods())).unwrap();

    let named = Arc::new(Mutex::new(Vec::new()));
    let bare = Arc::new(AtomicUsize::new(0));
    {
        let named = named.clone();
        bridge.on("calc/add", listener(move |data| named.lock().push(data.clone())));
    }
    {
        let bare = bare.clone();
        bridge.on("add", listener(move |_| {
            bare.fetch_add(1, Ordering::SeqCst);
        }));
    }

    settle(calc.call("add", vec![json!(1), json!(2)])).await.unwrap();
    assert_eq!(*named.lock(), vec![json!(3)]);
    assert_eq!(bare.load(Ordering::SeqCst), 0);

    settle(main.call("add", vec![json!(1), json!(1)])).await.unwrap();
    assert_eq!(bare.load(Ordering::SeqCst), 1);
    assert_eq!(named.lock().len(), 1);

    // Rejections broadcast a null result.
    let seen = Arc::new(Mutex::new(None));
    {
        let seen = seen.clone();
        bridge.on("calc/fail", listener(move |data| *seen.lock() = Some(data.clone())));
    }
    settle(calc.call("fail", vec![])).await.unwrap_err();
    assert_eq!(*seen.lock(), Some(Value::Null));
}

#[tokio::test]
async fn test_listener_panic_does_not_affect_call() {
    let bridge = Bridge::new();
    let calc = bridge
        .create_worker("calc", WorkerOptions::new(calc_methods()))
        .unwrap();

    let after = Arc::new(AtomicUsize::new(0));
    bridge.on("calc/add", listener(|_| panic!("listener bug")));
    {
        let after = after.clone();
        bridge.on("calc/add", listener(move |_| {
            after.fetch_add(1, Ordering::SeqCst);
        }));
    }

    assert_eq!(settle(calc.call("add", vec![json!(1), json!(2)])).await.unwrap(), json!(3));
    assert_eq!(after.load(Ordering::SeqCst), 1);

    bridge.off("calc/add", None);
    settle(calc.call("add", vec![json!(1), json!(2)])).await.unwrap();
    assert_eq!(after.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_manual_emit() {
    let bridge = Bridge::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = {
        let hits = hits.clone();
        listener(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    };
    bridge.on("ready", counter.clone());
    bridge.on("ready", counter.clone());
    bridge.emit("ready", &json!(true));
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    bridge.off("ready", Some(&counter));
    bridge.emit("ready", &json!(true));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Transports
// =============================================================================

#[tokio::test]
async fn test_shared_worker_serves_many_ports() {
    let bridge = Bridge::new();
    let shared = bridge
        .create_worker("shared", WorkerOptions::new(calc_methods()).shared(true))
        .unwrap();
    assert!(shared.is_shared());
    assert!(matches!(shared.member("port"), Some(Member::Intrinsic(Intrinsic::Port))));
    assert!(matches!(shared.terminate(), Err(Error::Platform(_))));

    assert_eq!(settle(shared.call("add", vec![json!(2), json!(2)])).await.unwrap(), json!(4));

    // A second connection speaks the wire protocol directly.
    let mut port = shared.connect().unwrap();
    let mut inbox = port.start().unwrap();
    let call = Message::call("c1", "add", vec![json!(5), json!(6)], Some("shared".into()), false);
    port.post_message(call.to_value().unwrap()).unwrap();

    let reply = tokio::time::timeout(std::time::Duration::from_secs(5), inbox.recv())
        .await
        .unwrap()
        .unwrap();
    let reply = Message::parse(reply).unwrap();
    assert_eq!(reply.id(), "c1");
    assert_eq!(reply.payload.result, Some(json!(11)));
    assert_eq!(reply.payload.worker_name.as_deref(), Some("shared"));

    // Foreign callers may leave out the argument list.
    port.post_message(json!({"action": "global", "payload": {"id": "c3", "method": "fail"}}))
        .unwrap();
    let reply = tokio::time::timeout(std::time::Duration::from_secs(5), inbox.recv())
        .await
        .unwrap()
        .unwrap();
    let reply = Message::parse(reply).unwrap();
    assert_eq!(reply.id(), "c3");
    assert_eq!(reply.payload.error.as_deref(), Some("Error: boom"));

    // The extra port outlives the host's own connection.
    bridge.destroy_worker("shared");
    let call = Message::call("c2", "add", vec![json!(1), json!(1)], None, false);
    port.post_message(call.to_value().unwrap()).unwrap();
    let reply = tokio::time::timeout(std::time::Duration::from_secs(5), inbox.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(Message::parse(reply).unwrap().payload.result, Some(json!(2)));
}

#[tokio::test]
async fn test_dedicated_worker_cannot_connect() {
    let bridge = Bridge::new();
    let calc = bridge
        .create_worker("calc", WorkerOptions::new(calc_methods()))
        .unwrap();
    assert!(matches!(calc.connect(), Err(Error::Platform(_))));
}

#[tokio::test]
async fn test_raw_messages_are_ignored() {
    let bridge = Bridge::new();
    let calc = bridge
        .create_worker("calc", WorkerOptions::new(calc_methods()))
        .unwrap();

    calc.post_message(json!({"hello": "world"})).unwrap();
    calc.post_message(json!({"action": "global", "payload": {"id": null, "args": []}}))
        .unwrap();
    calc.post_message(json!("plain text")).unwrap();

    assert_eq!(settle(calc.call("add", vec![json!(1), json!(2)])).await.unwrap(), json!(3));
}

// =============================================================================
// Reverse calls
// =============================================================================

#[tokio::test]
async fn test_context_calls_back_into_host() {
    let bridge = Bridge::new();
    let methods = Methods::new().with_callable(
        "relay",
        Callable::deferred("async relay(x) { return await host.double(x); }", |args| async move {
            let peer = args
                .peer()
                .cloned()
                .ok_or_else(|| Error::thrown("no caller link"))?;
            let doubled = peer.call("double", vec![args.arg::<i64>(0)?.into()]).await?;
            Ok::<_, Error>(json!({ "relayed": doubled }))
        }),
    );
    let ctx = bridge
        .create_worker("relay", WorkerOptions::new(methods))
        .unwrap();

    let host = Methods::new().with_callable(
        "double",
        Callable::new("double(x) { return x * 2; }", |args| Ok(json!(args.arg::<i64>(0)? * 2))),
    );
    assert_eq!(bridge.expose_host("relay", &host), 1);
    assert_eq!(bridge.expose_host("relay", &host), 0);

    assert_eq!(
        settle(ctx.call("relay", vec![json!(21)])).await.unwrap(),
        json!({ "relayed": 42 })
    );
}

#[tokio::test]
async fn test_reverse_call_to_missing_host_method() {
    let bridge = Bridge::new();
    let methods = Methods::new().with_callable(
        "probe",
        Callable::deferred("async probe() { return await host.absent(); }", |args| async move {
            let peer = args
                .peer()
                .cloned()
                .ok_or_else(|| Error::thrown("no caller link"))?;
            match peer.call("absent", vec![]).await {
                Err(Error::NoSuchMethod { .. }) => Ok(json!("missing")),
                other => other,
            }
        }),
    );
    let ctx = bridge
        .create_worker("probe", WorkerOptions::new(methods))
        .unwrap();

    assert_eq!(settle(ctx.call("probe", vec![])).await.unwrap(), json!("missing"));
}
