//! Pool semantics against the fake engine: the capacity cap, blocking
//! acquires, eviction of fatal and expired connections, the idle sweeper,
//! disposal, and the round-robin dispatcher on top.

mod support;

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use qlink::client::{ClientPool, ConnectionDispatcher, PoolRegistry};
use qlink::errors::Error;
use qlink::wire::Value;
use qlink::Client;

use support::{Behavior, FakeEngine};

#[test]
fn saturated_acquire_blocks_until_a_release() {
    support::init_tracing();
    let engine = FakeEngine::start(Behavior::Respond(Value::Int(0)));
    let mut params = engine.params();
    params.max_pool_size = 2;
    let pool = Arc::new(ClientPool::new(params).expect("pool"));

    let first = pool.acquire().expect("first");
    let _second = pool.acquire().expect("second");
    assert_eq!(pool.stats().created, 2);

    let (tx, rx) = mpsc::channel();
    let contender = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            let guard = pool.acquire().expect("third, after a release");
            tx.send(guard.is_connected()).expect("report");
        })
    };

    // The pool is saturated, so the third acquire must still be waiting.
    assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());

    drop(first);
    let healthy = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("third acquire should complete once a slot frees");
    assert!(healthy);
    contender.join().expect("contender thread");
}

#[test]
fn created_never_exceeds_the_cap_under_churn() {
    support::init_tracing();
    let engine = FakeEngine::start(Behavior::Respond(Value::Int(0)));
    let mut params = engine.params();
    params.max_pool_size = 3;
    let pool = Arc::new(ClientPool::new(params).expect("pool"));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for _ in 0..5 {
                    let mut guard = pool.acquire().expect("acquire");
                    let n: i32 = guard.execute_scalar("0", &[]).expect("query");
                    assert_eq!(n, 0);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker thread");
    }

    let stats = pool.stats();
    assert!(stats.created <= 3, "created {} exceeds cap", stats.created);
    assert_eq!(stats.in_use, 0);
}

#[test]
fn fatal_connection_is_retired_at_release() {
    support::init_tracing();
    let engine = FakeEngine::start(Behavior::Truncate);
    let mut params = engine.params();
    params.max_pool_size = 1;
    let pool = ClientPool::new(params).expect("pool");

    let mut guard = pool.acquire().expect("acquire");
    let err = guard.execute_query("0", &[]).unwrap_err();
    assert!(matches!(err, Error::Fatal(_)));
    drop(guard);

    let stats = pool.stats();
    assert_eq!(stats.idle, 0);
    assert_eq!(stats.created, 0);

    // The freed slot admits a replacement connection.
    let guard = pool.acquire().expect("replacement");
    assert!(guard.is_connected());
}

#[test]
fn expired_connection_is_retired_at_release() {
    support::init_tracing();
    let engine = FakeEngine::start(Behavior::Respond(Value::Int(0)));
    let mut params = engine.params();
    params.load_balance_timeout = Duration::from_millis(40);
    let pool = ClientPool::new(params).expect("pool");

    let guard = pool.acquire().expect("acquire");
    thread::sleep(Duration::from_millis(80));
    drop(guard);

    let stats = pool.stats();
    assert_eq!(stats.idle, 0);
    assert_eq!(stats.created, 0);
}

#[test]
fn sweeper_retires_quiet_idle_connections() {
    support::init_tracing();
    let engine = FakeEngine::start(Behavior::Respond(Value::Int(0)));
    let mut params = engine.params();
    params.inactivity_timeout = Duration::from_millis(50);
    let pool = ClientPool::new(params).expect("pool");

    drop(pool.acquire().expect("acquire"));
    assert_eq!(pool.stats().idle, 1);

    thread::sleep(Duration::from_millis(300));
    let stats = pool.stats();
    assert_eq!(stats.idle, 0);
    assert_eq!(stats.created, 0);
}

#[test]
fn warm_min_shelves_idle_connections() {
    support::init_tracing();
    let engine = FakeEngine::start(Behavior::Respond(Value::Int(0)));
    let mut params = engine.params();
    params.min_pool_size = 2;
    params.max_pool_size = 4;
    let pool = ClientPool::new(params).expect("pool");

    pool.warm_min();
    let stats = pool.stats();
    assert_eq!(stats.idle, 2);
    assert_eq!(stats.created, 2);
}

#[test]
fn disposed_pool_refuses_acquires_and_drains_on_release() {
    support::init_tracing();
    let engine = FakeEngine::start(Behavior::Respond(Value::Int(0)));
    let mut params = engine.params();
    params.max_pool_size = 2;
    let pool = ClientPool::new(params).expect("pool");

    let borrowed = pool.acquire().expect("acquire");
    pool.dispose();

    let err = pool.acquire().unwrap_err();
    assert!(matches!(err, Error::PoolDisposed));

    // The borrowed connection closes at release, not at dispose.
    drop(borrowed);
    assert_eq!(pool.stats().created, 0);
}

#[test]
fn descriptor_pooling_flag_selects_the_source() {
    support::init_tracing();
    let engine = FakeEngine::start(Behavior::Respond(Value::Int(0)));
    let registry = Arc::new(PoolRegistry::new());

    let mut pooled = engine.params();
    pooled.max_pool_size = 2;
    let client = Client::from_params(&pooled, &registry).expect("pooled client");
    let n: i32 = client.execute_scalar("0", &[]).expect("query");
    assert_eq!(n, 0);
    assert_eq!(registry.len(), 1);
    // The operation went through the shared pool and came back idle.
    assert_eq!(registry.pool(&pooled).expect("shared pool").stats().idle, 1);

    let mut dedicated = engine.params();
    dedicated.pooling = false;
    let client = Client::from_params(&dedicated, &registry).expect("dedicated client");
    let n: i32 = client.execute_scalar("0", &[]).expect("query");
    assert_eq!(n, 0);
    assert_eq!(registry.len(), 1);
}

#[test]
fn dispatcher_rotates_between_endpoints() {
    support::init_tracing();
    let left = FakeEngine::start(Behavior::Respond(Value::Int(1)));
    let right = FakeEngine::start(Behavior::Respond(Value::Int(2)));

    let dispatcher =
        ConnectionDispatcher::new(vec![left.params(), right.params()]).expect("dispatcher");
    let registry = Arc::new(PoolRegistry::new());
    let client = Client::dispatched(dispatcher, Arc::clone(&registry));

    let mut seen = Vec::new();
    for _ in 0..4 {
        let n: i32 = client.execute_scalar("id", &[]).expect("query");
        seen.push(n);
    }
    assert_eq!(seen, [1, 2, 1, 2]);
    assert_eq!(registry.len(), 2);
}
