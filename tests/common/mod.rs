//! Shared test infrastructure: in-process agents, map-backed handlers,
//! and transaction-provider probes.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use snmp_engine::agent::{Agent, NoopTransactions, OidHandler, TransactionProvider};
use snmp_engine::{
    ClientRequest, ContextConfig, Oid, Result, SnmpContext, StatKind, Value, VarBind,
};

static TRACING: Once = Once::new();

/// Install a test subscriber once, honoring `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Loopback with an ephemeral port.
pub fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

/// Map-backed handler: GET reads the shared map, SET writes it.
pub struct MapHandler {
    store: Arc<Mutex<HashMap<Oid, Value>>>,
}

impl MapHandler {
    pub fn new(store: Arc<Mutex<HashMap<Oid, Value>>>) -> Self {
        Self { store }
    }
}

impl<T> OidHandler<T> for MapHandler {
    fn get(&self, oid: &Oid, _txn: &mut T) -> Result<VarBind> {
        let store = self.store.lock().unwrap();
        match store.get(oid) {
            Some(value) => Ok(VarBind::new(oid.clone(), value.clone())),
            None => Err(snmp_engine::Error::InvalidState("no value stored")),
        }
    }

    fn set(&self, vb: &VarBind, _txn: &mut T) -> Result<VarBind> {
        self.store
            .lock()
            .unwrap()
            .insert(vb.oid.clone(), vb.value.clone());
        Ok(vb.clone())
    }
}

/// Handler that fails every call.
pub struct FailingHandler;

impl<T> OidHandler<T> for FailingHandler {
    fn get(&self, _oid: &Oid, _txn: &mut T) -> Result<VarBind> {
        Err(snmp_engine::Error::InvalidState("get always fails"))
    }

    fn set(&self, _vb: &VarBind, _txn: &mut T) -> Result<VarBind> {
        Err(snmp_engine::Error::InvalidState("set always fails"))
    }
}

/// Provider that refuses to start transactions.
pub struct DenyingProvider;

impl TransactionProvider for DenyingProvider {
    type Txn = ();

    fn start_txn(&self) -> Option<()> {
        None
    }

    fn commit_txn(&self, _txn: ()) -> bool {
        true
    }

    fn abort_txn(&self, _txn: ()) {}
}

/// Provider that counts commits and aborts.
#[derive(Default)]
pub struct CountingProvider {
    pub commits: Arc<AtomicUsize>,
    pub aborts: Arc<AtomicUsize>,
}

impl TransactionProvider for CountingProvider {
    type Txn = ();

    fn start_txn(&self) -> Option<()> {
        Some(())
    }

    fn commit_txn(&self, _txn: ()) -> bool {
        self.commits.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn abort_txn(&self, _txn: ()) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Start a loopback agent serving the given OID-value pairs through a
/// shared map, returning the agent and the map.
pub async fn map_agent(
    entries: &[(Oid, Value)],
) -> (Agent, Arc<Mutex<HashMap<Oid, Value>>>) {
    init_tracing();
    let store = Arc::new(Mutex::new(
        entries.iter().cloned().collect::<HashMap<_, _>>(),
    ));
    let mut builder = Agent::builder("test-agent", 16, NoopTransactions).bind_addr(loopback());
    for (oid, _) in entries {
        builder = builder
            .register_single_var_handler(oid.clone(), Arc::new(MapHandler::new(store.clone())));
    }
    let agent = builder.start().await.unwrap();
    (agent, store)
}

/// Start a loopback manager context.
pub async fn manager() -> Arc<SnmpContext> {
    init_tracing();
    SnmpContext::manager(ContextConfig::new("test-manager", 16).bind_addr(loopback()))
        .await
        .unwrap()
}

/// A GET with the short timeout test agents warrant.
pub fn quick_get(target: SocketAddr, oids: impl IntoIterator<Item = Oid>) -> ClientRequest {
    ClientRequest::get(target, &b"public"[..], oids).timeout(Duration::from_secs(2))
}

/// Poll a live-bin stat until it reaches `expected` or the deadline
/// passes; stat increments are asynchronous to the events they count.
pub async fn wait_stat(ctx: &SnmpContext, kind: StatKind, expected: u64) {
    for _ in 0..500 {
        if ctx.stat(kind, 0).await.unwrap_or(0) >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "stat {} did not reach {} (last: {:?})",
        kind,
        expected,
        ctx.stat(kind, 0).await
    );
}
