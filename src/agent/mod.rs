//! SNMP agent: OID-tree dispatch into registered handlers.
//!
//! An agent is a context in the receiving role. Incoming community
//! requests are routed to a dispatcher task that resolves each varbind
//! OID against a tree of registered handlers and invokes the handler's
//! get or set inside a transaction obtained from the embedder's
//! [`TransactionProvider`].
//!
//! Handlers are registered before the agent starts; the tree moves into
//! the dispatcher task at startup and is read-only from then on.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::ops::Bound;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::context::{ContextConfig, SnmpContext};
use crate::error::{Error, ErrorStatus, Result};
use crate::message::SnmpMessage;
use crate::oid::Oid;
use crate::pdu::{Pdu, PduType};
use crate::pool::{Recycle, RequestPool};
use crate::varbind::VarBind;

/// Default agent UDP port.
pub const DEFAULT_AGENT_PORT: u16 = 161;

/// Handler for a registered OID.
///
/// Both calls run inside the transaction the provider opened for the
/// enclosing request. An error from either call is reflected in the
/// response PDU's error-status and error-index; it does not fail the
/// whole response.
pub trait OidHandler<T>: Send + Sync {
    /// Produce the varbind answering a GET of `oid`.
    fn get(&self, oid: &Oid, txn: &mut T) -> Result<VarBind>;

    /// Apply a SET and return the varbind reflecting the new state.
    fn set(&self, vb: &VarBind, txn: &mut T) -> Result<VarBind>;
}

/// Transaction lifecycle around each incoming request.
///
/// `start_txn` returning `None` means the backing store cannot serve the
/// request right now; the agent answers with `resourceUnavailable`.
pub trait TransactionProvider: Send + Sync + 'static {
    /// The transaction object handed to handlers.
    type Txn: Send;

    /// Begin a transaction, or `None` if one cannot be started.
    fn start_txn(&self) -> Option<Self::Txn>;

    /// Commit; false means the commit failed and was rolled back.
    fn commit_txn(&self, txn: Self::Txn) -> bool;

    /// Abort, rolling back anything the handlers did.
    fn abort_txn(&self, txn: Self::Txn);
}

/// Provider for agents whose handlers need no transactional store.
pub struct NoopTransactions;

impl TransactionProvider for NoopTransactions {
    type Txn = ();

    fn start_txn(&self) -> Option<()> {
        Some(())
    }

    fn commit_txn(&self, _txn: ()) -> bool {
        true
    }

    fn abort_txn(&self, _txn: ()) {}
}

/// A node in the dispatch tree.
struct OidTreeNode<T> {
    oid: Oid,
    /// True when the handler covers a subtree of instances rather than a
    /// single one. Single-variable registration always sets false.
    #[allow(dead_code)]
    is_multi: bool,
    handler: Arc<dyn OidHandler<T>>,
}

/// Builder for [`Agent`].
pub struct AgentBuilder<P: TransactionProvider> {
    config: ContextConfig,
    provider: P,
    tree: BTreeMap<Oid, OidTreeNode<P::Txn>>,
}

impl<P: TransactionProvider> AgentBuilder<P> {
    /// Set the UDP bind address (default `0.0.0.0:161`).
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config = self.config.bind_addr(addr);
        self
    }

    /// Set the UDP port, binding all interfaces.
    pub fn port(mut self, port: u16) -> Self {
        self.config = self.config.port(port);
        self
    }

    /// Enable decode-error logging.
    pub fn log_decode_errors(mut self, enabled: bool) -> Self {
        self.config = self.config.log_decode_errors(enabled);
        self
    }

    /// Register a handler for a single variable instance.
    ///
    /// The OID should name the exact instance (e.g. `sysDescr.0`). A
    /// later registration for the same OID replaces the earlier one.
    pub fn register_single_var_handler(
        mut self,
        oid: Oid,
        handler: Arc<dyn OidHandler<P::Txn>>,
    ) -> Self {
        self.tree.insert(
            oid.clone(),
            OidTreeNode {
                oid,
                is_multi: false,
                handler,
            },
        );
        self
    }

    /// Bind the socket and start the agent.
    pub async fn start(self) -> Result<Agent> {
        let max_targets = self.config.max_targets.max(1);
        let (requests_tx, requests_rx) = mpsc::channel(max_targets);
        let context = SnmpContext::start(self.config, Some(requests_tx), false).await?;

        let dispatcher = Dispatcher {
            name: context.name_arc(),
            shutdown: context.shutdown_token(),
            context: context.clone(),
            provider: self.provider,
            tree: self.tree,
            pool: RequestPool::new(max_targets, ResponseSlot::default),
        };
        tokio::spawn(dispatcher.run(requests_rx));

        Ok(Agent { context })
    }
}

/// A running SNMP agent. Derefs to its [`SnmpContext`] for shutdown,
/// stats, and address queries.
pub struct Agent {
    context: Arc<SnmpContext>,
}

impl Agent {
    /// Start building an agent. `provider` supplies the transaction
    /// around each incoming request; use [`NoopTransactions`] when the
    /// handlers have no transactional store.
    pub fn builder<P: TransactionProvider>(
        name: impl Into<String>,
        max_targets: usize,
        provider: P,
    ) -> AgentBuilder<P> {
        AgentBuilder {
            config: ContextConfig::new(name, max_targets).port(DEFAULT_AGENT_PORT),
            provider,
            tree: BTreeMap::new(),
        }
    }

    /// The underlying context.
    pub fn context(&self) -> Arc<SnmpContext> {
        self.context.clone()
    }
}

impl std::ops::Deref for Agent {
    type Target = SnmpContext;

    fn deref(&self) -> &SnmpContext {
        &self.context
    }
}

/// Reusable response-assembly slot; pooled to bound concurrently served
/// requests.
#[derive(Default)]
struct ResponseSlot {
    varbinds: Vec<VarBind>,
}

impl Recycle for ResponseSlot {
    fn recycle(&mut self) {
        self.varbinds.clear();
    }
}

/// The dispatcher task: single consumer of the inbound request queue.
struct Dispatcher<P: TransactionProvider> {
    name: Arc<str>,
    shutdown: CancellationToken,
    context: Arc<SnmpContext>,
    provider: P,
    tree: BTreeMap<Oid, OidTreeNode<P::Txn>>,
    pool: RequestPool<ResponseSlot>,
}

impl<P: TransactionProvider> Dispatcher<P> {
    async fn run(self, mut requests_rx: mpsc::Receiver<SnmpMessage>) {
        tracing::debug!(snmp.ctx = %self.name, "agent dispatcher initializing");
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    tracing::debug!(snmp.ctx = %self.name, "agent dispatcher shutting down");
                    return;
                }

                msg = requests_rx.recv() => {
                    let Some(msg) = msg else { return };
                    self.process(msg).await;
                }
            }
        }
    }

    async fn process(&self, msg: SnmpMessage) {
        let Some(request) = msg.pdu() else { return };
        let mut slot = self.pool.acquire().await;
        let mut response = Pdu::response_to(request);

        match self.provider.start_txn() {
            None => {
                response.error_status = ErrorStatus::ResourceUnavailable.as_i32();
                response.error_index = 1;
            }
            Some(mut txn) => {
                let mut set_failed = false;
                for (idx, vb) in request.varbinds.iter().enumerate() {
                    let Some(node) = self.lookup(&vb.oid) else {
                        slot.varbinds.push(VarBind::no_such_object(vb.oid.clone()));
                        continue;
                    };
                    let result = match request.pdu_type {
                        PduType::GetRequest => node.handler.get(&vb.oid, &mut txn),
                        PduType::SetRequest => node.handler.set(vb, &mut txn),
                        _ => Err(Error::InvalidState(
                            "operation not supported by single-variable handlers",
                        )),
                    };
                    match result {
                        Ok(out) => slot.varbinds.push(out),
                        Err(err) => {
                            tracing::debug!(
                                snmp.ctx = %self.name,
                                snmp.oid = %vb.oid,
                                error = %err,
                                "handler failed"
                            );
                            if response.error_status == 0 {
                                response.error_status = ErrorStatus::GenErr.as_i32();
                                response.error_index = (idx + 1) as i32;
                            }
                            if request.pdu_type == PduType::SetRequest {
                                set_failed = true;
                            }
                            slot.varbinds.push(vb.clone());
                        }
                    }
                }
                if set_failed {
                    self.provider.abort_txn(txn);
                } else if !self.provider.commit_txn(txn) && response.error_status == 0 {
                    response.error_status = ErrorStatus::CommitFailed.as_i32();
                }
            }
        }

        response.varbinds = std::mem::take(&mut slot.varbinds);
        let out = SnmpMessage::community(msg.version, msg.community.clone(), response, msg.peer);
        self.context.send_response(out).await;
    }

    fn lookup(&self, oid: &Oid) -> Option<&OidTreeNode<P::Txn>> {
        let node = ceiling_lookup(&self.tree, oid);
        if node.is_none() && self.tree.is_empty() {
            tracing::warn!(snmp.ctx = %self.name, "agent has no registered handlers");
        }
        node
    }
}

/// Resolve the handler covering `oid`: the ceiling entry (least
/// registered OID >= `oid`) covers it only when that entry's OID is a
/// prefix of the request.
fn ceiling_lookup<'t, T>(
    tree: &'t BTreeMap<Oid, OidTreeNode<T>>,
    oid: &Oid,
) -> Option<&'t OidTreeNode<T>> {
    let (_, node) = tree
        .range((Bound::Included(oid), Bound::Unbounded))
        .next()?;
    if node.oid.match_len(oid) != node.oid.len() {
        return None;
    }
    Some(node)
}
