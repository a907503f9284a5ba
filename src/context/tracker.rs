//! The request tracker: the manager-side correlator.
//!
//! A single task owns the outstanding-request map. It multiplexes four
//! inputs: new client requests, responses delivered by the listener,
//! timeout notifications from per-request timer tasks, and shutdown.
//! Request ids are allocated here, so they are unique among live requests
//! by construction.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::message::{MessageBody, SnmpMessage};
use crate::oid::Oid;
use crate::pdu::Pdu;
use crate::stats::{StatKind, StatsHandle};
use crate::varbind::VarBind;
use crate::version::Version;

/// Default per-attempt timeout for client requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default retry count for client requests.
pub const DEFAULT_RETRIES: u32 = 3;

/// A client request to a remote agent.
///
/// The request id field of the PDU is assigned by the tracker; any value
/// set by the caller is overwritten.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    /// Remote agent address.
    pub target: SocketAddr,
    /// Protocol version.
    pub version: Version,
    /// Community string.
    pub community: Bytes,
    /// The request PDU.
    pub pdu: Pdu,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Number of retries after the first attempt times out.
    pub retries: u32,
}

impl ClientRequest {
    /// Create a request around an arbitrary PDU.
    pub fn new(target: SocketAddr, community: impl Into<Bytes>, pdu: Pdu) -> Self {
        Self {
            target,
            version: Version::V2c,
            community: community.into(),
            pdu,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
        }
    }

    /// Create a GET request.
    pub fn get(
        target: SocketAddr,
        community: impl Into<Bytes>,
        oids: impl IntoIterator<Item = Oid>,
    ) -> Self {
        Self::new(target, community, Pdu::get_request(oids))
    }

    /// Create a GETNEXT request.
    pub fn get_next(
        target: SocketAddr,
        community: impl Into<Bytes>,
        oids: impl IntoIterator<Item = Oid>,
    ) -> Self {
        Self::new(target, community, Pdu::get_next_request(oids))
    }

    /// Create a SET request.
    pub fn set(target: SocketAddr, community: impl Into<Bytes>, varbinds: Vec<VarBind>) -> Self {
        Self::new(target, community, Pdu::set_request(varbinds))
    }

    /// Create a GETBULK request.
    pub fn get_bulk(
        target: SocketAddr,
        community: impl Into<Bytes>,
        non_repeaters: i32,
        max_repetitions: i32,
        oids: impl IntoIterator<Item = Oid>,
    ) -> Self {
        Self::new(
            target,
            community,
            Pdu::get_bulk_request(non_repeaters, max_repetitions, oids),
        )
    }

    /// Set the protocol version.
    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Set the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry count.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// A client request together with the channel its outcome is delivered on.
pub(crate) struct TrackedRequest {
    pub(crate) request: ClientRequest,
    pub(crate) reply: oneshot::Sender<Result<Pdu>>,
}

/// An outstanding request: either a response or an exhausted retry budget
/// resolves it, whichever the tracker sees first.
struct Pending {
    target: SocketAddr,
    version: Version,
    community: Bytes,
    pdu: Pdu,
    timeout: Duration,
    retries: u32,
    retries_remaining: u32,
    reply: oneshot::Sender<Result<Pdu>>,
    timer: JoinHandle<()>,
}

impl Pending {
    /// Consume one retry; true while the budget lasts.
    fn retry_required(&mut self) -> bool {
        if self.retries_remaining > 0 {
            self.retries_remaining -= 1;
            true
        } else {
            false
        }
    }

    fn message(&self) -> SnmpMessage {
        SnmpMessage::community(
            self.version,
            self.community.clone(),
            self.pdu.clone(),
            self.target,
        )
    }
}

/// Arm a one-shot timer delivering `id` on the tracker's timeout queue.
fn arm_timer(timeouts_tx: mpsc::Sender<u32>, id: u32, timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let _ = timeouts_tx.send(id).await;
    })
}

pub(crate) struct RequestTracker {
    name: Arc<str>,
    stats: StatsHandle,
    shutdown: CancellationToken,
    outbound_tx: mpsc::Sender<SnmpMessage>,
    timeouts_tx: mpsc::Sender<u32>,
    outstanding: HashMap<u32, Pending>,
    next_request_id: u32,
}

/// Spawn the tracker task.
pub(crate) fn spawn(
    name: Arc<str>,
    stats: StatsHandle,
    shutdown: CancellationToken,
    outbound_tx: mpsc::Sender<SnmpMessage>,
    requests_rx: mpsc::Receiver<TrackedRequest>,
    responses_rx: mpsc::Receiver<SnmpMessage>,
) {
    let (timeouts_tx, timeouts_rx) = mpsc::channel(1);
    let tracker = RequestTracker {
        name,
        stats,
        shutdown,
        outbound_tx,
        timeouts_tx,
        outstanding: HashMap::new(),
        next_request_id: 0,
    };
    tokio::spawn(tracker.run(requests_rx, responses_rx, timeouts_rx));
}

impl RequestTracker {
    async fn run(
        mut self,
        mut requests_rx: mpsc::Receiver<TrackedRequest>,
        mut responses_rx: mpsc::Receiver<SnmpMessage>,
        mut timeouts_rx: mpsc::Receiver<u32>,
    ) {
        tracing::debug!(snmp.ctx = %self.name, "request tracker initializing");
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    tracing::debug!(snmp.ctx = %self.name, "request tracker shutting down");
                    break;
                }

                Some(tracked) = requests_rx.recv() => self.on_request(tracked).await,

                Some(msg) = responses_rx.recv() => self.on_response(msg).await,

                Some(id) = timeouts_rx.recv() => self.on_timeout(id).await,
            }
        }
        // requests still outstanding at shutdown: drop the waiters, their
        // callers observe ShuttingDown
        for (_, pending) in self.outstanding.drain() {
            pending.timer.abort();
        }
    }

    /// Monotonic id allocation, wrap-safe: zero and ids still outstanding
    /// are skipped.
    fn allocate_id(&mut self) -> u32 {
        loop {
            self.next_request_id = self.next_request_id.wrapping_add(1);
            let id = self.next_request_id;
            if id != 0 && !self.outstanding.contains_key(&id) {
                return id;
            }
        }
    }

    async fn on_request(&mut self, tracked: TrackedRequest) {
        let TrackedRequest { request, reply } = tracked;
        let id = self.allocate_id();

        let mut pdu = request.pdu;
        pdu.request_id = id;

        let timer = arm_timer(self.timeouts_tx.clone(), id, request.timeout);
        let pending = Pending {
            target: request.target,
            version: request.version,
            community: request.community,
            pdu,
            timeout: request.timeout,
            retries: request.retries,
            retries_remaining: request.retries,
            reply,
            timer,
        };
        let msg = pending.message();
        self.outstanding.insert(id, pending);

        self.stats
            .incr(StatKind::RequestsForwardedToFlowControl)
            .await;
        let _ = self.outbound_tx.send(msg).await;
    }

    async fn on_response(&mut self, msg: SnmpMessage) {
        let MessageBody::Pdu(pdu) = msg.body else {
            return;
        };
        let id = pdu.request_id;
        match self.outstanding.remove(&id) {
            None => {
                // most likely the request already timed out
                self.stats
                    .incr(StatKind::ResponsesDroppedByRequestTracker)
                    .await;
            }
            Some(pending) => {
                pending.timer.abort();
                self.stats.incr(StatKind::ResponsesReleasedToClient).await;
                let _ = pending.reply.send(Ok(pdu));
            }
        }
    }

    async fn on_timeout(&mut self, id: u32) {
        let Some(pending) = self.outstanding.get_mut(&id) else {
            tracing::error!(
                snmp.ctx = %self.name,
                snmp.request_id = id,
                "timeout notification for unknown request id"
            );
            self.stats.incr(StatKind::UnknownRequestsTimedOut).await;
            return;
        };

        if pending.retry_required() {
            let timer = arm_timer(self.timeouts_tx.clone(), id, pending.timeout);
            drop(std::mem::replace(&mut pending.timer, timer));
            let msg = pending.message();

            self.stats.incr(StatKind::RequestsTimedOut).await;
            self.stats
                .incr(StatKind::RequestsForwardedToFlowControl)
                .await;
            let _ = self.outbound_tx.send(msg).await;
        } else {
            let Some(pending) = self.outstanding.remove(&id) else {
                return;
            };
            self.stats.incr(StatKind::RequestRetriesExhausted).await;
            tracing::debug!(
                snmp.ctx = %self.name,
                snmp.request_id = id,
                snmp.target = %pending.target,
                "final timeout, retries exhausted"
            );
            let _ = pending.reply.send(Err(Error::Timeout {
                target: pending.target,
                request_id: id,
                retries: pending.retries,
            }));
        }
    }
}
