//! The SNMP context: a supervised UDP runtime.
//!
//! A context owns one UDP endpoint and the tasks that multiplex it: the
//! stats tracker, the request tracker (manager contexts only), an
//! outbound flow controller, and an inbound listener. A supervisor
//! watches the I/O pair and restarts it after a failure, never more than
//! once every thirty seconds.

mod inbound;
mod outbound;
mod tracker;

pub use tracker::{ClientRequest, DEFAULT_RETRIES, DEFAULT_TIMEOUT};

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, watch, Mutex, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, IoOp, Result};
use crate::message::SnmpMessage;
use crate::pdu::Pdu;
use crate::stats::{self, StatKind, StatsBin, StatsHandle};
use tracker::TrackedRequest;

/// Minimum spacing between I/O restart attempts, in seconds.
const RESTART_SPACING_SECS: u64 = 30;

/// Buffering on the listener-to-tracker response queue.
const RESPONSE_QUEUE_CAPACITY: usize = 100;

/// Configuration for an [`SnmpContext`].
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Context name, carried on every log line.
    pub name: String,
    /// Bound on concurrent outstanding requests; also sizes the outbound
    /// queue and the request pool.
    pub max_targets: usize,
    /// Local UDP bind address. Defaults to an ephemeral port on all
    /// interfaces.
    pub bind_addr: SocketAddr,
    /// Whether undecodable datagrams are logged (they are always counted).
    pub log_decode_errors: bool,
}

impl ContextConfig {
    /// Create a config with the default bind address `0.0.0.0:0`.
    pub fn new(name: impl Into<String>, max_targets: usize) -> Self {
        Self {
            name: name.into(),
            max_targets,
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            log_decode_errors: false,
        }
    }

    /// Set the bind address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the UDP port, binding all interfaces.
    pub fn port(mut self, port: u16) -> Self {
        self.bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        self
    }

    /// Enable or disable decode-error logging.
    pub fn log_decode_errors(mut self, enabled: bool) -> Self {
        self.log_decode_errors = enabled;
        self
    }
}

/// A long-lived SNMP runtime owning a UDP endpoint.
///
/// Create one with [`SnmpContext::manager`] for client use, or through
/// [`Agent::builder`](crate::agent::Agent::builder) for agent use.
pub struct SnmpContext {
    name: Arc<str>,
    stats: StatsHandle,
    requests_tx: Option<mpsc::Sender<TrackedRequest>>,
    outbound_tx: mpsc::Sender<SnmpMessage>,
    shutdown: CancellationToken,
    shutdown_done: OnceCell<()>,
    complete_rx: watch::Receiver<bool>,
    local_addr_rx: watch::Receiver<SocketAddr>,
    log_decode_errors: Arc<AtomicBool>,
}

impl SnmpContext {
    /// Start a manager context: a request tracker correlates responses
    /// back to callers of [`send_request`](Self::send_request).
    pub async fn manager(config: ContextConfig) -> Result<Arc<Self>> {
        Self::start(config, None, true).await
    }

    /// Start a context. Startup order: stats tracker, request tracker
    /// (managers only), receive/transmit pair, supervisor.
    pub(crate) async fn start(
        config: ContextConfig,
        processor: Option<mpsc::Sender<SnmpMessage>>,
        with_tracker: bool,
    ) -> Result<Arc<Self>> {
        let name: Arc<str> = config.name.into();
        let max_targets = config.max_targets.max(1);
        let shutdown = CancellationToken::new();

        let stats = stats::spawn(name.clone(), shutdown.clone(), stats::secs_to_next_boundary());

        let (outbound_tx, outbound_rx) = mpsc::channel(max_targets);
        let outbound_queue = Arc::new(Mutex::new(outbound_rx));

        let mut requests_tx = None;
        let mut responses_tx = None;
        if with_tracker {
            let (req_tx, req_rx) = mpsc::channel(max_targets);
            let (resp_tx, resp_rx) = mpsc::channel(RESPONSE_QUEUE_CAPACITY);
            tracker::spawn(
                name.clone(),
                stats.clone(),
                shutdown.clone(),
                outbound_tx.clone(),
                req_rx,
                resp_rx,
            );
            requests_tx = Some(req_tx);
            responses_tx = Some(resp_tx);
        }

        // first bind happens here so construction reports bind errors;
        // later generations are the supervisor's business
        let socket = UdpSocket::bind(config.bind_addr).await.map_err(|e| Error::Io {
            op: IoOp::Bind,
            source: e,
        })?;
        let local_addr = socket.local_addr().map_err(|e| Error::Io {
            op: IoOp::Bind,
            source: e,
        })?;

        let (local_addr_tx, local_addr_rx) = watch::channel(local_addr);
        let (complete_tx, complete_rx) = watch::channel(false);
        let log_decode_errors = Arc::new(AtomicBool::new(config.log_decode_errors));

        let supervisor = Supervisor {
            name: name.clone(),
            bind_addr: config.bind_addr,
            stats: stats.clone(),
            shutdown: shutdown.clone(),
            outbound_queue,
            processor,
            responses_tx,
            log_decode_errors: log_decode_errors.clone(),
            local_addr_tx,
            complete_tx,
        };
        let first = supervisor.spawn_io(Arc::new(socket));
        tokio::spawn(supervisor.run(first));

        Ok(Arc::new(SnmpContext {
            name,
            stats,
            requests_tx,
            outbound_tx,
            shutdown,
            shutdown_done: OnceCell::new(),
            complete_rx,
            local_addr_rx,
            log_decode_errors,
        }))
    }

    /// The context name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current local UDP address. Changes when the supervisor rebinds
    /// after an I/O failure.
    pub fn local_addr(&self) -> SocketAddr {
        *self.local_addr_rx.borrow()
    }

    /// Enable or disable logging of undecodable datagrams.
    pub fn set_log_decode_errors(&self, enabled: bool) {
        self.log_decode_errors.store(enabled, Ordering::Relaxed);
    }

    /// Send a request to a remote agent and wait for its response.
    ///
    /// The request tracker assigns the request id, arms the retry timer,
    /// and forwards the message through the bounded outbound queue; a
    /// full queue blocks this call, which is the context's admission
    /// control.
    pub async fn send_request(&self, request: ClientRequest) -> Result<Pdu> {
        let Some(requests_tx) = &self.requests_tx else {
            return Err(Error::InvalidState("context has no request tracker"));
        };
        self.stats.incr(StatKind::RequestsSent).await;

        let (reply, reply_rx) = oneshot::channel();
        requests_tx
            .send(TrackedRequest { request, reply })
            .await
            .map_err(|_| Error::ShuttingDown)?;

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::ShuttingDown),
        }
    }

    /// Queue a response for transmission (agent side).
    pub(crate) async fn send_response(&self, msg: SnmpMessage) {
        let _ = self.outbound_tx.send(msg).await;
    }

    /// Read one counter from one stats bin.
    pub async fn stat(&self, kind: StatKind, bin: u8) -> Result<u64> {
        self.stats.get(kind, bin).await
    }

    /// Snapshot a full stats bin.
    pub async fn stats_bin(&self, bin: u8) -> Result<StatsBin> {
        self.stats.snapshot(bin).await
    }

    /// Shut the context down and wait for completion.
    ///
    /// Idempotent: the first caller triggers the sequence, concurrent and
    /// later callers wait for the same completion.
    pub async fn shutdown(&self) {
        self.shutdown_done
            .get_or_init(|| async {
                tracing::debug!(snmp.ctx = %self.name, "shutdown requested");
                self.shutdown.cancel();
                let mut complete = self.complete_rx.clone();
                while !*complete.borrow_and_update() {
                    if complete.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await;
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// Supervisor states, in the order a failing context walks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupervisorState {
    /// Both I/O tasks alive.
    Running,
    /// One I/O task has died; its partner is being cancelled.
    OneDown,
    /// Both I/O tasks dead; a restart needs scheduling.
    BothDown,
    /// Restart timer armed.
    RestartScheduled,
    /// External shutdown in progress; waiting for the I/O pair to die.
    Draining,
    /// Terminal.
    Stopped,
}

/// One generation of the receive/transmit pair. Task completion is the
/// death signal; the token cancels the partner when one side fails.
struct IoGeneration {
    inbound: Option<JoinHandle<()>>,
    outbound: Option<JoinHandle<()>>,
    token: CancellationToken,
}

impl IoGeneration {
    fn both_dead(&self) -> bool {
        self.inbound.is_none() && self.outbound.is_none()
    }
}

struct Supervisor {
    name: Arc<str>,
    bind_addr: SocketAddr,
    stats: StatsHandle,
    shutdown: CancellationToken,
    outbound_queue: Arc<Mutex<mpsc::Receiver<SnmpMessage>>>,
    processor: Option<mpsc::Sender<SnmpMessage>>,
    responses_tx: Option<mpsc::Sender<SnmpMessage>>,
    log_decode_errors: Arc<AtomicBool>,
    local_addr_tx: watch::Sender<SocketAddr>,
    complete_tx: watch::Sender<bool>,
}

impl Supervisor {
    /// Spawn a listener/transmitter pair over a freshly bound socket.
    fn spawn_io(&self, socket: Arc<UdpSocket>) -> IoGeneration {
        let token = self.shutdown.child_token();

        let listener = inbound::Listener {
            name: self.name.clone(),
            stats: self.stats.clone(),
            socket: socket.clone(),
            io_token: token.clone(),
            processor: self.processor.clone(),
            responses_tx: self.responses_tx.clone(),
            log_decode_errors: self.log_decode_errors.clone(),
        };
        let flow = outbound::FlowController {
            name: self.name.clone(),
            stats: self.stats.clone(),
            socket,
            io_token: token.clone(),
            queue: self.outbound_queue.clone(),
        };

        IoGeneration {
            inbound: Some(tokio::spawn(listener.run())),
            outbound: Some(tokio::spawn(flow.run())),
            token,
        }
    }

    async fn run(self, mut io_pair: IoGeneration) {
        let mut state = SupervisorState::Running;
        // starting up counts as a restart attempt, so an immediate
        // failure still waits out the spacing
        let mut last_restart = Instant::now();
        let mut restart_at: Option<Instant> = None;
        tracing::debug!(snmp.ctx = %self.name, "supervisor running");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled(), if state != SupervisorState::Draining => {
                    io_pair.token.cancel();
                    restart_at = None;
                    state = SupervisorState::Draining;
                }

                _ = join_one(&mut io_pair.inbound) => {
                    state = transition_on_death(state);
                }

                _ = join_one(&mut io_pair.outbound) => {
                    state = transition_on_death(state);
                }

                _ = sleep_until_opt(restart_at), if restart_at.is_some() => {
                    restart_at = None;
                    match UdpSocket::bind(self.bind_addr).await {
                        Ok(socket) => {
                            let socket = Arc::new(socket);
                            if let Ok(addr) = socket.local_addr() {
                                let _ = self.local_addr_tx.send(addr);
                            }
                            io_pair = self.spawn_io(socket);
                            last_restart = Instant::now();
                            state = SupervisorState::Running;
                            tracing::debug!(snmp.ctx = %self.name, "receive/transmit pair restarted");
                        }
                        Err(err) => {
                            tracing::error!(
                                snmp.ctx = %self.name,
                                snmp.bind_addr = %self.bind_addr,
                                error = %err,
                                "could not rebind local port"
                            );
                            last_restart = Instant::now();
                            state = SupervisorState::BothDown;
                        }
                    }
                }
            }

            match state {
                SupervisorState::BothDown => {
                    let spacing = Duration::from_secs(RESTART_SPACING_SECS);
                    let delay = spacing.saturating_sub(last_restart.elapsed());
                    tracing::debug!(
                        snmp.ctx = %self.name,
                        delay_secs = delay.as_secs(),
                        "setting restart timer"
                    );
                    restart_at = Some(Instant::now() + delay);
                    state = SupervisorState::RestartScheduled;
                }
                SupervisorState::Draining if io_pair.both_dead() => {
                    let _ = self.complete_tx.send(true);
                    tracing::debug!(snmp.ctx = %self.name, "shutdown complete");
                    state = SupervisorState::Stopped;
                }
                _ => {}
            }

            if state == SupervisorState::Stopped {
                return;
            }
        }
    }
}

/// Death transitions. Deaths observed while draining keep draining; the
/// post-select check turns that into `Stopped` once both are gone.
fn transition_on_death(state: SupervisorState) -> SupervisorState {
    match state {
        SupervisorState::Running => SupervisorState::OneDown,
        SupervisorState::OneDown => SupervisorState::BothDown,
        other => other,
    }
}

/// Await one I/O task, clearing its slot when it finishes. Pends forever
/// on an empty slot so the select branch stays quiet.
async fn join_one(slot: &mut Option<JoinHandle<()>>) {
    match slot {
        Some(handle) => {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "io task aborted");
            }
            *slot = None;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
