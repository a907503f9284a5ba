//! The inbound listener and router.
//!
//! Reads datagrams, decodes them, counts them by PDU type, and routes:
//! request-variant messages go to the registered request processor (the
//! agent), response-variant messages go to the request tracker. Traps are
//! counted and dropped; this engine receives them but does not act on
//! them. Undecodable datagrams are counted and, optionally, logged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, IoOp};
use crate::message::SnmpMessage;
use crate::pdu::PduType;
use crate::stats::{StatKind, StatsHandle};

/// Receive buffer size. SNMP over UDP tops out at 1472 bytes in practice
/// (Ethernet MTU minus IP and UDP headers); 2000 leaves headroom.
const RECV_BUFFER_SIZE: usize = 2000;

pub(crate) struct Listener {
    pub(crate) name: Arc<str>,
    pub(crate) stats: StatsHandle,
    pub(crate) socket: Arc<UdpSocket>,
    pub(crate) io_token: CancellationToken,
    /// Where community requests go; absent on manager-only contexts.
    pub(crate) processor: Option<mpsc::Sender<SnmpMessage>>,
    /// Where responses go; absent on agent-only contexts.
    pub(crate) responses_tx: Option<mpsc::Sender<SnmpMessage>>,
    pub(crate) log_decode_errors: Arc<AtomicBool>,
}

impl Listener {
    pub(crate) async fn run(self) {
        tracing::debug!(
            snmp.ctx = %self.name,
            snmp.local_addr = ?self.socket.local_addr().ok(),
            "incoming message listener initializing"
        );
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            tokio::select! {
                biased;

                _ = self.io_token.cancelled() => {
                    tracing::debug!(snmp.ctx = %self.name, "incoming message listener shutting down");
                    self.stats.incr(StatKind::InboundConnectionClose).await;
                    return;
                }

                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, peer)) => {
                            self.stats.incr(StatKind::InboundMessagesReceived).await;
                            self.process(&buf[..len], peer).await;
                        }
                        Err(err) => {
                            if self.io_token.is_cancelled() {
                                tracing::debug!(
                                    snmp.ctx = %self.name,
                                    "incoming message listener shutting down"
                                );
                                self.stats.incr(StatKind::InboundConnectionClose).await;
                            } else {
                                let err = Error::Io {
                                    op: IoOp::Read,
                                    source: err,
                                };
                                tracing::error!(
                                    snmp.ctx = %self.name,
                                    error = %err,
                                    "incoming message listener dying"
                                );
                                self.stats.incr(StatKind::InboundConnectionDeath).await;
                            }
                            // take the transmit side down too
                            self.io_token.cancel();
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn process(&self, datagram: &[u8], peer: std::net::SocketAddr) {
        let msg = match SnmpMessage::decode(Bytes::copy_from_slice(datagram), peer) {
            Ok(msg) => msg,
            Err(err) => {
                self.stats.incr(StatKind::InboundMessagesUndecodable).await;
                if self.log_decode_errors.load(Ordering::Relaxed) {
                    tracing::debug!(
                        snmp.ctx = %self.name,
                        snmp.peer = %peer,
                        error = %err,
                        bytes = datagram.len(),
                        "undecodable message"
                    );
                }
                return;
            }
        };

        self.record(&msg).await;
        self.route(msg).await;
    }

    /// Count the message by PDU type.
    async fn record(&self, msg: &SnmpMessage) {
        let kind = match msg.pdu_type() {
            PduType::GetRequest => StatKind::GetRequestsReceived,
            PduType::GetNextRequest => StatKind::GetNextRequestsReceived,
            PduType::GetBulkRequest => StatKind::GetBulkRequestsReceived,
            PduType::SetRequest => StatKind::SetRequestsReceived,
            PduType::Response => StatKind::ResponsesReceived,
            PduType::TrapV1 => StatKind::V1TrapsReceived,
            PduType::TrapV2 => StatKind::V2TrapsReceived,
        };
        self.stats.incr(kind).await;
    }

    async fn route(&self, msg: SnmpMessage) {
        if msg.is_community_request() {
            match &self.processor {
                Some(processor) => {
                    let _ = processor.send(msg).await;
                }
                None => {
                    self.stats
                        .incr(StatKind::CommunityRequestWithNoProcessor)
                        .await;
                }
            }
        } else if msg.is_response() {
            match &self.responses_tx {
                Some(responses_tx) => {
                    let _ = responses_tx.send(msg).await;
                }
                None => {
                    tracing::debug!(
                        snmp.ctx = %self.name,
                        snmp.peer = %msg.peer,
                        "response received by a context with no request tracker"
                    );
                }
            }
        }
        // traps were counted by record() and are dropped here
    }
}
