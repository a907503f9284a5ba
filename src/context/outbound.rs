//! The outbound flow controller.
//!
//! Drains the bounded outbound queue, encodes each message, and writes it
//! to the UDP socket. The queue's fixed capacity is the context's only
//! outbound admission control: producers block when it is full.
//!
//! On a write error the controller exits and cancels the generation token
//! so the listener comes down with it; an exit caused by cancellation is
//! the expected shutdown path and is counted separately from a genuine
//! connection death.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, IoOp};
use crate::message::SnmpMessage;
use crate::stats::{StatKind, StatsHandle};

pub(crate) struct FlowController {
    pub(crate) name: Arc<str>,
    pub(crate) stats: StatsHandle,
    pub(crate) socket: Arc<UdpSocket>,
    pub(crate) io_token: CancellationToken,
    pub(crate) queue: Arc<Mutex<mpsc::Receiver<SnmpMessage>>>,
}

impl FlowController {
    pub(crate) async fn run(self) {
        // the queue receiver outlives any one generation; holding the lock
        // for the lifetime of this task hands it to the next generation on
        // exit
        let mut queue = self.queue.lock().await;
        tracing::debug!(snmp.ctx = %self.name, "outbound flow controller initializing");

        loop {
            tokio::select! {
                biased;

                _ = self.io_token.cancelled() => {
                    tracing::debug!(
                        snmp.ctx = %self.name,
                        "outbound flow controller shutting down due to closed connection"
                    );
                    self.stats.incr(StatKind::OutboundConnectionClose).await;
                    return;
                }

                msg = queue.recv() => {
                    let Some(msg) = msg else {
                        // every sender is gone; bring the listener down too
                        self.io_token.cancel();
                        return;
                    };
                    let encoded = msg.encode();
                    match self.socket.send_to(&encoded, msg.peer).await {
                        Ok(n) if n == encoded.len() => {
                            self.stats.incr(StatKind::OutboundMessagesSent).await;
                        }
                        Ok(n) => {
                            tracing::error!(
                                snmp.ctx = %self.name,
                                snmp.target = %msg.peer,
                                written = n,
                                expected = encoded.len(),
                                "short UDP write"
                            );
                            self.stats.incr(StatKind::OutboundConnectionDeath).await;
                            self.io_token.cancel();
                            return;
                        }
                        Err(err) => {
                            if self.io_token.is_cancelled() {
                                tracing::debug!(
                                    snmp.ctx = %self.name,
                                    "outbound flow controller shutting down due to closed connection"
                                );
                                self.stats.incr(StatKind::OutboundConnectionClose).await;
                            } else {
                                let err = Error::Io {
                                    op: IoOp::Write,
                                    source: err,
                                };
                                tracing::error!(
                                    snmp.ctx = %self.name,
                                    snmp.target = %msg.peer,
                                    error = %err,
                                    "outbound flow controller dying"
                                );
                                self.stats.incr(StatKind::OutboundConnectionDeath).await;
                            }
                            // take the listener down too
                            self.io_token.cancel();
                            return;
                        }
                    }
                }
            }
        }
    }
}
