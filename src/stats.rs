//! Context statistics: a ring of 15-minute counter bins.
//!
//! Every subsystem reports events by pushing a [`StatKind`] onto a
//! buffered channel; a single tracker task owns the ring, ticks it once a
//! second, and answers point queries. Increments land in the live bin
//! (slot 0) only; on rollover the live bin shifts to slot 1 and the
//! oldest bin falls off the end.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Number of bins: 96 fifteen-minute windows in a day, plus the live bin.
pub const STAT_BINS: usize = 97;

/// Seconds per bin after the first rollover.
pub const ROLLOVER_SECS: u32 = 900;

/// Buffering on the increment channel, so bursts of events do not stall
/// the hot paths that report them.
const INCREMENT_BUFFER: usize = 100;

/// Kinds of events the context counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum StatKind {
    InboundConnectionDeath,
    InboundConnectionClose,
    OutboundConnectionDeath,
    OutboundConnectionClose,
    InboundMessagesReceived,
    InboundMessagesUndecodable,
    OutboundMessagesSent,
    ResponsesReleasedToClient,
    ResponsesDroppedByRequestTracker,
    RequestsSent,
    RequestsForwardedToFlowControl,
    UnknownRequestsTimedOut,
    RequestsTimedOut,
    RequestRetriesExhausted,
    GetRequestsReceived,
    GetNextRequestsReceived,
    GetBulkRequestsReceived,
    SetRequestsReceived,
    ResponsesReceived,
    V1TrapsReceived,
    V2TrapsReceived,
    CommunityRequestWithNoProcessor,
}

impl std::fmt::Display for StatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::InboundConnectionDeath => "Inbound Connection Death",
            Self::InboundConnectionClose => "Inbound Connection Close",
            Self::OutboundConnectionDeath => "Outbound Connection Death",
            Self::OutboundConnectionClose => "Outbound Connection Close",
            Self::InboundMessagesReceived => "Inbound Messages Received",
            Self::InboundMessagesUndecodable => "Inbound Messages Undecodable",
            Self::OutboundMessagesSent => "Outbound Messages Sent",
            Self::ResponsesReleasedToClient => "Responses Released To Client",
            Self::ResponsesDroppedByRequestTracker => "Responses Dropped By Request Tracker",
            Self::RequestsSent => "Requests Sent",
            Self::RequestsForwardedToFlowControl => "Requests Forwarded To Flow Control",
            Self::UnknownRequestsTimedOut => "Unknown Requests Timed Out",
            Self::RequestsTimedOut => "Requests Timed Out",
            Self::RequestRetriesExhausted => "Request Retries Exhausted",
            Self::GetRequestsReceived => "Get Requests Received",
            Self::GetNextRequestsReceived => "GetNext Requests Received",
            Self::GetBulkRequestsReceived => "GetBulk Requests Received",
            Self::SetRequestsReceived => "Set Requests Received",
            Self::ResponsesReceived => "Responses Received",
            Self::V1TrapsReceived => "V1 Traps Received",
            Self::V2TrapsReceived => "V2 Traps Received",
            Self::CommunityRequestWithNoProcessor => {
                "Community Request Received With No Request Processor"
            }
        };
        write!(f, "{}", name)
    }
}

/// One window of counters plus the seconds it has been live.
#[derive(Debug, Clone, Default)]
pub struct StatsBin {
    /// Counter per stat kind; absent kinds have counted zero events.
    pub counts: HashMap<StatKind, u64>,
    /// Seconds this bin spent as the live bin.
    pub num_seconds: u32,
}

impl StatsBin {
    /// Counter value for one kind (zero if never incremented).
    pub fn get(&self, kind: StatKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }
}

/// The ring itself, free of any clock or channel so it can be tested
/// directly. Slot 0 is the live bin; older slots are populated by
/// rollover and stay `None` until then.
pub(crate) struct StatsRing {
    bins: Vec<Option<StatsBin>>,
    next_rollover: u32,
}

impl StatsRing {
    /// `initial_rollover` is the number of seconds until the first
    /// wall-clock 15-minute boundary; later rollovers happen every
    /// [`ROLLOVER_SECS`].
    pub(crate) fn new(initial_rollover: u32) -> Self {
        let mut bins = Vec::with_capacity(STAT_BINS);
        bins.push(Some(StatsBin::default()));
        bins.resize_with(STAT_BINS, || None);
        Self {
            bins,
            next_rollover: initial_rollover.clamp(1, ROLLOVER_SECS),
        }
    }

    /// Count one event in the live bin.
    pub(crate) fn incr(&mut self, kind: StatKind) {
        if let Some(live) = &mut self.bins[0] {
            *live.counts.entry(kind).or_insert(0) += 1;
        }
    }

    /// Advance the live bin by one second, rolling the ring over when the
    /// bin reaches its boundary.
    pub(crate) fn tick(&mut self) {
        let Some(live) = &mut self.bins[0] else {
            return;
        };
        live.num_seconds += 1;
        if live.num_seconds == self.next_rollover {
            for i in (1..self.bins.len()).rev() {
                let previous = self.bins[i - 1].take();
                self.bins[i] = previous;
            }
            self.bins[0] = Some(StatsBin::default());
            self.next_rollover = ROLLOVER_SECS;
        }
    }

    /// Counter value for one kind in one bin; `None` if the bin does not
    /// exist (index out of range or not yet populated by rollover).
    pub(crate) fn get(&self, kind: StatKind, bin: u8) -> Option<u64> {
        self.bins
            .get(bin as usize)?
            .as_ref()
            .map(|b| b.get(kind))
    }

    /// Snapshot (copy) of one bin.
    pub(crate) fn snapshot(&self, bin: u8) -> Option<StatsBin> {
        self.bins.get(bin as usize)?.clone()
    }
}

enum StatsQuery {
    Get {
        kind: StatKind,
        bin: u8,
        reply: oneshot::Sender<Option<u64>>,
    },
    Snapshot {
        bin: u8,
        reply: oneshot::Sender<Option<StatsBin>>,
    },
}

/// Handle for reporting and querying stats. Cheap to clone.
#[derive(Clone)]
pub struct StatsHandle {
    incr_tx: mpsc::Sender<StatKind>,
    query_tx: mpsc::Sender<StatsQuery>,
}

impl StatsHandle {
    /// Count one event. Increments are delivered asynchronously and may
    /// be observed slightly out of order with the event they count.
    pub(crate) async fn incr(&self, kind: StatKind) {
        let _ = self.incr_tx.send(kind).await;
    }

    /// Read one counter from one bin.
    pub async fn get(&self, kind: StatKind, bin: u8) -> Result<u64> {
        let (reply, rx) = oneshot::channel();
        self.query_tx
            .send(StatsQuery::Get { kind, bin, reply })
            .await
            .map_err(|_| Error::ShuttingDown)?;
        rx.await
            .map_err(|_| Error::ShuttingDown)?
            .ok_or(Error::BinUnavailable { bin })
    }

    /// Snapshot the full counter map of one bin.
    pub async fn snapshot(&self, bin: u8) -> Result<StatsBin> {
        let (reply, rx) = oneshot::channel();
        self.query_tx
            .send(StatsQuery::Snapshot { bin, reply })
            .await
            .map_err(|_| Error::ShuttingDown)?;
        rx.await
            .map_err(|_| Error::ShuttingDown)?
            .ok_or(Error::BinUnavailable { bin })
    }
}

/// Seconds until the next wall-clock 15-minute boundary.
pub(crate) fn secs_to_next_boundary() -> u32 {
    let unix_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    (u64::from(ROLLOVER_SECS) - unix_secs % u64::from(ROLLOVER_SECS)) as u32
}

/// Spawn the stats tracker task and return its handle.
pub(crate) fn spawn(
    name: Arc<str>,
    shutdown: CancellationToken,
    initial_rollover: u32,
) -> StatsHandle {
    let (incr_tx, mut incr_rx) = mpsc::channel(INCREMENT_BUFFER);
    let (query_tx, mut query_rx) = mpsc::channel::<StatsQuery>(1);

    tokio::spawn(async move {
        let mut ring = StatsRing::new(initial_rollover);
        let start = tokio::time::Instant::now() + Duration::from_secs(1);
        let mut ticker = tokio::time::interval_at(start, Duration::from_secs(1));
        tracing::debug!(snmp.ctx = %name, "stats tracker initializing");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    tracing::debug!(snmp.ctx = %name, "stats tracker shutting down");
                    break;
                }

                Some(kind) = incr_rx.recv() => ring.incr(kind),

                Some(query) = query_rx.recv() => match query {
                    StatsQuery::Get { kind, bin, reply } => {
                        let _ = reply.send(ring.get(kind, bin));
                    }
                    StatsQuery::Snapshot { bin, reply } => {
                        let _ = reply.send(ring.snapshot(bin));
                    }
                },

                _ = ticker.tick() => ring.tick(),
            }
        }
    });

    StatsHandle { incr_tx, query_tx }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_bin_counts() {
        let mut ring = StatsRing::new(900);
        ring.incr(StatKind::RequestsSent);
        ring.incr(StatKind::RequestsSent);
        ring.incr(StatKind::OutboundMessagesSent);

        assert_eq!(ring.get(StatKind::RequestsSent, 0), Some(2));
        assert_eq!(ring.get(StatKind::OutboundMessagesSent, 0), Some(1));
        // never-incremented kinds read as zero in an existing bin
        assert_eq!(ring.get(StatKind::ResponsesReceived, 0), Some(0));
    }

    #[test]
    fn unpopulated_bins_unavailable() {
        let ring = StatsRing::new(900);
        assert_eq!(ring.get(StatKind::RequestsSent, 1), None);
        assert_eq!(ring.get(StatKind::RequestsSent, 96), None);
        assert_eq!(ring.get(StatKind::RequestsSent, 97), None);
        assert!(ring.snapshot(200).is_none());
    }

    #[test]
    fn seconds_accumulate_before_rollover() {
        let mut ring = StatsRing::new(900);
        for _ in 0..10 {
            ring.tick();
        }
        assert_eq!(ring.snapshot(0).unwrap().num_seconds, 10);
    }

    #[test]
    fn rollover_shifts_live_bin_to_slot_one() {
        let mut ring = StatsRing::new(5);
        ring.incr(StatKind::RequestsSent);
        for _ in 0..5 {
            ring.tick();
        }

        // previous live bin moved to slot 1, slot 0 fresh
        let old = ring.snapshot(1).unwrap();
        assert_eq!(old.get(StatKind::RequestsSent), 1);
        assert_eq!(old.num_seconds, 5);

        let live = ring.snapshot(0).unwrap();
        assert!(live.counts.is_empty());
        assert_eq!(live.num_seconds, 0);

        // subsequent rollovers use the full window
        for _ in 0..899 {
            ring.tick();
        }
        assert_eq!(ring.snapshot(0).unwrap().num_seconds, 899);
        ring.tick();
        assert_eq!(ring.snapshot(0).unwrap().num_seconds, 0);
        assert_eq!(ring.snapshot(2).unwrap().get(StatKind::RequestsSent), 1);
    }

    #[test]
    fn increments_after_rollover_stay_in_live_bin() {
        let mut ring = StatsRing::new(1);
        ring.tick(); // rollover
        ring.incr(StatKind::ResponsesReceived);
        assert_eq!(ring.get(StatKind::ResponsesReceived, 0), Some(1));
        assert_eq!(ring.get(StatKind::ResponsesReceived, 1), Some(0));
    }

    #[test]
    fn oldest_bin_is_discarded() {
        let mut ring = StatsRing::new(1);
        // tag the first bin, then roll it all the way off the end
        ring.incr(StatKind::V1TrapsReceived);
        ring.tick();
        for _ in 0..(STAT_BINS - 1) {
            for _ in 0..900 {
                ring.tick();
            }
        }
        assert_eq!(ring.get(StatKind::V1TrapsReceived, 96), Some(0));
    }

    #[test]
    fn boundary_computation_in_range() {
        let secs = secs_to_next_boundary();
        assert!(secs >= 1 && secs <= ROLLOVER_SECS);
    }

    #[tokio::test(start_paused = true)]
    async fn tracker_task_counts_and_ticks() {
        let shutdown = CancellationToken::new();
        let handle = spawn(Arc::from("test"), shutdown.clone(), 900);

        handle.incr(StatKind::RequestsSent).await;
        handle.incr(StatKind::RequestsSent).await;
        // allow delivery before querying
        tokio::task::yield_now().await;
        assert_eq!(handle.get(StatKind::RequestsSent, 0).await.unwrap(), 2);

        // land between ticks so the third one has been processed
        tokio::time::sleep(Duration::from_millis(3500)).await;
        let bin = handle.snapshot(0).await.unwrap();
        assert_eq!(bin.num_seconds, 3);

        assert!(matches!(
            handle.get(StatKind::RequestsSent, 5).await,
            Err(Error::BinUnavailable { bin: 5 })
        ));

        shutdown.cancel();
    }
}
