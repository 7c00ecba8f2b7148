//! The IN-port seam: how a producer context reaches the IN ring.
//!
//! In the shared-memory mode every producer writes the ring directly through
//! [`SharedInPort`]. Where a context cannot share memory, [`ForwardInPort`]
//! speaks the same trait but ships payload bytes over a channel to a pump
//! task running in the consumer's context, which performs the actual ring
//! write. Counters degrade the same way: shared-mode ports hit the region's
//! atomic slots, forwarded ports accumulate plain-u64 deltas locally and
//! ship them with the traffic.
//!
//! End to end, a producer cannot tell the modes apart: framing, ordering and
//! the metrics schema are identical.

use oscring::RangeSource;
use oscring::{ctl, Counter, InWriter, LocalCounters, SharedRegion, WriteError, HEADER_LEN};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tracing::warn;

/// How long a forwarded metrics round-trip waits before giving up.
const SNAPSHOT_TIMEOUT: Duration = Duration::from_millis(100);

/// How often a forwarded port ships its local counter deltas.
const SHIP_INTERVAL: Duration = Duration::from_millis(250);

/// Write attempts the pump makes on behalf of a forwarded producer before
/// dropping the payload.
const FORWARD_WRITE_ATTEMPTS: u32 = 8;

/// Emergency node-ID base used if a forwarded claim cannot reach the pump.
/// IDs from here are unique within the producer only; the link is already
/// dead at that point.
const DETACHED_ID_BASE: u32 = 0x4000_0000;

/// A producer's path to the IN ring plus its counter sink.
pub trait InPort: Send + Sync {
    /// Appends one frame, returning its sequence number.
    fn try_write(&self, payload: &[u8], source_id: u32) -> Result<u32, WriteError>;

    /// Adds to a counter.
    fn bump(&self, counter: Counter, n: u32);

    /// Publishes a gauge value.
    fn gauge(&self, counter: Counter, value: u32);

    /// Raises a high-water slot.
    fn raise(&self, counter: Counter, value: u32);

    /// Snapshots the metrics slots, however far away they live.
    fn metrics_snapshot(&self) -> Vec<u32>;
}

/// Direct writes against the shared region.
pub struct SharedInPort {
    region: Arc<SharedRegion>,
    writer: InWriter,
    sent_doorbell: Arc<Notify>,
}

impl SharedInPort {
    /// Creates the port; `sent_doorbell` wakes the send-log observer after
    /// every successful write.
    pub fn new(region: Arc<SharedRegion>, sent_doorbell: Arc<Notify>) -> Self {
        Self { writer: InWriter::new(region.clone()), region, sent_doorbell }
    }

    /// The region behind this port.
    pub fn region(&self) -> &Arc<SharedRegion> {
        &self.region
    }
}

impl InPort for SharedInPort {
    fn try_write(&self, payload: &[u8], source_id: u32) -> Result<u32, WriteError> {
        let seq = self.writer.try_write(payload, source_id)?;
        self.region.metrics().incr(Counter::OscOutMessagesSent);
        self.sent_doorbell.notify_one();
        Ok(seq)
    }

    fn bump(&self, counter: Counter, n: u32) {
        self.region.metrics().add(counter, n);
    }

    fn gauge(&self, counter: Counter, value: u32) {
        self.region.metrics().set(counter, value);
    }

    fn raise(&self, counter: Counter, value: u32) {
        self.region.metrics().raise(counter, value);
    }

    fn metrics_snapshot(&self) -> Vec<u32> {
        self.region.metrics().snapshot()
    }
}

/// Messages a forwarded producer sends to the region owner's pump.
#[derive(Debug)]
pub enum Forward {
    /// Write this payload to IN on the producer's behalf.
    Write {
        /// Frame payload bytes.
        payload: Vec<u8>,
        /// Producer source id for the frame header.
        source_id: u32,
    },
    /// Fold these counter deltas into the region.
    Counters(LocalCounters),
    /// Store a gauge slot.
    Gauge {
        /// Slot to store.
        counter: Counter,
        /// Value to store.
        value: u32,
    },
    /// Raise a high-water slot.
    Raise {
        /// Slot to raise.
        counter: Counter,
        /// Candidate value.
        value: u32,
    },
    /// Reply with a metrics snapshot.
    Snapshot {
        /// Where to send the slots.
        reply: std_mpsc::Sender<Vec<u32>>,
    },
    /// Claim a node-ID range.
    ClaimRange {
        /// Range width.
        width: u32,
        /// Where to send the base.
        reply: std_mpsc::Sender<u32>,
    },
}

/// Channel-backed port for contexts without shared memory.
pub struct ForwardInPort {
    tx: mpsc::UnboundedSender<Forward>,
    counters: Mutex<LocalCounters>,
    last_ship: Mutex<Instant>,
    in_frame_limit: usize,
}

impl ForwardInPort {
    /// Creates the port; `in_frame_limit` is the IN ring's maximum aligned
    /// frame size, cached so oversize rejection stays local.
    pub fn new(tx: mpsc::UnboundedSender<Forward>, in_frame_limit: usize) -> Self {
        Self {
            tx,
            counters: Mutex::new(LocalCounters::new()),
            last_ship: Mutex::new(Instant::now()),
            in_frame_limit,
        }
    }

    fn ship_if_due(&self) {
        let mut last = self.last_ship.lock().unwrap();
        if last.elapsed() < SHIP_INTERVAL {
            return;
        }
        *last = Instant::now();
        drop(last);

        let taken = self.counters.lock().unwrap().take();
        if !taken.is_empty() {
            let _ = self.tx.send(Forward::Counters(taken));
        }
    }
}

impl InPort for ForwardInPort {
    fn try_write(&self, payload: &[u8], source_id: u32) -> Result<u32, WriteError> {
        let aligned = oscring::aligned_len(payload.len());
        if aligned > self.in_frame_limit {
            self.counters.lock().unwrap().incr(Counter::OversizeDropped);
            return Err(WriteError::Oversize {
                aligned: aligned as u32,
                limit: self.in_frame_limit as u32,
            });
        }

        self.tx
            .send(Forward::Write { payload: payload.to_vec(), source_id })
            .map_err(|_| WriteError::Detached)?;
        self.ship_if_due();

        // The pump assigns the real sequence when it lands the frame; from
        // this side the submission is the success event.
        Ok(0)
    }

    fn bump(&self, counter: Counter, n: u32) {
        self.counters.lock().unwrap().add(counter, n);
        self.ship_if_due();
    }

    fn gauge(&self, counter: Counter, value: u32) {
        let _ = self.tx.send(Forward::Gauge { counter, value });
    }

    fn raise(&self, counter: Counter, value: u32) {
        let _ = self.tx.send(Forward::Raise { counter, value });
    }

    fn metrics_snapshot(&self) -> Vec<u32> {
        let (reply, rx) = std_mpsc::channel();
        if self.tx.send(Forward::Snapshot { reply }).is_err() {
            return Vec::new();
        }
        rx.recv_timeout(SNAPSHOT_TIMEOUT).unwrap_or_default()
    }
}

/// Node-ID range claims that round-trip through the pump.
pub struct ForwardRangeSource {
    tx: mpsc::UnboundedSender<Forward>,
    detached_base: AtomicU32,
}

impl ForwardRangeSource {
    /// Creates the claim source.
    pub fn new(tx: mpsc::UnboundedSender<Forward>) -> Self {
        Self { tx, detached_base: AtomicU32::new(0) }
    }
}

impl RangeSource for ForwardRangeSource {
    fn claim(&self, width: u32) -> u32 {
        let (reply, rx) = std_mpsc::channel();
        if self.tx.send(Forward::ClaimRange { width, reply }).is_ok() {
            if let Ok(base) = rx.recv_timeout(SNAPSHOT_TIMEOUT) {
                return base;
            }
        }

        // The pump is gone. Keep handing out IDs so the producer does not
        // wedge, but from a base no live link ever reaches.
        if self.detached_base.load(Ordering::Acquire) == 0 {
            warn!("node-id claim pump unreachable; switching to detached id base");
            let _ = self.detached_base.compare_exchange(
                0,
                DETACHED_ID_BASE,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
        self.detached_base.fetch_add(width, Ordering::AcqRel)
    }
}

/// The region owner's pump: lands forwarded traffic on the shared region.
pub async fn run_forward_pump(
    region: Arc<SharedRegion>,
    shared: Arc<SharedInPort>,
    mut rx: mpsc::UnboundedReceiver<Forward>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            Forward::Write { payload, source_id } => {
                let mut landed = false;
                for _ in 0..FORWARD_WRITE_ATTEMPTS {
                    match shared.try_write(&payload, source_id) {
                        Ok(_) => {
                            landed = true;
                            break;
                        }
                        Err(e) if e.is_retryable() => tokio::task::yield_now().await,
                        Err(_) => break,
                    }
                }
                if !landed {
                    warn!(source_id, bytes = payload.len(), "forwarded write dropped");
                    region.metrics().incr(Counter::DroppedMessages);
                }
            }
            Forward::Counters(deltas) => deltas.apply_to(&region.metrics()),
            Forward::Gauge { counter, value } => region.metrics().set(counter, value),
            Forward::Raise { counter, value } => region.metrics().raise(counter, value),
            Forward::Snapshot { reply } => {
                let _ = reply.send(region.metrics().snapshot());
            }
            Forward::ClaimRange { width, reply } => {
                let base = region.control(ctl::NODE_ID_NEXT).fetch_add(width, Ordering::SeqCst);
                let _ = reply.send(base);
            }
        }
    }
}

/// The largest aligned frame an IN ring of `ring_len` bytes accepts.
#[inline]
pub fn in_frame_limit(ring_len: usize) -> usize {
    ring_len - HEADER_LEN
}
