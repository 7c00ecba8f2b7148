//! The timetag pre-scheduler.
//!
//! A single-owner min-heap of far-future bundles plus a retry queue for
//! transient IN-write failures. The async driver is a tokio task selecting
//! over a poll tick, a command channel and shutdown; the heap itself never
//! leaves the task. [`SchedulerCore`] is runnable without a runtime, which
//! is how the timing-sensitive tests drive it with a manual clock.
//!
//! Each poll cycle: retries first (so transient ring pressure clears before
//! new dispatches pile on), then every heap event due within the lookahead
//! window, then the depth gauges.

use crate::drain::Subscribers;
use crate::error::LinkError;
use crate::event::{CancelFilter, RetryItem, ScheduledEvent};
use crate::ntp::NtpClock;
use crate::port::InPort;
use oscring::Counter;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Dispatch cycle period.
    ///
    /// Default: 25ms
    pub poll_interval: Duration,

    /// Dispatch window in seconds: events due within `now + lookahead` are
    /// written this cycle.
    ///
    /// Default: 0.20
    pub lookahead: f64,

    /// Failed attempts after which a retried message is dropped.
    ///
    /// Default: 5
    pub max_retries_per_message: u32,

    /// Cap on heap + retry depth; submissions beyond it are rejected.
    ///
    /// Default: 65536
    pub max_pending_messages: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(25),
            lookahead: 0.20,
            max_retries_per_message: 5,
            max_pending_messages: 65_536,
        }
    }
}

impl SchedulerConfig {
    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the dispatch lookahead in seconds.
    pub fn with_lookahead(mut self, seconds: f64) -> Self {
        self.lookahead = seconds;
        self
    }

    /// Sets the retry attempt cap.
    pub fn with_max_retries(mut self, attempts: u32) -> Self {
        self.max_retries_per_message = attempts;
        self
    }

    /// Sets the pending cap.
    pub fn with_max_pending(mut self, cap: usize) -> Self {
        self.max_pending_messages = cap;
        self
    }
}

/// Commands producers send to the scheduler task.
#[derive(Debug)]
pub enum Command {
    /// Insert a far-future event into the heap.
    Schedule(ScheduledEvent),
    /// Park a payload whose bypass write failed transiently.
    QueueRetry {
        /// Frame payload.
        payload: Vec<u8>,
        /// Origin, carried into the drop report.
        context: String,
        /// Originating producer.
        source_id: u32,
    },
    /// Remove matching heap events.
    Cancel(CancelFilter),
    /// Stop the task.
    Shutdown,
}

/// Cloneable producer-side handle.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Command>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    port: Arc<dyn InPort>,
}

impl SchedulerHandle {
    /// Submits a far-future event, enforcing the pending cap.
    pub fn schedule(&self, event: ScheduledEvent) -> Result<(), LinkError> {
        let pending = self.pending.load(Ordering::Acquire);
        if pending >= self.max_pending {
            self.port.bump(Counter::BackpressureRejected, 1);
            return Err(LinkError::Backpressure { pending, cap: self.max_pending });
        }

        self.pending.fetch_add(1, Ordering::AcqRel);
        self.tx.send(Command::Schedule(event)).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            LinkError::SchedulerDown
        })
    }

    /// Parks a payload for retry on the next poll cycle.
    pub fn queue_retry(
        &self,
        payload: Vec<u8>,
        context: String,
        source_id: u32,
    ) -> Result<(), LinkError> {
        self.port.bump(Counter::RetriesRequested, 1);
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.tx.send(Command::QueueRetry { payload, context, source_id }).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            LinkError::SchedulerDown
        })
    }

    /// Removes matching heap events.
    pub fn cancel(&self, filter: CancelFilter) -> Result<(), LinkError> {
        self.tx.send(Command::Cancel(filter)).map_err(|_| LinkError::SchedulerDown)
    }

    /// Asks the task to stop. Pending events are discarded.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }

    /// Combined heap + retry depth, as of the last sync.
    pub fn pending_len(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// The single-owner scheduler state.
pub struct SchedulerCore {
    heap: BinaryHeap<Reverse<ScheduledEvent>>,
    retry: Vec<RetryItem>,
    next_seq: u64,
    cfg: SchedulerConfig,
    port: Arc<dyn InPort>,
    pending: Arc<AtomicUsize>,
    subscribers: Arc<Subscribers>,
}

impl SchedulerCore {
    /// Creates an empty core.
    pub fn new(
        cfg: SchedulerConfig,
        port: Arc<dyn InPort>,
        pending: Arc<AtomicUsize>,
        subscribers: Arc<Subscribers>,
    ) -> Self {
        Self {
            heap: BinaryHeap::new(),
            retry: Vec::new(),
            next_seq: 0,
            cfg,
            port,
            pending,
            subscribers,
        }
    }

    /// Heap depth.
    pub fn heap_len(&self) -> usize {
        self.heap.len()
    }

    /// Retry-queue depth.
    pub fn retry_len(&self) -> usize {
        self.retry.len()
    }

    /// Inserts an event, assigning its FIFO tie-break.
    pub fn insert(&mut self, mut event: ScheduledEvent) {
        event.seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(event));
        self.sync_depth();
    }

    /// Parks a payload in the retry queue.
    pub fn queue_retry(&mut self, payload: Vec<u8>, context: String, source_id: u32, now: f64) {
        self.retry.push(RetryItem { payload, attempts: 0, context, queued_at: now, source_id });
        self.sync_depth();
    }

    /// Removes matching heap events, returning how many were removed. The
    /// retry queue is untouched by design.
    pub fn cancel(&mut self, filter: &CancelFilter) -> usize {
        let before = self.heap.len();
        self.heap.retain(|Reverse(event)| !filter.matches(event));
        let removed = before - self.heap.len();
        if removed > 0 {
            self.port.bump(Counter::EventsCancelled, removed as u32);
        }
        self.sync_depth();
        removed
    }

    /// One dispatch cycle at the given NTP time.
    pub fn run_cycle(&mut self, now: f64) {
        self.drain_retries();

        let deadline = now + self.cfg.lookahead;
        loop {
            let due = matches!(self.heap.peek(), Some(Reverse(event)) if event.ntp_time <= deadline);
            if !due {
                break;
            }
            let Some(Reverse(event)) = self.heap.pop() else { break };
            self.dispatch(event, now);
        }

        self.sync_depth();
    }

    fn dispatch(&mut self, event: ScheduledEvent, now: f64) {
        match self.port.try_write(&event.payload, event.source_id) {
            Ok(_) => {
                self.port.bump(Counter::TotalDispatches, 1);
            }
            Err(e) if e.is_retryable() => {
                let context = format!(
                    "scheduled bundle at ntp {:.6} (session {}, tag {:?}): {e}",
                    event.ntp_time, event.session_id, event.run_tag
                );
                self.port.bump(Counter::RetriesRequested, 1);
                self.retry.push(RetryItem {
                    payload: event.payload,
                    attempts: 0,
                    context,
                    queued_at: now,
                    source_id: event.source_id,
                });
            }
            Err(e) => {
                warn!(error = %e, ntp_time = event.ntp_time, "scheduled dispatch dropped");
                self.subscribers.emit_error(&LinkError::Write(e));
            }
        }
    }

    fn drain_retries(&mut self) {
        let mut i = 0;
        while i < self.retry.len() {
            match self.port.try_write(&self.retry[i].payload, self.retry[i].source_id) {
                Ok(_) => {
                    self.port.bump(Counter::RetriesSucceeded, 1);
                    self.retry.remove(i);
                }
                Err(e) if e.is_retryable() => {
                    self.retry[i].attempts += 1;
                    if self.retry[i].attempts >= self.cfg.max_retries_per_message {
                        let item = self.retry.remove(i);
                        warn!(
                            attempts = item.attempts,
                            context = %item.context,
                            "retry budget exhausted; message dropped"
                        );
                        self.port.bump(Counter::RetriesExhausted, 1);
                        self.subscribers.emit_error(&LinkError::RetriesExhausted {
                            attempts: item.attempts,
                            context: item.context,
                        });
                    } else {
                        i += 1;
                    }
                }
                Err(e) => {
                    let item = self.retry.remove(i);
                    warn!(error = %e, context = %item.context, "retried message dropped");
                    self.subscribers.emit_error(&LinkError::Write(e));
                }
            }
        }
    }

    fn sync_depth(&self) {
        let heap = self.heap.len();
        let retry = self.retry.len();
        self.pending.store(heap + retry, Ordering::Release);
        self.port.gauge(Counter::PendingDepth, heap as u32);
        self.port.raise(Counter::PendingDepthPeak, heap as u32);
        self.port.gauge(Counter::RetryDepth, retry as u32);
        self.port.raise(Counter::RetryDepthPeak, retry as u32);
    }
}

/// Spawns the scheduler task. Must run inside a tokio runtime.
pub fn spawn(
    cfg: SchedulerConfig,
    port: Arc<dyn InPort>,
    clock: Arc<dyn NtpClock>,
    subscribers: Arc<Subscribers>,
) -> (SchedulerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));
    let core = SchedulerCore::new(cfg.clone(), port.clone(), pending.clone(), subscribers);
    let handle = SchedulerHandle { tx, pending, max_pending: cfg.max_pending_messages, port };
    let task = tokio::spawn(run(core, rx, clock, cfg.poll_interval));
    (handle, task)
}

async fn run(
    mut core: SchedulerCore,
    mut rx: mpsc::UnboundedReceiver<Command>,
    clock: Arc<dyn NtpClock>,
    poll_interval: Duration,
) {
    let mut tick = tokio::time::interval(poll_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tick.tick() => core.run_cycle(clock.now_ntp()),
            command = rx.recv() => match command {
                Some(Command::Schedule(event)) => core.insert(event),
                Some(Command::QueueRetry { payload, context, source_id }) => {
                    core.queue_retry(payload, context, source_id, clock.now_ntp());
                }
                Some(Command::Cancel(filter)) => {
                    core.cancel(&filter);
                }
                Some(Command::Shutdown) | None => break,
            },
        }
    }

    debug!(
        heap = core.heap_len(),
        retry = core.retry_len(),
        "scheduler stopped; pending events discarded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::SharedInPort;
    use oscring::{EngineEndpoint, LayoutConfig, SharedRegion};
    use tokio::sync::Notify;

    fn core_over_region(
        cfg: SchedulerConfig,
        layout: LayoutConfig,
    ) -> (SchedulerCore, Arc<SharedRegion>) {
        let region = Arc::new(SharedRegion::new(layout));
        let port: Arc<dyn InPort> =
            Arc::new(SharedInPort::new(region.clone(), Arc::new(Notify::new())));
        let core = SchedulerCore::new(
            cfg,
            port,
            Arc::new(AtomicUsize::new(0)),
            Arc::new(Subscribers::new()),
        );
        (core, region)
    }

    fn event_at(ntp_time: f64, tag: &str) -> ScheduledEvent {
        ScheduledEvent {
            ntp_time,
            seq: 0,
            session_id: 1,
            run_tag: tag.to_owned(),
            payload: b"/scheduled\0\0".to_vec(),
            source_id: 0,
        }
    }

    const NOW: f64 = 3_950_000_000.0;

    #[test]
    fn events_within_lookahead_dispatch() {
        let (mut core, region) = core_over_region(SchedulerConfig::default(), LayoutConfig::default());

        core.insert(event_at(NOW + 0.1, "a")); // inside the 0.20 window
        core.insert(event_at(NOW + 5.0, "b")); // far out

        core.run_cycle(NOW);
        assert_eq!(core.heap_len(), 1);
        assert_eq!(region.metrics().get(Counter::TotalDispatches), 1);

        // The far event dispatches once its window arrives.
        core.run_cycle(NOW + 4.9);
        assert_eq!(core.heap_len(), 0);
        assert_eq!(region.metrics().get(Counter::TotalDispatches), 2);
    }

    #[test]
    fn same_timetag_dispatches_in_fifo_order() {
        let (mut core, region) = core_over_region(SchedulerConfig::default(), LayoutConfig::default());
        let engine = EngineEndpoint::new(region.clone());

        for i in 0..4u8 {
            let mut e = event_at(NOW + 0.05, "t");
            e.payload = vec![i; 4];
            core.insert(e);
        }
        core.run_cycle(NOW);

        let mut seen = Vec::new();
        engine.drain_in(|p, _| seen.push(p[0]));
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn full_ring_requeues_then_succeeds() {
        // A tiny IN ring that a few events overflow.
        let (mut core, region) =
            core_over_region(SchedulerConfig::default(), LayoutConfig::new(64, 64, 64, 4));
        let engine = EngineEndpoint::new(region.clone());

        for _ in 0..3 {
            core.insert(event_at(NOW, "t"));
        }
        core.run_cycle(NOW);

        // Ring holds one 28-byte frame comfortably, not three.
        assert!(core.retry_len() > 0);
        let requeued = core.retry_len();
        assert_eq!(region.metrics().get(Counter::RetriesRequested), requeued as u32);

        // Drain and poll again: retries land.
        engine.drain_in(|_, _| {});
        core.run_cycle(NOW + 0.025);
        engine.drain_in(|_, _| {});
        core.run_cycle(NOW + 0.05);

        assert_eq!(core.retry_len(), 0);
        assert_eq!(region.metrics().get(Counter::RetriesSucceeded), requeued as u32);
    }

    #[test]
    fn retry_budget_exhaustion_drops_with_error() {
        let cfg = SchedulerConfig::default().with_max_retries(3);
        let (mut core, region) = core_over_region(cfg, LayoutConfig::new(64, 64, 64, 4));

        // Wedge the ring: fill it and never drain.
        core.queue_retry(vec![0u8; 24], "wedged test message".to_owned(), 0, NOW);
        core.queue_retry(vec![1u8; 24], "wedged test message".to_owned(), 0, NOW);

        for cycle in 0..4 {
            core.run_cycle(NOW + f64::from(cycle) * 0.025);
        }

        // The first item landed (it fit), the second exhausted its budget.
        assert_eq!(core.retry_len(), 0);
        assert_eq!(region.metrics().get(Counter::RetriesExhausted), 1);
    }

    #[test]
    fn cancel_tag_leaves_retry_queue_untouched() {
        let (mut core, region) = core_over_region(SchedulerConfig::default(), LayoutConfig::default());

        core.insert(event_at(NOW + 1.0, "doomed"));
        core.insert(event_at(NOW + 1.0, "kept"));
        core.queue_retry(b"/r\0\0".to_vec(), "bypass".to_owned(), 0, NOW);

        let removed = core.cancel(&CancelFilter::Tag("doomed".to_owned()));
        assert_eq!(removed, 1);
        assert_eq!(core.heap_len(), 1);
        assert_eq!(core.retry_len(), 1);
        assert_eq!(region.metrics().get(Counter::EventsCancelled), 1);
    }

    #[test]
    fn cancelled_event_never_dispatches() {
        let (mut core, region) = core_over_region(SchedulerConfig::default(), LayoutConfig::default());

        core.insert(event_at(NOW + 1.0, "run-x"));
        core.run_cycle(NOW + 0.5);
        core.cancel(&CancelFilter::Tag("run-x".to_owned()));
        core.run_cycle(NOW + 1.2);

        assert_eq!(core.heap_len(), 0);
        assert_eq!(region.metrics().get(Counter::EventsCancelled), 1);
        assert_eq!(region.metrics().get(Counter::TotalDispatches), 0);
    }

    #[test]
    fn cancel_then_reenqueue_counts_only_the_second_batch() {
        let (mut core, region) = core_over_region(SchedulerConfig::default(), LayoutConfig::default());

        for _ in 0..3 {
            core.insert(event_at(NOW + 1.0, "take-1"));
        }
        core.cancel(&CancelFilter::Tag("take-1".to_owned()));

        for _ in 0..2 {
            core.insert(event_at(NOW + 1.0, "take-2"));
        }
        core.run_cycle(NOW + 1.0);

        assert_eq!(region.metrics().get(Counter::TotalDispatches), 2);
        assert_eq!(region.metrics().get(Counter::EventsCancelled), 3);
    }

    #[test]
    fn cancel_variants_filter_as_documented() {
        let (mut core, _region) = core_over_region(SchedulerConfig::default(), LayoutConfig::default());

        let mut e1 = event_at(NOW + 1.0, "a");
        e1.session_id = 1;
        let mut e2 = event_at(NOW + 1.0, "a");
        e2.session_id = 2;
        let mut e3 = event_at(NOW + 1.0, "b");
        e3.session_id = 1;
        core.insert(e1);
        core.insert(e2);
        core.insert(e3);

        assert_eq!(
            core.cancel(&CancelFilter::SessionTag { session_id: 1, run_tag: "a".to_owned() }),
            1
        );
        assert_eq!(core.cancel(&CancelFilter::Session(2)), 1);
        assert_eq!(core.cancel(&CancelFilter::All), 1);
        assert_eq!(core.heap_len(), 0);
    }

    #[test]
    fn depth_gauges_track_heap_and_retry() {
        let (mut core, region) = core_over_region(SchedulerConfig::default(), LayoutConfig::default());

        for _ in 0..5 {
            core.insert(event_at(NOW + 10.0, "t"));
        }
        core.queue_retry(b"/r\0\0".to_vec(), "bypass".to_owned(), 0, NOW);

        let m = region.metrics();
        assert_eq!(m.get(Counter::PendingDepth), 5);
        assert_eq!(m.get(Counter::RetryDepth), 1);
        assert_eq!(m.get(Counter::PendingDepthPeak), 5);

        core.cancel(&CancelFilter::All);
        assert_eq!(m.get(Counter::PendingDepth), 0);
        assert_eq!(m.get(Counter::PendingDepthPeak), 5);
    }

    #[tokio::test]
    async fn task_driver_dispatches_on_the_poll_tick() {
        use crate::ntp::{ManualClock, NtpClock};

        let region = Arc::new(SharedRegion::new(LayoutConfig::default()));
        let port: Arc<dyn InPort> =
            Arc::new(SharedInPort::new(region.clone(), Arc::new(Notify::new())));
        let clock = Arc::new(ManualClock::new(NOW));
        let cfg = SchedulerConfig::default().with_poll_interval(Duration::from_millis(5));

        let (handle, task) =
            spawn(cfg, port, clock.clone() as Arc<dyn NtpClock>, Arc::new(Subscribers::new()));

        handle.schedule(event_at(NOW + 0.1, "t")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(region.metrics().get(Counter::TotalDispatches), 1);
        assert_eq!(handle.pending_len(), 0);

        handle.shutdown();
        task.await.unwrap();
    }
}
