//! Top-level assembly: one region, one scheduler, the drain pumps, and the
//! handles producers and the audio consumer actually hold.

use crate::drain::{run_pump, Subscribers};
use crate::error::LinkError;
use crate::ntp::{NtpClock, SystemClock};
use crate::port::{
    in_frame_limit, run_forward_pump, ForwardInPort, ForwardRangeSource, InPort, SharedInPort,
};
use crate::producer::Producer;
use crate::report::MetricsReport;
use crate::scheduler::{self, SchedulerConfig, SchedulerHandle};
use oscring::{
    EngineEndpoint, FrameInfo, LayoutConfig, NodeEntry, NodeIdAllocator, RingDrain, RingKind,
    SharedRangeSource, SharedRegion, WriteError, RANGE_LOCAL, RANGE_REMOTE,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

/// Link-wide configuration.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Shared-region sizing.
    pub layout: LayoutConfig,
    /// Scheduler tuning.
    pub scheduler: SchedulerConfig,
    /// Default bypass lookahead for registered producers, in seconds.
    pub bypass_lookahead: f64,
    /// Per-pass frame cap for the OUT drain (small: OSC replies).
    pub out_drain_frames: usize,
    /// Per-pass frame cap for the DEBUG drain (larger: text bursts).
    pub debug_drain_frames: usize,
    /// Per-pass frame cap for the send-log observer.
    pub sent_drain_frames: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            layout: LayoutConfig::default(),
            scheduler: SchedulerConfig::default(),
            bypass_lookahead: 0.20,
            out_drain_frames: 32,
            debug_drain_frames: 128,
            sent_drain_frames: 64,
        }
    }
}

/// The audio consumer's handle: the engine endpoint plus the doorbells that
/// wake the drains it feeds.
pub struct EngineHandle {
    endpoint: EngineEndpoint,
    out_doorbell: Arc<Notify>,
    debug_doorbell: Arc<Notify>,
}

impl EngineHandle {
    /// Drains up to one block of IN frames. Called from the audio callback.
    pub fn drain_in(&self, handler: impl FnMut(&[u8], FrameInfo)) -> usize {
        self.endpoint.drain_in(handler)
    }

    /// Publishes an OSC reply and wakes the OUT drain.
    pub fn reply(&self, payload: &[u8]) -> Result<u32, WriteError> {
        let seq = self.endpoint.reply(payload)?;
        self.out_doorbell.notify_one();
        Ok(seq)
    }

    /// Publishes debug text and wakes the DEBUG drain.
    pub fn debug_text(&self, text: &str) -> Result<u32, WriteError> {
        let seq = self.endpoint.debug_text(text)?;
        self.debug_doorbell.notify_one();
        Ok(seq)
    }

    /// Publishes a new node forest.
    pub fn publish_node_tree(&self, entries: &[NodeEntry]) {
        self.endpoint.node_tree().publish(entries);
    }

    /// The raw endpoint, for direct metrics or node-tree access.
    pub fn endpoint(&self) -> &EngineEndpoint {
        &self.endpoint
    }
}

/// One attached transport: region, scheduler and drains, ready to hand out
/// producer and engine handles.
pub struct Link {
    region: Arc<SharedRegion>,
    port: Arc<SharedInPort>,
    scheduler: SchedulerHandle,
    subscribers: Arc<Subscribers>,
    clock: Arc<dyn NtpClock>,
    running: Arc<AtomicBool>,
    out_doorbell: Arc<Notify>,
    debug_doorbell: Arc<Notify>,
    sent_doorbell: Arc<Notify>,
    engine: Mutex<Option<EngineEndpoint>>,
    next_source: AtomicU32,
    cfg: LinkConfig,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    forward_pumps: Mutex<Vec<JoinHandle<()>>>,
}

impl Link {
    /// Builds the region and spawns the scheduler and drain tasks. Must be
    /// called within a tokio runtime.
    pub fn spawn(cfg: LinkConfig) -> Self {
        Self::spawn_with_clock(cfg, Arc::new(SystemClock::new()))
    }

    /// Like [`Link::spawn`], with an injected clock for deterministic tests.
    pub fn spawn_with_clock(cfg: LinkConfig, clock: Arc<dyn NtpClock>) -> Self {
        let region = Arc::new(SharedRegion::new(cfg.layout));
        let sent_doorbell = Arc::new(Notify::new());
        let port = Arc::new(SharedInPort::new(region.clone(), sent_doorbell.clone()));
        let subscribers = Arc::new(Subscribers::new());
        let running = Arc::new(AtomicBool::new(true));
        let out_doorbell = Arc::new(Notify::new());
        let debug_doorbell = Arc::new(Notify::new());

        let (scheduler, scheduler_task) = scheduler::spawn(
            cfg.scheduler.clone(),
            port.clone() as Arc<dyn InPort>,
            clock.clone(),
            subscribers.clone(),
        );

        let engine = EngineEndpoint::new(region.clone());

        let mut tasks = vec![scheduler_task];
        {
            let subs = subscribers.clone();
            tasks.push(tokio::spawn(run_pump(
                RingDrain::new(region.clone(), RingKind::Out, cfg.out_drain_frames),
                out_doorbell.clone(),
                running.clone(),
                move |payload, _| subs.emit_message(payload),
            )));
        }
        {
            let subs = subscribers.clone();
            tasks.push(tokio::spawn(run_pump(
                RingDrain::new(region.clone(), RingKind::Debug, cfg.debug_drain_frames),
                debug_doorbell.clone(),
                running.clone(),
                move |payload, _| subs.emit_debug(&String::from_utf8_lossy(payload)),
            )));
        }
        {
            let subs = subscribers.clone();
            tasks.push(tokio::spawn(run_pump(
                RingDrain::log_observer(region.clone(), cfg.sent_drain_frames),
                sent_doorbell.clone(),
                running.clone(),
                move |payload, info| subs.emit_sent(payload, info.source),
            )));
        }

        Self {
            region,
            port,
            scheduler,
            subscribers,
            clock,
            running,
            out_doorbell,
            debug_doorbell,
            sent_doorbell,
            engine: Mutex::new(Some(engine)),
            next_source: AtomicU32::new(0),
            cfg,
            tasks: Mutex::new(tasks),
            forward_pumps: Mutex::new(Vec::new()),
        }
    }

    /// The shared region behind this link.
    pub fn region(&self) -> &Arc<SharedRegion> {
        &self.region
    }

    /// Takes the audio consumer's handle. There is exactly one.
    pub fn engine(&self) -> Result<EngineHandle, LinkError> {
        let endpoint = self.engine.lock().unwrap().take().ok_or(LinkError::EngineTaken)?;
        Ok(EngineHandle {
            endpoint,
            out_doorbell: self.out_doorbell.clone(),
            debug_doorbell: self.debug_doorbell.clone(),
        })
    }

    /// Registers a shared-memory producer with the link's default bypass
    /// lookahead.
    pub fn register(&self) -> Producer {
        self.register_with_lookahead(self.cfg.bypass_lookahead)
    }

    /// Registers a shared-memory producer with its own bypass lookahead.
    pub fn register_with_lookahead(&self, bypass_lookahead: f64) -> Producer {
        let source_id = self.next_source.fetch_add(1, Ordering::SeqCst);
        let allocator = NodeIdAllocator::new(
            Arc::new(SharedRangeSource::new(self.region.clone())),
            RANGE_LOCAL,
        );
        Producer::new(
            source_id,
            self.port.clone() as Arc<dyn InPort>,
            self.scheduler.clone(),
            self.clock.clone(),
            allocator,
            bypass_lookahead,
            self.subscribers.clone(),
        )
    }

    /// Registers a producer for a context without shared memory: its writes,
    /// counters and node-ID claims travel over a channel to a pump task in
    /// the consumer's context.
    pub fn register_forwarded(&self) -> Producer {
        let source_id = self.next_source.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();

        let pump = tokio::spawn(run_forward_pump(self.region.clone(), self.port.clone(), rx));
        self.forward_pumps.lock().unwrap().push(pump);

        let limit = in_frame_limit(self.region.layout().in_ring.len);
        let forward = Arc::new(ForwardInPort::new(tx.clone(), limit));
        let allocator =
            NodeIdAllocator::new(Arc::new(ForwardRangeSource::new(tx)), RANGE_REMOTE);

        Producer::new(
            source_id,
            forward as Arc<dyn InPort>,
            self.scheduler.clone(),
            self.clock.clone(),
            allocator,
            self.cfg.bypass_lookahead,
            self.subscribers.clone(),
        )
    }

    /// Subscribes to OSC replies drained from OUT.
    pub fn on_message(&self, callback: impl Fn(&[u8]) + Send + 'static) {
        self.subscribers.add_message(callback);
    }

    /// Subscribes to DEBUG text.
    pub fn on_debug(&self, callback: impl Fn(&str) + Send + 'static) {
        self.subscribers.add_debug(callback);
    }

    /// Subscribes to the send log.
    pub fn on_message_sent(&self, callback: impl Fn(&[u8], u32) + Send + 'static) {
        self.subscribers.add_sent(callback);
    }

    /// Subscribes to structured error events.
    pub fn on_error(&self, callback: impl Fn(&LinkError) + Send + 'static) {
        self.subscribers.add_error(callback);
    }

    /// Raw metrics slots.
    pub fn metrics_array(&self) -> Vec<u32> {
        self.region.metrics().snapshot()
    }

    /// Named metrics report.
    pub fn report(&self) -> MetricsReport {
        MetricsReport::from_snapshot(&self.metrics_array())
    }

    /// Stops the scheduler and drains, then resets the control block.
    /// In-flight IN frames are discarded, not flushed.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown();
        self.running.store(false, Ordering::Release);
        self.out_doorbell.notify_waiters();
        self.debug_doorbell.notify_waiters();
        self.sent_doorbell.notify_waiters();

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().unwrap());
        for task in tasks {
            let _ = task.await;
        }

        // Forward pumps only exit when their producers drop; teardown does
        // not flush, so cut them off.
        let pumps: Vec<JoinHandle<()>> = std::mem::take(&mut *self.forward_pumps.lock().unwrap());
        for pump in pumps {
            pump.abort();
        }

        self.region.reset();
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        // Best effort: stop the tasks even when shutdown() was skipped.
        self.scheduler.shutdown();
        self.running.store(false, Ordering::Release);
        self.out_doorbell.notify_waiters();
        self.debug_doorbell.notify_waiters();
        self.sent_doorbell.notify_waiters();
    }
}
