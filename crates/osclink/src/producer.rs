//! The per-producer front end.
//!
//! A [`Producer`] is a thin facade over one IN port, the scheduler handle
//! and a private node-ID allocator. `send` classifies every payload and
//! routes it: everything except far-future bundles bypasses the scheduler
//! and goes straight to the ring; far-future bundles join the heap tagged
//! with the producer's current session/run context so they can be cancelled
//! later. Transient write failures are never surfaced as errors; they park
//! in the scheduler's retry queue.
//!
//! Producers are handed out by [`Link`](crate::Link) and are deliberately
//! not `Clone`: one producer, one thread, per-stream FIFO for free.

use crate::classify::classify;
use crate::drain::Subscribers;
use crate::error::LinkError;
use crate::event::{CancelFilter, ScheduledEvent};
use crate::ntp::{timetag_seconds, NtpClock};
use crate::osc::{bundle_elements, bundle_timetag, is_bundle};
use crate::port::InPort;
use crate::scheduler::SchedulerHandle;
use oscring::{Counter, NodeIdAllocator};
use std::cell::{Cell, RefCell};
use std::sync::Arc;
use tracing::warn;

/// What happened to a submitted payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Landed on IN with this sequence number.
    Written {
        /// The frame's sequence.
        sequence: u32,
    },
    /// Accepted into the scheduler heap.
    Scheduled,
    /// Parked in the retry queue after a transient ring failure.
    QueuedForRetry,
}

/// Producer-side handle onto the link.
pub struct Producer {
    source_id: u32,
    port: Arc<dyn InPort>,
    scheduler: SchedulerHandle,
    clock: Arc<dyn NtpClock>,
    allocator: NodeIdAllocator,
    bypass_lookahead: f64,
    session_id: Cell<u32>,
    run_tag: RefCell<String>,
    subscribers: Arc<Subscribers>,
}

impl Producer {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        source_id: u32,
        port: Arc<dyn InPort>,
        scheduler: SchedulerHandle,
        clock: Arc<dyn NtpClock>,
        allocator: NodeIdAllocator,
        bypass_lookahead: f64,
        subscribers: Arc<Subscribers>,
    ) -> Self {
        Self {
            source_id,
            port,
            scheduler,
            clock,
            allocator,
            bypass_lookahead,
            session_id: Cell::new(0),
            run_tag: RefCell::new(String::new()),
            subscribers,
        }
    }

    /// This producer's source id (0 for the primary).
    #[inline]
    pub fn source_id(&self) -> u32 {
        self.source_id
    }

    /// The bypass lookahead this producer classifies against, in seconds.
    #[inline]
    pub fn bypass_lookahead(&self) -> f64 {
        self.bypass_lookahead
    }

    /// Labels attached to subsequently scheduled bundles, for cancellation.
    pub fn set_run_context(&self, session_id: u32, run_tag: &str) {
        self.session_id.set(session_id);
        *self.run_tag.borrow_mut() = run_tag.to_owned();
    }

    /// Submits one payload, classifying and routing it.
    pub fn send(&self, payload: &[u8]) -> Result<SendOutcome, LinkError> {
        let now = self.clock.now_ntp();
        let class = classify(payload, now, self.bypass_lookahead);

        if let Some(counter) = class.bypass_counter() {
            self.port.bump(counter, 1);
            self.port.bump(Counter::PreschedulerBypassed, 1);
            return self.write_or_queue(payload, format!("{class:?} bypass"));
        }

        let raw = bundle_timetag(payload).unwrap_or(0);
        debug_assert!(raw > 1, "far-future classification without a real timetag");
        let event = ScheduledEvent {
            ntp_time: timetag_seconds(raw),
            seq: 0,
            session_id: self.session_id.get(),
            run_tag: self.run_tag.borrow().clone(),
            payload: payload.to_vec(),
            source_id: self.source_id,
        };
        self.scheduler.schedule(event)?;
        self.port.bump(Counter::BundlesScheduled, 1);
        Ok(SendOutcome::Scheduled)
    }

    /// Writes a payload straight to IN, splitting bundles into their
    /// elements. Returns the number of frames written or queued.
    pub fn send_immediate(&self, payload: &[u8]) -> Result<usize, LinkError> {
        if !is_bundle(payload) {
            self.write_or_queue(payload, "immediate message".to_owned())?;
            return Ok(1);
        }

        let mut frames = 0;
        for element in bundle_elements(payload) {
            self.write_or_queue(element, "immediate bundle element".to_owned())?;
            frames += 1;
        }
        Ok(frames)
    }

    fn write_or_queue(&self, payload: &[u8], context: String) -> Result<SendOutcome, LinkError> {
        match self.port.try_write(payload, self.source_id) {
            Ok(sequence) => Ok(SendOutcome::Written { sequence }),
            Err(e) if e.is_retryable() => {
                self.scheduler.queue_retry(
                    payload.to_vec(),
                    format!("{context} ({e})"),
                    self.source_id,
                )?;
                Ok(SendOutcome::QueuedForRetry)
            }
            Err(e) => {
                warn!(error = %e, bytes = payload.len(), "payload dropped");
                let error = LinkError::Write(e);
                self.subscribers.emit_error(&error);
                Err(error)
            }
        }
    }

    /// Returns the next node ID from this producer's claimed range.
    #[inline]
    pub fn next_node_id(&self) -> u32 {
        self.allocator.next_id()
    }

    /// Cancels scheduled bundles matching both labels.
    pub fn cancel_session_tag(&self, session_id: u32, run_tag: &str) -> Result<(), LinkError> {
        self.scheduler
            .cancel(CancelFilter::SessionTag { session_id, run_tag: run_tag.to_owned() })
    }

    /// Cancels scheduled bundles for a session.
    pub fn cancel_session(&self, session_id: u32) -> Result<(), LinkError> {
        self.scheduler.cancel(CancelFilter::Session(session_id))
    }

    /// Cancels scheduled bundles for a run tag.
    pub fn cancel_tag(&self, run_tag: &str) -> Result<(), LinkError> {
        self.scheduler.cancel(CancelFilter::Tag(run_tag.to_owned()))
    }

    /// Cancels every scheduled bundle.
    pub fn cancel_all(&self) -> Result<(), LinkError> {
        self.scheduler.cancel(CancelFilter::All)
    }

    /// Snapshots the metrics slots, wherever they live.
    pub fn metrics_array(&self) -> Vec<u32> {
        self.port.metrics_snapshot()
    }

    /// Subscribes to OSC replies drained from OUT.
    pub fn on_message(&self, callback: impl Fn(&[u8]) + Send + 'static) {
        self.subscribers.add_message(callback);
    }

    /// Subscribes to DEBUG text.
    pub fn on_debug(&self, callback: impl Fn(&str) + Send + 'static) {
        self.subscribers.add_debug(callback);
    }

    /// Subscribes to the send log: every frame landed on IN, with its
    /// source id.
    pub fn on_message_sent(&self, callback: impl Fn(&[u8], u32) + Send + 'static) {
        self.subscribers.add_sent(callback);
    }

    /// Subscribes to structured error events.
    pub fn on_error(&self, callback: impl Fn(&LinkError) + Send + 'static) {
        self.subscribers.add_error(callback);
    }
}

// Producer intentionally does not implement Clone: one handle per thread
// keeps each source's stream FIFO without further coordination.
