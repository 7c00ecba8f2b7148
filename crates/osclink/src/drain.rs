//! Drain pumps for the consumer-written rings and the IN send log.
//!
//! Each pump is a tokio task owning one [`RingDrain`]: it parks on a
//! doorbell with a bounded timeout (missed notifications cost at most one
//! timeout period), drains whatever is available, hands frames to the
//! registered subscribers, and publishes the new tail. Shutdown is a flag
//! flip plus a doorbell ring; the pump makes one final sweep before exiting
//! so nothing already published is lost.

use crate::error::LinkError;
use oscring::{FrameInfo, RingDrain};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// How long a pump parks before re-checking its ring regardless of the
/// doorbell.
pub const DRAIN_WAIT_TIMEOUT: Duration = Duration::from_millis(100);

type MessageCallback = Box<dyn Fn(&[u8]) + Send>;
type DebugCallback = Box<dyn Fn(&str) + Send>;
type SentCallback = Box<dyn Fn(&[u8], u32) + Send>;
type ErrorCallback = Box<dyn Fn(&LinkError) + Send>;

/// Registered observer callbacks, shared between producers and pumps.
#[derive(Default)]
pub struct Subscribers {
    on_message: Mutex<Vec<MessageCallback>>,
    on_debug: Mutex<Vec<DebugCallback>>,
    on_sent: Mutex<Vec<SentCallback>>,
    on_error: Mutex<Vec<ErrorCallback>>,
}

impl Subscribers {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to OUT frames.
    pub fn add_message(&self, callback: impl Fn(&[u8]) + Send + 'static) {
        self.on_message.lock().unwrap().push(Box::new(callback));
    }

    /// Subscribes to DEBUG text.
    pub fn add_debug(&self, callback: impl Fn(&str) + Send + 'static) {
        self.on_debug.lock().unwrap().push(Box::new(callback));
    }

    /// Subscribes to the IN send log: every frame any producer lands.
    pub fn add_sent(&self, callback: impl Fn(&[u8], u32) + Send + 'static) {
        self.on_sent.lock().unwrap().push(Box::new(callback));
    }

    /// Subscribes to structured error events.
    pub fn add_error(&self, callback: impl Fn(&LinkError) + Send + 'static) {
        self.on_error.lock().unwrap().push(Box::new(callback));
    }

    pub(crate) fn emit_message(&self, payload: &[u8]) {
        for callback in self.on_message.lock().unwrap().iter() {
            callback(payload);
        }
    }

    pub(crate) fn emit_debug(&self, text: &str) {
        for callback in self.on_debug.lock().unwrap().iter() {
            callback(text);
        }
    }

    pub(crate) fn emit_sent(&self, payload: &[u8], source_id: u32) {
        for callback in self.on_sent.lock().unwrap().iter() {
            callback(payload, source_id);
        }
    }

    pub(crate) fn emit_error(&self, error: &LinkError) {
        for callback in self.on_error.lock().unwrap().iter() {
            callback(error);
        }
    }
}

/// Runs one drain pump until `running` clears, then sweeps once more.
pub(crate) async fn run_pump(
    drain: RingDrain,
    doorbell: Arc<Notify>,
    running: Arc<AtomicBool>,
    mut deliver: impl FnMut(&[u8], FrameInfo),
) {
    while running.load(Ordering::Acquire) {
        if drain.is_idle() {
            let _ = tokio::time::timeout(DRAIN_WAIT_TIMEOUT, doorbell.notified()).await;
        }
        drain.drain(&mut deliver);
    }
    drain.drain(&mut deliver);
}
