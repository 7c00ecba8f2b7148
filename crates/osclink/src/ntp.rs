//! NTP time: the scheduler's clock domain.
//!
//! OSC timetags are NTP timestamps, seconds since 1 Jan 1900 as 32.32
//! fixed-point. The link works in f64 seconds throughout and anchors a
//! monotonic clock against the wall clock once at startup, so scheduling
//! never jumps with wall-clock adjustments.

use std::sync::Mutex;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
pub const NTP_UNIX_EPOCH_OFFSET: f64 = 2_208_988_800.0;

/// Converts a raw 32.32 timetag to NTP seconds.
#[inline]
pub fn timetag_seconds(raw: u64) -> f64 {
    let secs = (raw >> 32) as f64;
    let frac = (raw & 0xFFFF_FFFF) as f64 / 4_294_967_296.0;
    secs + frac
}

/// Converts NTP seconds to a raw 32.32 timetag.
#[inline]
pub fn timetag_from_seconds(seconds: f64) -> u64 {
    let secs = seconds.floor();
    let frac = ((seconds - secs) * 4_294_967_296.0) as u64;
    ((secs as u64) << 32) | (frac & 0xFFFF_FFFF)
}

/// Source of "now" in NTP seconds.
pub trait NtpClock: Send + Sync {
    /// Current NTP time.
    fn now_ntp(&self) -> f64;
}

/// Monotonic clock anchored to the wall clock at construction.
pub struct SystemClock {
    origin: Instant,
    origin_ntp: f64,
}

impl SystemClock {
    /// Anchors the clock now.
    pub fn new() -> Self {
        let unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self { origin: Instant::now(), origin_ntp: unix + NTP_UNIX_EPOCH_OFFSET }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl NtpClock for SystemClock {
    fn now_ntp(&self) -> f64 {
        self.origin_ntp + self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock for tests and deterministic demos.
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    /// Starts the clock at the given NTP time.
    pub fn new(start: f64) -> Self {
        Self { now: Mutex::new(start) }
    }

    /// Moves the clock forward.
    pub fn advance(&self, seconds: f64) {
        *self.now.lock().unwrap() += seconds;
    }

    /// Jumps the clock to an absolute time.
    pub fn set(&self, now: f64) {
        *self.now.lock().unwrap() = now;
    }
}

impl NtpClock for ManualClock {
    fn now_ntp(&self) -> f64 {
        *self.now.lock().unwrap()
    }
}
