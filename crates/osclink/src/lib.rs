//! osclink - Producer Link Layer for oscring
//!
//! Sits between OSC producers and the shared-memory transport in
//! [`oscring`]: classifies every submission against its NTP timetag, writes
//! the urgent ones straight to the IN ring, schedules far-future bundles on
//! a time-ordered heap with retry and cancellation, and pumps the OUT and
//! DEBUG rings back out to subscriber callbacks.
//!
//! # Routing
//!
//! Plain messages, immediate timetags (raw 0/1), late bundles and bundles
//! due within the producer's bypass lookahead all skip the scheduler; only
//! genuinely far-future bundles join the heap, where a 25ms poll loop
//! dispatches everything due within a 200ms window. Transient ring-full
//! failures park in a retry queue instead of surfacing as errors.
//!
//! # Example
//!
//! ```no_run
//! use osclink::{Link, LinkConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let link = Link::spawn(LinkConfig::default());
//!     let engine = link.engine().unwrap();
//!     let producer = link.register();
//!
//!     producer.send(b"/status\0").unwrap();
//!     engine.drain_in(|payload, info| {
//!         println!("frame {}: {} bytes", info.sequence, payload.len());
//!     });
//!
//!     link.shutdown().await;
//! }
//! ```

mod classify;
mod drain;
mod error;
mod event;
mod link;
mod ntp;
mod osc;
mod port;
mod producer;
mod report;
mod scheduler;

pub use classify::{classify, Classification};
pub use drain::{Subscribers, DRAIN_WAIT_TIMEOUT};
pub use error::LinkError;
pub use event::{CancelFilter, RetryItem, ScheduledEvent};
pub use link::{EngineHandle, Link, LinkConfig};
pub use ntp::{
    timetag_from_seconds, timetag_seconds, ManualClock, NtpClock, SystemClock,
    NTP_UNIX_EPOCH_OFFSET,
};
pub use osc::{
    bundle_elements, bundle_timetag, encode_bundle, is_bundle, BundleElements, BUNDLE_HEADER_LEN,
    BUNDLE_TAG,
};
pub use port::{ForwardInPort, ForwardRangeSource, InPort, SharedInPort};
pub use producer::{Producer, SendOutcome};
pub use report::MetricsReport;
pub use scheduler::{Command, SchedulerConfig, SchedulerCore, SchedulerHandle};
