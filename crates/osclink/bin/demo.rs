//! Demo: a fake audio consumer, two producers and the full link between
//! them. Prints the metrics report as JSON at the end.
//!
//! Run with `cargo run -p osclink --bin demo`.

use anyhow::Result;
use osclink::{
    encode_bundle, timetag_from_seconds, Link, LinkConfig, NtpClock, SendOutcome, SystemClock,
};
use oscring::NodeEntry;
use rand::Rng;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let link = Link::spawn(LinkConfig::default());
    let engine = link.engine()?;

    link.on_message(|payload| info!(bytes = payload.len(), "reply frame"));
    link.on_debug(|text| info!(%text, "engine debug"));
    link.on_message_sent(|payload, source| {
        tracing::debug!(source, bytes = payload.len(), "frame landed on IN");
    });
    link.on_error(|error| tracing::warn!(%error, "link error event"));

    // A stand-in for the audio callback: drain IN every 5ms, answer
    // /status, publish a tiny node tree once.
    let audio = std::thread::spawn(move || {
        let mut blocks = 0u32;
        let mut published = false;
        loop {
            let mut saw_status = false;
            engine.drain_in(|payload, _| {
                if payload.starts_with(b"/status\0") {
                    saw_status = true;
                }
            });
            if saw_status {
                let _ = engine.reply(b"/status.reply\0\0\0");
            }
            if !published && blocks == 20 {
                engine.publish_node_tree(&[
                    NodeEntry {
                        id: 0,
                        parent: -1,
                        is_group: true,
                        prev: -1,
                        next: -1,
                        head: 1,
                        def_name: String::new(),
                    },
                    NodeEntry {
                        id: 1000,
                        parent: 0,
                        is_group: false,
                        prev: -1,
                        next: -1,
                        head: -1,
                        def_name: "sonic-pi-beep".to_owned(),
                    },
                ]);
                let _ = engine.debug_text("node tree published");
                published = true;
            }
            blocks += 1;
            if blocks > 200 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    });

    let producer = link.register();
    let clock = SystemClock::new();
    let mut rng = rand::thread_rng();

    // A burst of immediate traffic with a little jitter.
    for _ in 0..100 {
        producer.send(b"/status\0")?;
        std::thread::sleep(Duration::from_micros(rng.gen_range(50..500)));
    }

    // One scheduled bundle half a second out, one cancelled before it fires.
    producer.set_run_context(1, "demo-run");
    let keep = encode_bundle(
        timetag_from_seconds(clock.now_ntp() + 0.5),
        &[b"/synth/new\0\0".as_slice()],
    );
    assert_eq!(producer.send(&keep)?, SendOutcome::Scheduled);

    producer.set_run_context(1, "doomed-run");
    let doomed = encode_bundle(
        timetag_from_seconds(clock.now_ntp() + 0.8),
        &[b"/node/free\0\0".as_slice()],
    );
    producer.send(&doomed)?;
    producer.cancel_tag("doomed-run")?;

    // A forwarded producer: same link, no shared-memory fast path.
    let remote = link.register_forwarded();
    remote.send(b"/remote/ping\0\0\0\0")?;
    let node_id = remote.next_node_id();
    info!(node_id, "forwarded producer claimed a node id");

    tokio::time::sleep(Duration::from_secs(1)).await;
    audio.join().expect("audio thread panicked");

    println!("{}", serde_json::to_string_pretty(&link.report())?);
    link.shutdown().await;
    Ok(())
}
