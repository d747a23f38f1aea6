//! Ring buffer reader and reset event consumer
//!
//! The reader drains the ring buffer as fast as the kernel fills it and hands
//! decoded events to a bounded channel with `try_send`. When the consumer
//! falls behind the event is dropped and counted; the reader never waits on
//! it.

use log::{info, warn};
use skoop_common::{layout, TcpResetEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::symbolizer::{ResetRecord, Symbolizer};

/// Counters shared between the reader and whoever reports on it
#[derive(Debug, Default)]
pub struct PipelineStats {
    received: AtomicU64,
    forwarded: AtomicU64,
    dropped: AtomicU64,
    malformed: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Events lost because the consumer channel was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forwarded {
    Sent,
    Dropped,
    Malformed,
    Closed,
}

/// Decode one ring buffer record and push it to the consumer without waiting.
pub fn forward_record(
    bytes: &[u8],
    tx: &mpsc::Sender<TcpResetEvent>,
    stats: &PipelineStats,
) -> Forwarded {
    stats.received.fetch_add(1, Ordering::Relaxed);

    if bytes.len() != layout::SIZE {
        stats.malformed.fetch_add(1, Ordering::Relaxed);
        warn!(
            "Malformed reset record: expected {} bytes, got {} bytes - skipping",
            layout::SIZE,
            bytes.len()
        );
        return Forwarded::Malformed;
    }

    let event = match TcpResetEvent::decode(bytes) {
        Ok(event) => event,
        Err(e) => {
            stats.malformed.fetch_add(1, Ordering::Relaxed);
            warn!("Malformed reset record: {} - skipping", e);
            return Forwarded::Malformed;
        }
    };

    match tx.try_send(event) {
        Ok(()) => {
            stats.forwarded.fetch_add(1, Ordering::Relaxed);
            Forwarded::Sent
        }
        Err(TrySendError::Full(_)) => {
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            Forwarded::Dropped
        }
        Err(TrySendError::Closed(_)) => {
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            Forwarded::Closed
        }
    }
}

/// Wait on the ring buffer fd and forward every record until cancelled.
///
/// Returns the ring buffer so its owner can release it with the rest of the
/// probe resources.
#[cfg(target_os = "linux")]
pub async fn run_reader(
    ring_buf: aya::maps::RingBuf<aya::maps::MapData>,
    tx: mpsc::Sender<TcpResetEvent>,
    stats: std::sync::Arc<PipelineStats>,
    cancel: tokio_util::sync::CancellationToken,
) -> anyhow::Result<aya::maps::RingBuf<aya::maps::MapData>> {
    use tokio::io::unix::AsyncFd;
    use tokio::io::Interest;

    let mut poll = AsyncFd::with_interest(ring_buf, Interest::READABLE)?;
    info!("Reset event reader started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            guard = poll.readable_mut() => {
                let mut guard = guard?;
                let mut consumer_gone = false;
                let ring = guard.get_inner_mut();
                while let Some(item) = ring.next() {
                    if forward_record(&item, &tx, &stats) == Forwarded::Closed {
                        consumer_gone = true;
                        break;
                    }
                }
                guard.clear_ready();

                if consumer_gone {
                    warn!("Reset consumer went away, stopping reader");
                    break;
                }
            }
        }
    }

    info!(
        "Reset event reader stopped: received={} forwarded={} dropped={} malformed={}",
        stats.received(),
        stats.forwarded(),
        stats.dropped(),
        stats.malformed()
    );
    Ok(poll.into_inner())
}

/// Symbolize events and log them; forward to `out` when a correlator is attached.
pub async fn run_consumer(
    mut rx: mpsc::Receiver<TcpResetEvent>,
    symbolizer: Symbolizer,
    out: Option<mpsc::Sender<ResetRecord>>,
) -> u64 {
    let mut handled = 0;

    while let Some(event) = rx.recv().await {
        let record = symbolizer.record(event);
        info!("{}", record);
        handled += 1;

        if let Some(out) = &out {
            if out.send(record).await.is_err() {
                warn!("Reset record receiver closed");
                break;
            }
        }
    }

    handled
}
