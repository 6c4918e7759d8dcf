//! Delayed-delivery relay leg.
//!
//! The leg splits into two halves sharing a bounded queue: the read half
//! captures chunks and hands each one to a short-lived scheduling task that
//! holds it through the configured delay, while the write half drains the
//! queue in capture order and writes to the destination. Either half
//! finishing cancels the other, and scheduling tasks discard their chunk if
//! the leg is cancelled before the delay elapses.

use crate::error::LegError;
use crate::leg::{RelayLeg, write_all_checked};
use crate::{DELAY_QUEUE_DEPTH, READ_BUFFER_SIZE, READ_POLL_INTERVAL};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, trace};

/// One unit of bytes captured by the read half, tagged with its capture
/// instant so the write half can enforce delivery order.
struct Chunk {
    read_time: Instant,
    payload: Vec<u8>,
}

/// Relay leg that defers delivery of every chunk by a fixed duration while
/// preserving capture order.
pub struct DelayedLeg<R, W> {
    source: R,
    destination: W,
    delay: Duration,
}

impl<R, W> DelayedLeg<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a delayed leg that delivers each chunk `delay` after its
    /// capture.
    #[must_use]
    pub fn new(source: R, destination: W, delay: Duration) -> Self {
        Self {
            source,
            destination,
            delay,
        }
    }
}

#[async_trait]
impl<R, W> RelayLeg for DelayedLeg<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn name(&self) -> &'static str {
        "delayed"
    }

    async fn run(self: Box<Self>, cancel: CancellationToken) -> Result<(), LegError> {
        let leg = cancel.child_token();
        let (queue_tx, queue_rx) = mpsc::channel(DELAY_QUEUE_DEPTH);
        let DelayedLeg {
            source,
            destination,
            delay,
        } = *self;

        let (read_result, write_result) = tokio::join!(
            async {
                let result = read_into_queue(source, delay, queue_tx, leg.clone()).await;
                leg.cancel();
                result
            },
            async {
                let result = drain_queue(destination, queue_rx, leg.clone()).await;
                leg.cancel();
                result
            },
        );

        read_result.and(write_result)
    }
}

/// Read half: captures chunks and schedules each for delayed delivery.
async fn read_into_queue<R>(
    mut source: R,
    delay: Duration,
    queue: Sender<Chunk>,
    cancel: CancellationToken,
) -> Result<(), LegError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut chunks: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            debug!(chunks, "read half cancelled");
            return Ok(());
        }

        match timeout(READ_POLL_INTERVAL, source.read(&mut buf)).await {
            Err(_) => {
                trace!("read poll expired, checking cancellation");
            }
            Ok(Ok(0)) => {
                info!(chunks, "source closed, read half finished");
                return Ok(());
            }
            Ok(Ok(n)) => {
                info!(bytes = n, "read from source");
                let chunk = Chunk {
                    read_time: Instant::now(),
                    payload: buf[..n].to_vec(),
                };
                chunks += 1;
                schedule_delivery(chunk, delay, queue.clone(), cancel.clone());
            }
            Ok(Err(e)) => return Err(e.into()),
        }
    }
}

/// Spawns the short-lived task that holds one chunk through its delay and
/// then queues it for delivery. The chunk is discarded if the leg is
/// cancelled first, or if the write half is already gone.
fn schedule_delivery(
    chunk: Chunk,
    delay: Duration,
    queue: Sender<Chunk>,
    cancel: CancellationToken,
) {
    let task = async move {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sleep_until(chunk.read_time + delay) => {}
        }
        tokio::select! {
            _ = cancel.cancelled() => {}
            result = queue.send(chunk) => {
                if result.is_err() {
                    trace!("delivery queue closed, chunk discarded");
                }
            }
        }
    };
    tokio::spawn(task.instrument(Span::current()));
}

/// Write half: drains the queue in capture order and writes each chunk to
/// the destination.
async fn drain_queue<W>(
    mut destination: W,
    mut queue: Receiver<Chunk>,
    cancel: CancellationToken,
) -> Result<(), LegError>
where
    W: AsyncWrite + Unpin,
{
    let mut last_read_time: Option<Instant> = None;
    let mut relayed: u64 = 0;

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(bytes = relayed, "write half cancelled");
                return Ok(());
            }
            chunk = queue.recv() => match chunk {
                Some(chunk) => chunk,
                None => {
                    debug!(bytes = relayed, "delivery queue drained");
                    return Ok(());
                }
            },
        };

        if let Some(last) = last_read_time {
            if chunk.read_time < last {
                return Err(LegError::OutOfOrder {
                    regressed_by: last - chunk.read_time,
                });
            }
        }
        last_read_time = Some(chunk.read_time);

        write_all_checked(&mut destination, &chunk.payload).await?;
        relayed += chunk.payload.len() as u64;
    }
}
