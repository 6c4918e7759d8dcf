//! Immediate-copy relay leg.

use crate::error::LegError;
use crate::leg::{RelayLeg, write_all_checked};
use crate::{READ_BUFFER_SIZE, READ_POLL_INTERVAL};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Relay leg that copies bytes to the destination as soon as they are read.
///
/// Reads are bounded by [`READ_POLL_INTERVAL`] so the leg notices
/// cancellation even when the source is silent; an expired read deadline is
/// not an error, just another trip around the loop.
pub struct PassthroughLeg<R, W> {
    source: R,
    destination: W,
}

impl<R, W> PassthroughLeg<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a passthrough leg over the given stream halves.
    #[must_use]
    pub fn new(source: R, destination: W) -> Self {
        Self {
            source,
            destination,
        }
    }
}

#[async_trait]
impl<R, W> RelayLeg for PassthroughLeg<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn name(&self) -> &'static str {
        "passthrough"
    }

    async fn run(mut self: Box<Self>, cancel: CancellationToken) -> Result<(), LegError> {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut relayed: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                debug!(bytes = relayed, "leg cancelled");
                return Ok(());
            }

            match timeout(READ_POLL_INTERVAL, self.source.read(&mut buf)).await {
                Err(_) => {
                    trace!("read poll expired, checking cancellation");
                }
                Ok(Ok(0)) => {
                    info!(bytes = relayed, "source closed, leg finished");
                    return Ok(());
                }
                Ok(Ok(n)) => {
                    info!(bytes = n, "read from source");
                    write_all_checked(&mut self.destination, &buf[..n]).await?;
                    relayed += n as u64;
                }
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }
}
