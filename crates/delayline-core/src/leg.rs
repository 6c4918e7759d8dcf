//! The relay leg contract and the factory choosing an implementation.

use crate::delayed::DelayedLeg;
use crate::error::LegError;
use crate::passthrough::PassthroughLeg;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One direction of byte relay between two stream endpoints.
#[async_trait]
pub trait RelayLeg: Send {
    /// Short implementation name for diagnostics.
    fn name(&self) -> &'static str;

    /// Moves bytes from the leg's source to its destination until the source
    /// closes cleanly, the cancellation token fires, or an I/O error occurs.
    ///
    /// Cancellation and a clean end-of-stream both return `Ok(())`; the leg
    /// stops within roughly one polling interval of the token firing. Both
    /// endpoints are dropped (closed) when the leg returns.
    ///
    /// # Errors
    ///
    /// Returns [`LegError`] on read or write failure, on a zero-length write,
    /// or (for delayed legs) on an ordering violation.
    async fn run(self: Box<Self>, cancel: CancellationToken) -> Result<(), LegError>;
}

/// Builds the relay leg for one direction.
///
/// A zero `delay` selects the passthrough implementation; any positive delay
/// selects the delayed implementation with that delivery offset.
#[must_use]
pub fn build_leg<R, W>(source: R, destination: W, delay: Duration) -> Box<dyn RelayLeg>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    if delay.is_zero() {
        Box::new(PassthroughLeg::new(source, destination))
    } else {
        Box::new(DelayedLeg::new(source, destination, delay))
    }
}

/// Writes `buf` fully to `dst`, tolerating partial writes.
///
/// A zero-length completion aborts with [`LegError::ZeroLengthWrite`] rather
/// than retrying.
pub(crate) async fn write_all_checked<W>(dst: &mut W, buf: &[u8]) -> Result<(), LegError>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while written < buf.len() {
        let n = dst.write(&buf[written..]).await?;
        if n == 0 {
            return Err(LegError::ZeroLengthWrite);
        }
        debug!(bytes = n, "wrote to destination");
        written += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::duplex;

    /// Writer that accepts at most `max_per_call` bytes per write call.
    struct ShortWriter {
        data: Vec<u8>,
        max_per_call: usize,
    }

    impl AsyncWrite for ShortWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            let n = buf.len().min(this.max_per_call);
            this.data.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Writer that claims to have written nothing.
    struct ZeroWriter;

    impl AsyncWrite for ZeroWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(0))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn zero_delay_builds_passthrough_leg() {
        let (a, _a_peer) = duplex(64);
        let (b, _b_peer) = duplex(64);
        let leg = build_leg(a, b, Duration::ZERO);
        assert_eq!(leg.name(), "passthrough");
    }

    #[test]
    fn positive_delay_builds_delayed_leg() {
        let (a, _a_peer) = duplex(64);
        let (b, _b_peer) = duplex(64);
        let leg = build_leg(a, b, Duration::from_millis(1));
        assert_eq!(leg.name(), "delayed");
    }

    #[tokio::test]
    async fn partial_writes_complete_the_buffer() {
        let mut writer = ShortWriter {
            data: Vec::new(),
            max_per_call: 3,
        };
        write_all_checked(&mut writer, b"partial write test")
            .await
            .expect("write should complete across partial writes");
        assert_eq!(writer.data, b"partial write test");
    }

    #[tokio::test]
    async fn single_byte_writes_complete_the_buffer() {
        let mut writer = ShortWriter {
            data: Vec::new(),
            max_per_call: 1,
        };
        write_all_checked(&mut writer, b"slow").await.expect("write should complete");
        assert_eq!(writer.data, b"slow");
    }

    #[tokio::test]
    async fn zero_length_write_is_fatal() {
        let mut writer = ZeroWriter;
        let result = write_all_checked(&mut writer, b"doomed").await;
        assert!(matches!(result, Err(LegError::ZeroLengthWrite)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            /// The write loop delivers any payload intact through any
            /// partial-write granularity.
            #[test]
            fn partial_writes_deliver_payload_intact(
                payload in prop::collection::vec(any::<u8>(), 1..4096),
                max_per_call in 1usize..512,
            ) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .build()
                    .expect("build runtime");
                let mut writer = ShortWriter {
                    data: Vec::new(),
                    max_per_call,
                };
                rt.block_on(write_all_checked(&mut writer, &payload))
                    .expect("write payload");
                prop_assert_eq!(writer.data, payload);
            }
        }
    }
}
