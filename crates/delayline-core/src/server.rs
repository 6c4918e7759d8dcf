//! Listening server: accepts clients and supervises their sessions.

use crate::delay::DelaySampler;
use crate::error::ServerError;
use crate::session::Session;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

/// Relay parameters for a listening server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on (all interfaces)
    pub listen_port: u16,
    /// Upstream `host:port` every session relays to
    pub upstream_addr: String,
    /// Client-to-upstream delay, or its median when randomized
    pub up_delay: Duration,
    /// Upstream-to-client delay, or its median when randomized
    pub down_delay: Duration,
    /// Draw per-session delays from the log-normal law instead of applying
    /// the configured values directly
    pub randomize_delay: bool,
}

/// Accepting relay server.
///
/// Binding and running are split so a bind failure surfaces immediately and
/// callers can learn the bound address before the accept loop starts.
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    sampler: DelaySampler,
}

impl Server {
    /// Binds the listening socket for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the socket cannot be created, bound,
    /// or put into listening mode.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.listen_port));
        let listener = bind_listener(addr).map_err(|e| ServerError::Bind {
            port: config.listen_port,
            source: e,
        })?;

        Ok(Self {
            config,
            listener,
            sampler: DelaySampler::new(),
        })
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket's local address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts and relays connections until `cancel` fires, then drains
    /// in-flight sessions before returning.
    ///
    /// Accept errors are logged and skipped unless cancellation is already
    /// active, in which case the loop exits cleanly. Session errors are
    /// logged per connection and never stop the loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ServerError> {
        info!(
            addr = %self.local_addr()?,
            upstream = %self.config.upstream_addr,
            randomize = self.config.randomize_delay,
            "listening for connections"
        );

        let mut sessions: JoinSet<()> = JoinSet::new();
        let mut conn_id: u64 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(result) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = result {
                        warn!(error = %e, "session task failed");
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((client, peer)) => {
                        conn_id += 1;
                        let (up_delay, down_delay) = self.resolve_delays();
                        let session =
                            Session::new(self.config.upstream_addr.clone(), up_delay, down_delay);
                        let scope = cancel.child_token();
                        let task = async move {
                            info!("client connection accepted");
                            if let Err(e) = session.run(client, scope).await {
                                error!(error = %e, "session ended with error");
                            }
                        };
                        let span = info_span!("conn", id = conn_id, client = %peer);
                        sessions.spawn(task.instrument(span));
                    }
                    Err(e) => {
                        if cancel.is_cancelled() {
                            break;
                        }
                        warn!(error = %e, "failed to accept client connection");
                    }
                },
            }
        }

        // Release the port before waiting out in-flight sessions.
        drop(self.listener);
        if !sessions.is_empty() {
            info!(active = sessions.len(), "draining in-flight sessions");
        }
        while let Some(result) = sessions.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "session task failed");
            }
        }
        info!("server stopped");
        Ok(())
    }

    /// Effective per-direction delays for one accepted connection, sampled
    /// once and then fixed for the connection's lifetime.
    fn resolve_delays(&self) -> (Duration, Duration) {
        if self.config.randomize_delay {
            (
                self.sampler.sample(self.config.up_delay),
                self.sampler.sample(self.config.down_delay),
            )
        } else {
            (self.config.up_delay, self.config.down_delay)
        }
    }
}

fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        socket2::Domain::IPV4
    } else {
        socket2::Domain::IPV6
    };

    let socket = socket2::Socket::new(domain, socket2::Type::STREAM, Some(socket2::Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}
