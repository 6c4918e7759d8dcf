//! Per-connection session pairing two relay legs.

use crate::error::{LegError, SessionError};
use crate::leg::{RelayLeg, build_leg};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span};

/// Relay settings and supervision for one accepted connection.
///
/// Delay values are resolved by the server before the session starts; the
/// session only chooses a leg implementation per direction from them.
#[derive(Debug, Clone)]
pub struct Session {
    upstream_addr: String,
    up_delay: Duration,
    down_delay: Duration,
}

impl Session {
    /// Creates a session that relays to `upstream_addr` with the given
    /// per-direction delays.
    #[must_use]
    pub fn new(upstream_addr: String, up_delay: Duration, down_delay: Duration) -> Self {
        Self {
            upstream_addr,
            up_delay,
            down_delay,
        }
    }

    /// Relays between the accepted `client` connection and a freshly dialed
    /// upstream connection until either side closes, either leg fails, or
    /// `cancel` fires.
    ///
    /// Both connections are closed on every exit path. Either leg finishing
    /// cancels its sibling; when both legs fail, only the upstream-direction
    /// error is surfaced.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Dial`] if the upstream is unreachable, or the
    /// first leg failure otherwise.
    pub async fn run(
        self,
        client: TcpStream,
        cancel: CancellationToken,
    ) -> Result<(), SessionError> {
        debug!(
            upstream = %self.upstream_addr,
            up_delay = ?self.up_delay,
            down_delay = ?self.down_delay,
            "starting session"
        );

        let upstream = TcpStream::connect(&self.upstream_addr)
            .await
            .map_err(|e| SessionError::Dial {
                addr: self.upstream_addr.clone(),
                source: e,
            })?;
        info!(upstream = %self.upstream_addr, "upstream connection established");

        let (client_read, client_write) = client.into_split();
        let (upstream_read, upstream_write) = upstream.into_split();

        let up = build_leg(client_read, upstream_write, self.up_delay);
        let down = build_leg(upstream_read, client_write, self.down_delay);
        debug!(leg = up.name(), delay = ?self.up_delay, dir = "up", "relay leg selected");
        debug!(leg = down.name(), delay = ?self.down_delay, dir = "down", "relay leg selected");

        let scope = cancel.child_token();
        let up_task =
            tokio::spawn(run_leg(up, scope.clone()).instrument(info_span!("leg", dir = "up")));
        let down_task =
            tokio::spawn(run_leg(down, scope.clone()).instrument(info_span!("leg", dir = "down")));

        let (up_result, down_result) = tokio::join!(up_task, down_task);
        debug!("session finished");

        let up_result = up_result?.map_err(SessionError::from);
        let down_result = down_result?.map_err(SessionError::from);
        up_result.and(down_result)
    }
}

/// Runs one leg and cancels the session scope when it finishes, stopping the
/// sibling leg.
async fn run_leg(leg: Box<dyn RelayLeg>, scope: CancellationToken) -> Result<(), LegError> {
    let result = leg.run(scope.clone()).await;
    scope.cancel();
    result
}
