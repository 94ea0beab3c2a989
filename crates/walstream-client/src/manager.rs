//! Connection manager: keeps a CDC session alive forever.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::reconnect::ReconnectPolicy;
use crate::session::SessionHandler;
use crate::transport::Connector;

/// Supervises the session handler with unbounded retries.
pub struct ConnectionManager<C> {
    handler: SessionHandler<C>,
    policy: ReconnectPolicy,
}

impl<C: Connector> ConnectionManager<C> {
    pub const fn new(handler: SessionHandler<C>, policy: ReconnectPolicy) -> Self {
        Self { handler, policy }
    }

    /// Run sessions until `cancel` fires.
    ///
    /// Every failed attempt is logged and followed by the policy delay;
    /// attempts are strictly sequential and there is no retry limit.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                info!("CDC client shutting down");
                return;
            }

            let started = Instant::now();
            match self.handler.connect_and_serve(&cancel).await {
                Ok(()) => {
                    info!("CDC client shutting down");
                    return;
                }
                Err(e) => {
                    // Reset backoff if the session stayed up long enough
                    if started.elapsed() >= self.policy.reset_after {
                        attempt = 0;
                    }

                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(
                        error = %e,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Connection lost, reconnecting"
                    );

                    if !wait(delay, &cancel).await {
                        info!("CDC client shutting down during reconnect wait");
                        return;
                    }

                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}

/// Sleep for `delay`; `false` if cancelled first.
async fn wait(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = sleep(delay) => true,
        () = cancel.cancelled() => false,
    }
}
