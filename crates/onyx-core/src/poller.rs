// ── Adaptive poller ──
//
// Background task keeping the registry's active flags fresh. Runs at the
// NORMAL interval in steady state and drops to the FAST interval while
// any cue list is transitioning, so action feedback lands quickly.
//
// FAST ticks issue their refresh boosted, jumping any routine commands
// already queued; NORMAL ticks stay unboosted so user actions can
// overtake them.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::OnyxClient;
use crate::error::CoreError;

/// Polling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollMode {
    Normal,
    Fast,
}

/// Decide the next cadence after a tick.
///
/// `clear_at_start` / `clear_after_apply` report whether zero entities
/// were transitioning when the tick began and after its response was
/// applied. FAST is entered the moment anything transitions, but only
/// left after one full FAST tick bounded by clear states on both ends —
/// otherwise update lag would make the cadence oscillate.
pub(crate) fn next_mode(mode: PollMode, clear_at_start: bool, clear_after_apply: bool) -> PollMode {
    match mode {
        PollMode::Normal if clear_after_apply => PollMode::Normal,
        PollMode::Normal => PollMode::Fast,
        PollMode::Fast if clear_at_start && clear_after_apply => PollMode::Normal,
        PollMode::Fast => PollMode::Fast,
    }
}

/// What the poll loop needs from its owner. The loop is generic over
/// this seam so cadence tests can drive it against a scripted target
/// under a paused clock.
pub(crate) trait PollTarget {
    fn poll_interval(&self) -> Duration;
    fn fast_poll_interval(&self) -> Duration;
    fn any_transitioning(&self) -> bool;
    /// Resolves when a user action flags a transition.
    async fn transition_started(&self);
    /// One active-status refresh. Returns whether anything changed.
    async fn refresh(&self, boosted: bool) -> Result<bool, CoreError>;
}

impl PollTarget for OnyxClient {
    fn poll_interval(&self) -> Duration {
        self.config().poll_interval
    }

    fn fast_poll_interval(&self) -> Duration {
        self.config().fast_poll_interval
    }

    fn any_transitioning(&self) -> bool {
        OnyxClient::any_transitioning(self)
    }

    async fn transition_started(&self) {
        OnyxClient::transition_started(self).await;
    }

    async fn refresh(&self, boosted: bool) -> Result<bool, CoreError> {
        self.refresh_active(boosted).await
    }
}

/// Poll loop. Runs until cancelled or the connection drops; a dropped
/// connection suspends polling (no busy-retry) until an explicit
/// reconnect spawns a fresh loop.
pub(crate) async fn poll_task<T: PollTarget>(target: T, cancel: CancellationToken) {
    let mut mode = PollMode::Normal;

    loop {
        let interval = match mode {
            PollMode::Normal => target.poll_interval(),
            PollMode::Fast => target.fast_poll_interval(),
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = target.transition_started() => {
                // A user action just flagged a transition; switch to the
                // FAST cadence without waiting out the NORMAL interval.
                mode = PollMode::Fast;
                continue;
            }
            () = tokio::time::sleep(interval) => {}
        }

        let clear_at_start = !target.any_transitioning();

        match target.refresh(mode == PollMode::Fast).await {
            Ok(_changed) => {}
            Err(e) if e.is_disconnect() => {
                warn!(error = %e, "connection lost, poller suspended");
                break;
            }
            Err(e) => {
                warn!(error = %e, "poll tick failed");
                continue;
            }
        }

        let clear_after_apply = !target.any_transitioning();
        mode = next_mode(mode, clear_at_start, clear_after_apply);
    }

    debug!("poller stopped");
}
