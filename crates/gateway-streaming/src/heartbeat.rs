//! Keep-alive ticker for open streams.

use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Interval between heartbeats
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Spawn a task that signals `tx` every `interval` until `stop` fires.
///
/// The first beat comes one full interval after spawning. A beat is skipped
/// when the previous one has not been consumed yet, so a slow consumer never
/// accumulates a backlog of keep-alives.
pub fn spawn_heartbeat(interval: Duration, tx: mpsc::Sender<()>, stop: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = stop.cancelled() => break,
                _ = ticker.tick() => match tx.try_send(()) {
                    Ok(()) | Err(TrySendError::Full(())) => {}
                    Err(TrySendError::Closed(())) => break,
                },
            }
        }
        trace!("Heartbeat stopped");
    })
}
