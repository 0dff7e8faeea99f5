//! In-process queue ticker.
//!
//! Optional companion to the external cron trigger: when
//! `QUEUE_POLL_SECONDS` is set the binary runs the processor on that cadence.
//! Both may run at once; overlapping runs are safe.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::processor::process_queue;
use crate::state::AppState;

/// Spawn a task that runs the queue processor every `period`.
///
/// The first run happens immediately.
pub fn spawn_queue_ticker(state: Arc<AppState>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match process_queue(&state, Utc::now()).await {
                Ok(summary) if summary.processed > 0 => {
                    tracing::debug!(?summary, "Queue tick finished");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Queue tick failed to select jobs"),
            }
        }
    })
}
