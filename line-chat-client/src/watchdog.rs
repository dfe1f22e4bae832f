//! Liveness supervisor for one streaming session.
//!
//! Any traffic in either direction resets the window. Silence for the whole
//! window means the connection pair is dead even if no socket error surfaced.

use std::time::Duration;

use chrono::Local;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::{error::ChatError, liveness::LivenessReceiver};

pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs until `window` passes without a liveness event.
pub async fn watch(events: &mut LivenessReceiver, window: Duration) -> Result<(), ChatError> {
    loop {
        match timeout(window, events.recv()).await {
            Ok(Some(event)) => {
                info!(target: "watchdog", "[{}] {}", event.at.timestamp(), event.source);
            }
            Ok(None) => return Err(ChatError::QueueClosed("liveness")),
            Err(_) => {
                warn!(target: "watchdog", "[{}] {window:?} timeout is elapsed", Local::now().timestamp());
                return Err(ChatError::WatchdogTimeout(window));
            }
        }
    }
}
