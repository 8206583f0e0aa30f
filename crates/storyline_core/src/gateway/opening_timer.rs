//! Time-driven Opening broadcasts.
//!
//! # Invariants
//! - The timer is one-shot and re-armed after every boundary with a delay
//!   computed from the clock at that moment, so drift never accumulates.
//! - A wake-up that lands before the boundary re-arms without broadcasting.

use crate::gateway::Gateway;
use log::{debug, info};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Handle to the background Opening broadcaster.
///
/// Dropping the handle stops the task.
#[derive(Debug)]
#[must_use = "dropping the timer stops Opening broadcasts"]
pub struct OpeningTimer {
    handle: JoinHandle<()>,
}

impl OpeningTimer {
    /// Spawns the broadcaster on the current tokio runtime.
    pub fn spawn(gateway: Gateway) -> Self {
        Self {
            handle: tokio::spawn(run(gateway)),
        }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl Drop for OpeningTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(gateway: Gateway) {
    let schedule = gateway.config().opening;
    loop {
        let now = gateway.clock().now();
        let boundary = schedule.next_boundary(now);
        let delay = (boundary - now).to_std().unwrap_or(Duration::ZERO);
        debug!(
            "event=opening_timer module=gateway status=armed boundary={} delay_ms={}",
            boundary.to_rfc3339(),
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;

        if gateway.clock().now() < boundary {
            continue;
        }
        let state = gateway.broadcast_opening();
        info!(
            "event=opening_timer module=gateway status=fired is_open={}",
            state.is_open
        );
    }
}
