//! Periodic staleness sweep over all sessions

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::pipeline::session::SessionHandle;

/// Marks Active sessions inactive when their last frame is older than their timeout.
#[derive(Clone)]
pub struct ActivityMonitor {
    sessions: Arc<[SessionHandle]>,
    interval: Duration,
}

impl ActivityMonitor {
    pub fn new(sessions: Arc<[SessionHandle]>, interval: Duration) -> Self {
        Self { sessions, interval }
    }

    /// One pass. Returns how many sessions were newly flagged.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut flagged = 0;
        for session in self.sessions.iter() {
            if session.mark_inactive_if_stale(now) {
                warn!(
                    session = session.id(),
                    "Session {} inactive (no frames for {:?})",
                    session.name(),
                    session.timeout()
                );
                flagged += 1;
            }
        }
        let active = self.sessions.iter().filter(|s| s.is_counted_active()).count();
        metrics::gauge!("active_sessions").set(active as f64);
        flagged
    }

    /// Sweep every `interval` until `shutdown` flips to true or its sender is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep(Instant::now());
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Activity monitor stopped");
        })
    }
}
