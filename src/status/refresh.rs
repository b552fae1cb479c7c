//! Periodic self-check
//!
//! Probes the IP source on a fixed interval and publishes each outcome to
//! the [`StatusStore`]. Probe failures degrade the status but never stop the
//! loop; only the shutdown signal does.

use super::StatusStore;
use crate::probe::IpSource;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Clears the running flag when `run` ends, including when its future is
/// dropped mid-loop
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Background refresher for the shared status record
pub struct RefreshLoop {
    source: Arc<dyn IpSource>,
    store: Arc<StatusStore>,
    interval: Duration,
    running: AtomicBool,
}

impl RefreshLoop {
    pub fn new(source: Arc<dyn IpSource>, store: Arc<StatusStore>, interval: Duration) -> Self {
        RefreshLoop {
            source,
            store,
            interval,
            running: AtomicBool::new(false),
        }
    }

    /// Check if the loop is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one self-check and publish it. Returns whether it succeeded.
    pub async fn refresh(&self) -> bool {
        let result = self.source.public_ip().await;
        let now = Utc::now();

        match result {
            Ok(ip) => {
                let previous = self.store.read();
                if previous.public_ip != ip {
                    info!("Public IP is now {}", ip);
                }
                if !previous.online {
                    info!("Egress is online");
                }
                self.store.publish_refresh(true, Some(ip), now);
                true
            }
            Err(e) => {
                warn!("Self-check failed: {}", e);
                self.store.publish_refresh(false, None, now);
                false
            }
        }
    }

    /// Refresh until `shutdown` fires
    ///
    /// The first check runs immediately. A shutdown arriving while a check
    /// is in flight abandons that check.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return; // Already running
        }
        let _running = RunningGuard(&self.running);

        info!("Refresh loop started (interval {:?})", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    break;
                }
                _ = ticker.tick() => {
                    debug!("Refresh tick");
                    tokio::select! {
                        biased;

                        _ = shutdown.recv() => {
                            debug!("Abandoning in-flight self-check");
                            break;
                        }
                        _ = self.refresh() => {}
                    }
                }
            }
        }

        info!("Refresh loop stopped");
    }
}
