//! Voice server reachability polling.
//!
//! The monitor alternates between two phases:
//! - polling: call `check_health` under a [`RetryPolicy`] until it succeeds
//! - stable: do nothing until a [`HealthHandle`] reports that the server dropped
//!
//! Subscribers are only woken on reachability transitions.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::{watch, Notify};

use crate::backend::VoiceBackend;

/// Snapshot of what the monitor last learned about the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthStatus {
    pub reachable: bool,
    pub last_checked_at: Option<DateTime<Local>>,
    /// Whether the server reported a continuous capture on its last good check.
    pub listening: bool,
}

/// Delay schedule between failed health checks.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub interval: Duration,
    /// Per-failure growth factor; values below 1.0 are treated as 1.0.
    pub multiplier: f64,
    pub max_interval: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            multiplier: 1.0,
            max_interval: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the `failures`-th consecutive failed check.
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(64) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let secs = (self.interval.as_secs_f64() * factor).min(self.max_interval.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    pub fn exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }
}

struct Shared {
    status: watch::Sender<HealthStatus>,
    resume: Notify,
    /// The monitor is waiting on `resume` rather than polling.
    parked: Cell<bool>,
}

/// Cheap handle other components use to tell the monitor the server is gone.
#[derive(Clone)]
pub struct HealthHandle {
    shared: Rc<Shared>,
}

impl HealthHandle {
    /// Mark the server unreachable and resume polling. No-op unless the
    /// monitor currently believes the server is up.
    pub fn report_unreachable(&self) {
        let dropped = self.shared.status.send_if_modified(|s| {
            if s.reachable {
                s.reachable = false;
                true
            } else {
                false
            }
        });
        if dropped {
            log::warn!("Voice server reported unreachable, resuming health checks");
            self.shared.resume.notify_one();
        }
    }

    /// Restart polling after the retry policy gave up. Ignored while a
    /// poll is already running or the server is up.
    pub fn retry_now(&self) {
        if !self.shared.parked.get() || self.shared.status.borrow().reachable {
            log::debug!("Manual health check ignored, monitor is not paused");
            return;
        }
        log::info!("Manual health check requested");
        self.shared.resume.notify_one();
    }

    pub fn status(&self) -> HealthStatus {
        *self.shared.status.borrow()
    }
}

pub struct HealthMonitor<B> {
    backend: Rc<B>,
    policy: RetryPolicy,
    shared: Rc<Shared>,
}

impl<B: VoiceBackend> HealthMonitor<B> {
    pub fn new(backend: Rc<B>, policy: RetryPolicy) -> Self {
        let (status, _) = watch::channel(HealthStatus::default());
        Self {
            backend,
            policy,
            shared: Rc::new(Shared {
                status,
                resume: Notify::new(),
                parked: Cell::new(false),
            }),
        }
    }

    pub fn handle(&self) -> HealthHandle {
        HealthHandle {
            shared: Rc::clone(&self.shared),
        }
    }

    /// Receiver that changes only when `reachable` flips.
    pub fn subscribe(&self) -> watch::Receiver<HealthStatus> {
        self.shared.status.subscribe()
    }

    /// Drive the monitor forever. Poll until reachable (or the policy gives
    /// up), then park until resumed.
    pub async fn run(&self) {
        log::info!(
            "Health monitor started (interval {:?}, max attempts {:?})",
            self.policy.interval,
            self.policy.max_attempts
        );
        loop {
            if !self.poll_until_reachable().await {
                log::warn!("Voice server still unreachable, health checks paused");
            }
            self.shared.parked.set(true);
            self.shared.resume.notified().await;
            self.shared.parked.set(false);
        }
    }

    /// Returns true once a check succeeds, false if the policy gave up.
    async fn poll_until_reachable(&self) -> bool {
        let mut failures = 0u32;
        loop {
            let result = self.backend.check_health().await;
            let now = Local::now();
            match result {
                Ok(server) => {
                    let came_up = self.shared.status.send_if_modified(|s| {
                        let changed = !s.reachable;
                        s.reachable = true;
                        s.listening = server.listening;
                        s.last_checked_at = Some(now);
                        changed
                    });
                    if came_up {
                        log::info!("Voice server online after {failures} failed checks");
                    }
                    return true;
                }
                Err(e) => {
                    failures += 1;
                    self.shared.status.send_if_modified(|s| {
                        s.last_checked_at = Some(now);
                        false
                    });
                    log::debug!("Health check #{failures} failed: {e}");
                    if self.policy.exhausted(failures) {
                        return false;
                    }
                    tokio::time::sleep(self.policy.delay(failures)).await;
                }
            }
        }
    }
}
