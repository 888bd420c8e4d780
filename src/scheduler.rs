//! Restartable repeating timer with geometric backoff.
//!
//! The first fire happens `minimum` after arming; every later interval is
//! doubled until it reaches `maximum`, where it stays. Exactly one timer task
//! exists while armed: re-arming aborts the previous task before spawning the
//! next one, so a fire is never duplicated.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error};

type Action = Arc<dyn Fn() + Send + Sync + 'static>;

pub struct BackoffScheduler {
    minimum: Duration,
    maximum: Duration,
    action: Action,
    timer: Option<JoinHandle<()>>,
}

impl BackoffScheduler {
    /// Creates a disarmed scheduler. Must be armed from within a tokio runtime.
    pub fn new<F>(minimum: Duration, maximum: Duration, action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let (minimum, maximum) = normalize(minimum, maximum);
        Self {
            minimum,
            maximum,
            action: Arc::new(action),
            timer: None,
        }
    }

    /// Arms the timer at the minimum interval. Already armed: no-op.
    pub fn start(&mut self) {
        if self.is_armed() {
            return;
        }
        self.arm();
    }

    /// Disarms and cancels the pending fire, if any.
    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Replaces the bounds. An armed timer restarts at the new minimum.
    pub fn change_interval(&mut self, minimum: Duration, maximum: Duration) {
        let (minimum, maximum) = normalize(minimum, maximum);
        self.minimum = minimum;
        self.maximum = maximum;
        if self.is_armed() {
            self.stop();
            self.arm();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.timer
            .as_ref()
            .map(|timer| !timer.is_finished())
            .unwrap_or(false)
    }

    pub fn bounds(&self) -> (Duration, Duration) {
        (self.minimum, self.maximum)
    }

    fn arm(&mut self) {
        debug!(
            minimum_ms = self.minimum.as_millis() as u64,
            maximum_ms = self.maximum.as_millis() as u64,
            "Arming backoff timer"
        );
        let action = Arc::clone(&self.action);
        let (minimum, maximum) = (self.minimum, self.maximum);
        self.timer = Some(tokio::spawn(async move {
            let mut current = minimum;
            loop {
                sleep(current).await;
                if catch_unwind(AssertUnwindSafe(|| action())).is_err() {
                    error!("Scheduled action panicked, timer keeps running");
                }
                current = next_interval(current, maximum);
            }
        }));
    }
}

impl Drop for BackoffScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn next_interval(current: Duration, maximum: Duration) -> Duration {
    current.saturating_mul(2).min(maximum)
}

fn normalize(minimum: Duration, maximum: Duration) -> (Duration, Duration) {
    let minimum = minimum.max(Duration::from_millis(1));
    (minimum, maximum.max(minimum))
}
