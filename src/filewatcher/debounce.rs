use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    Ready,
    Warmup,
    Running,
    Cooldown,
}

/// Warmup/cooldown discipline for re-reading a file that changes in bursts.
///
/// The debouncer holds no timer itself: the driver sleeps until
/// [`Debouncer::deadline`] and reports back through
/// [`Debouncer::on_deadline`].
#[derive(Debug)]
pub struct Debouncer {
    phase: WatchPhase,
    rerun_requested: bool,
    deadline: Option<Instant>,
    warmup: Duration,
    cooldown: Duration,
}

impl Debouncer {
    pub fn new(warmup: Duration, cooldown: Duration) -> Self {
        Self {
            phase: WatchPhase::Ready,
            rerun_requested: false,
            deadline: None,
            warmup,
            cooldown,
        }
    }

    pub fn phase(&self) -> WatchPhase {
        self.phase
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn on_change(&mut self, now: Instant) {
        match self.phase {
            WatchPhase::Ready => {
                self.phase = WatchPhase::Warmup;
                self.deadline = Some(now + self.warmup);
            }
            WatchPhase::Warmup => {}
            WatchPhase::Running | WatchPhase::Cooldown => self.rerun_requested = true,
        }
    }

    /// Returns true when the file must be parsed now; the phase is then
    /// `Running` until [`Debouncer::on_parsed`].
    pub fn on_deadline(&mut self, now: Instant) -> bool {
        self.deadline = None;
        match self.phase {
            WatchPhase::Warmup => {
                self.phase = WatchPhase::Running;
                true
            }
            WatchPhase::Cooldown if self.rerun_requested => {
                self.rerun_requested = false;
                self.phase = WatchPhase::Warmup;
                self.deadline = Some(now + self.warmup);
                false
            }
            WatchPhase::Cooldown => {
                self.phase = WatchPhase::Ready;
                false
            }
            WatchPhase::Ready | WatchPhase::Running => false,
        }
    }

    pub fn on_parsed(&mut self, now: Instant) {
        self.phase = WatchPhase::Cooldown;
        self.deadline = Some(now + self.cooldown);
    }
}
