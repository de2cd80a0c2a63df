// Run state shared between the session task and the command source.
//
// All waits that a Pause or Stop must be able to cut short go through
// `RunControl::wait`, which sleeps in ticks and re-reads the state each tick.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use followscout_common::FollowScoutError;

/// Granularity of interruptible waits and of the countdown display.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    Idle = 0,
    Scanning = 1,
    Following = 2,
    Paused = 3,
}

impl RunState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => RunState::Scanning,
            2 => RunState::Following,
            3 => RunState::Paused,
            _ => RunState::Idle,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Scanning => write!(f, "scan"),
            RunState::Following => write!(f, "follow run"),
            RunState::Paused => write!(f, "paused follow run"),
        }
    }
}

/// How an interruptible wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    /// The state left the one the wait was guarding. `remaining` is the unslept time.
    Interrupted { remaining: Duration, state: RunState },
}

/// Cloneable handle to one session's run state.
#[derive(Debug, Clone)]
pub struct RunControl {
    state: Arc<AtomicU8>,
    tick: Duration,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    pub fn new() -> Self {
        Self::with_tick(DEFAULT_TICK)
    }

    pub fn with_tick(tick: Duration) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(RunState::Idle as u8)),
            tick: tick.max(Duration::from_millis(1)),
        }
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn transition(&self, from: RunState, to: RunState) -> Result<(), RunState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(RunState::from_u8)
    }

    /// Idle → Scanning.
    pub fn begin_scan(&self) -> Result<(), FollowScoutError> {
        self.transition(RunState::Idle, RunState::Scanning)
            .map_err(|current| FollowScoutError::Busy(current.to_string()))
    }

    /// Scanning → Idle. A no-op if a Stop already returned the state to Idle.
    pub fn end_scan(&self) {
        let _ = self.transition(RunState::Scanning, RunState::Idle);
    }

    /// Idle → Following.
    pub fn begin_following(&self) -> Result<(), FollowScoutError> {
        self.transition(RunState::Idle, RunState::Following)
            .map_err(|current| FollowScoutError::Busy(current.to_string()))
    }

    /// Return to Idle at the end of a run, whatever the state.
    pub fn finish(&self) {
        self.state.store(RunState::Idle as u8, Ordering::SeqCst);
    }

    /// Following ↔ Paused. During a scan a pause is a stop. Returns the new state.
    pub fn pause_resume(&self) -> RunState {
        loop {
            let current = self.state();
            let next = match current {
                RunState::Following => RunState::Paused,
                RunState::Paused => RunState::Following,
                RunState::Scanning => RunState::Idle,
                RunState::Idle => return RunState::Idle,
            };
            if self.transition(current, next).is_ok() {
                return next;
            }
        }
    }

    /// Force Idle. Returns the state that was stopped.
    pub fn stop(&self) -> RunState {
        RunState::from_u8(self.state.swap(RunState::Idle as u8, Ordering::SeqCst))
    }

    /// Sleep `total` in ticks while the state stays `guard`. `on_tick` gets the time
    /// left after each tick.
    pub async fn wait(
        &self,
        total: Duration,
        guard: RunState,
        mut on_tick: impl FnMut(Duration),
    ) -> WaitOutcome {
        let mut remaining = total;
        loop {
            let state = self.state();
            if state != guard {
                return WaitOutcome::Interrupted { remaining, state };
            }
            if remaining.is_zero() {
                return WaitOutcome::Completed;
            }
            let step = remaining.min(self.tick);
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
            on_tick(remaining);
        }
    }

    /// Block while Paused. Returns the state that ended the pause.
    pub async fn wait_while_paused(&self) -> RunState {
        loop {
            let state = self.state();
            if state != RunState::Paused {
                return state;
            }
            tokio::time::sleep(self.tick).await;
        }
    }
}
