//! Background task that runs the daily reset.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::reset::{ResetTarget, Schedule};

/// Observable scheduler state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next slot.
    Idle { scheduled_for: DateTime<Local> },
    /// A reset is running.
    Firing,
    /// Cancelled; no further resets will run.
    Stopped,
}

/// Daily reset scheduler.
///
/// Runs one background task that waits for the next slot of its [`Schedule`]
/// or a cancellation, whichever comes first, and calls
/// [`ResetTarget::reset_flagged`] when the slot arrives. Failures are logged
/// and the schedule moves on to the following slot.
///
/// Resets missed while the process was not running are not caught up on
/// start: the first slot is always the next one after "now".
pub struct DailyResetScheduler {
    token: CancellationToken,
    state: watch::Receiver<SchedulerState>,
    handle: Mutex<Option<JoinHandle<()>>>,
    schedule: Schedule,
}

impl std::fmt::Debug for DailyResetScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DailyResetScheduler")
            .field("schedule", &self.schedule)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl DailyResetScheduler {
    /// Spawn the scheduler task on the current tokio runtime.
    ///
    /// The returned scheduler is already `Idle` with its first slot computed.
    pub fn start<T: ResetTarget>(target: T, schedule: Schedule) -> Self {
        let token = CancellationToken::new();
        let first = schedule.next_fire(Local::now(), None);
        let (state_tx, state_rx) = watch::channel(SchedulerState::Idle {
            scheduled_for: first,
        });

        let handle = tokio::spawn(run(
            Arc::new(target),
            schedule,
            first,
            token.clone(),
            state_tx,
        ));

        tracing::info!(%schedule, first = %first, "Daily reset scheduler started");

        Self {
            token,
            state: state_rx,
            handle: Mutex::new(Some(handle)),
            schedule,
        }
    }

    /// The schedule this scheduler follows.
    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// Current state.
    pub fn state(&self) -> SchedulerState {
        self.state.borrow().clone()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.clone()
    }

    /// Request cancellation. Idempotent and non-blocking.
    ///
    /// The task stops at its next cancellation check. A reset already in
    /// progress completes, and one whose slot was reached just before this
    /// call may still start. Use [`shutdown`](Self::shutdown) when no reset
    /// may run after the call returns.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel and wait for the task to exit.
    ///
    /// Once this returns, no further reset will be triggered. Safe to call
    /// more than once.
    pub async fn shutdown(&self) {
        self.token.cancel();

        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "Daily reset scheduler task failed");
        }
    }
}

impl Drop for DailyResetScheduler {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Scheduler loop: `Idle -> Firing -> Idle ...`, exiting to `Stopped`.
async fn run<T: ResetTarget>(
    target: Arc<T>,
    schedule: Schedule,
    first: DateTime<Local>,
    token: CancellationToken,
    state: watch::Sender<SchedulerState>,
) {
    let mut scheduled_for = first;

    loop {
        if !wait_for_slot(&schedule, scheduled_for, &token).await {
            break;
        }

        state.send_replace(SchedulerState::Firing);
        match target.reset_flagged().await {
            Ok(count) => {
                tracing::info!(reset = count, slot = %scheduled_for, "Daily reset completed");
            }
            Err(e) => {
                tracing::error!(error = %e, slot = %scheduled_for, "Daily reset failed");
            }
        }

        scheduled_for = schedule.next_fire(Local::now(), Some(scheduled_for));
        state.send_replace(SchedulerState::Idle { scheduled_for });
        tracing::debug!(next = %scheduled_for, "Next daily reset scheduled");
    }

    state.send_replace(SchedulerState::Stopped);
    tracing::info!("Daily reset scheduler stopped");
}

/// Suspend until `slot` arrives or cancellation is requested.
///
/// Returns `false` on cancellation.
async fn wait_for_slot(
    schedule: &Schedule,
    slot: DateTime<Local>,
    token: &CancellationToken,
) -> bool {
    let mut delay = until(slot, Local::now());

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return false,
            _ = tokio::time::sleep(delay) => {}
        }

        if token.is_cancelled() {
            return false;
        }

        match remaining_after_wake(schedule, slot, Local::now()) {
            None => return true,
            Some(rest) => {
                tracing::debug!(remaining = ?rest, "Woke before reset slot, waiting");
                delay = rest;
            }
        }
    }
}

/// Time still to wait after the timer fired at `now`, or `None` to fire.
///
/// Only wall-clock schedules wait again: the wall clock may have been set
/// back while sleeping, leaving the slot in the future.
fn remaining_after_wake<Tz: TimeZone>(
    schedule: &Schedule,
    slot: DateTime<Tz>,
    now: DateTime<Tz>,
) -> Option<Duration> {
    if !schedule.is_wall_clock() || now >= slot {
        return None;
    }
    Some(until(slot, now))
}

fn until<Tz: TimeZone>(slot: DateTime<Tz>, now: DateTime<Tz>) -> Duration {
    (slot - now).to_std().unwrap_or(Duration::ZERO)
}
