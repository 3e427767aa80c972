//! Daily Reset
//!
//! Zeroes every metric flagged `reset_daily` once per local day.
//!
//! # Components
//!
//! - [`Schedule`]: When resets fire (local midnight, or a fixed interval)
//! - [`DailyResetScheduler`]: Background task with cancellation and observable state
//! - [`ResetTarget`]: What the scheduler fires against, normally the [`MetricStore`](crate::MetricStore)

mod schedule;
mod scheduler;
mod traits;

pub use schedule::{MAX_INTERVAL, MIN_INTERVAL, Schedule, next_midnight};
pub use scheduler::{DailyResetScheduler, SchedulerState};
pub use traits::ResetTarget;
