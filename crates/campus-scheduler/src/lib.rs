//! `campus-scheduler`: generates the next occurrence of repeating tasks on time.
//!
//! # Overview
//!
//! Every task whose repeat rule is `Custom` and whose due instant lies in the
//! future owns one armed timer. When the timer fires, the scheduler computes
//! the next due instant, inserts the successor task and retires the fired one
//! in a single store transaction, then arms the successor's timer.
//!
//! | Piece                          | Responsibility                                         |
//! |--------------------------------|--------------------------------------------------------|
//! | [`calculator`]                 | Pure next-occurrence math and end conditions           |
//! | [`registry`]                   | Task ID → cancelable timer                             |
//! | [`scheduler`]                  | Arm/disarm, fire transaction, startup bootstrap        |
//! | [`engine`]                     | Single event loop that serialises all of the above     |
//!
//! Timers only live in memory; after a restart [`SchedulerEngine::run`]
//! rebuilds them from the store.

pub mod calculator;
pub mod clock;
pub mod engine;
pub mod error;
pub mod registry;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{SchedulerEngine, SchedulerHandle, SchedulerSettings};
pub use error::{Result, SchedulerError};
pub use registry::{ArmOutcome, TimerFired, TimerRegistry, TokioTimerRegistry};
pub use scheduler::{FireOutcome, OccurrenceScheduler, ScheduleOutcome};
