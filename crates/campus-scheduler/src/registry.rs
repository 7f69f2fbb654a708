use std::collections::HashMap;
use std::time::Duration;

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info};

/// Longest delay the tokio timer wheel can represent (2^36 - 1 ms, about 2.2 years).
pub const MAX_TIMER_DELAY: Duration = Duration::from_millis((1 << 36) - 1);

/// Posted to the engine when an armed timer elapses.
///
/// `generation` identifies the arm call that produced the timer, so a message
/// that raced with a later disarm or re-arm can be recognised and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub task_id: String,
    pub generation: u64,
}

/// Result of an [`TimerRegistry::arm`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    /// A timer is now pending for the task.
    Armed { generation: u64 },
    /// The instant is not strictly in the future; nothing was armed.
    NotDue,
    /// The delay exceeds the registry's horizon; the next bootstrap will arm it.
    BeyondHorizon,
}

/// Task ID → cancelable delayed action.
///
/// At most one timer exists per task ID; arming always replaces.
pub trait TimerRegistry: Send {
    /// Cancel any timer for `task_id`, then arm a new one `delay` from now
    /// if `delay` is positive and within the horizon.
    fn arm(&mut self, task_id: &str, delay: chrono::Duration) -> ArmOutcome;

    /// Cancel and forget the timer for `task_id`. Returns whether one existed.
    fn disarm(&mut self, task_id: &str) -> bool;

    /// Cancel every timer. Returns how many were pending.
    fn disarm_all(&mut self) -> usize;

    /// Consume the entry behind a fired timer.
    ///
    /// Returns `false` when the entry is gone or belongs to a newer arm call,
    /// in which case the message is stale and must be ignored.
    fn take_fired(&mut self, fired: &TimerFired) -> bool;

    /// IDs of tasks with a pending timer, sorted.
    fn armed_ids(&self) -> Vec<String>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Registry backed by one sleeping tokio task per armed timer.
///
/// Elapsed timers post a [`TimerFired`] on `fired_tx`; they never touch task
/// state themselves. Must be used from within a tokio runtime.
pub struct TokioTimerRegistry {
    timers: HashMap<String, ArmedTimer>,
    fired_tx: mpsc::UnboundedSender<TimerFired>,
    max_delay: Duration,
    next_generation: u64,
}

impl TokioTimerRegistry {
    /// `max_delay` is capped at [`MAX_TIMER_DELAY`].
    pub fn new(fired_tx: mpsc::UnboundedSender<TimerFired>, max_delay: Duration) -> Self {
        Self {
            timers: HashMap::new(),
            fired_tx,
            max_delay: max_delay.min(MAX_TIMER_DELAY),
            next_generation: 0,
        }
    }
}

impl TimerRegistry for TokioTimerRegistry {
    fn arm(&mut self, task_id: &str, delay: chrono::Duration) -> ArmOutcome {
        self.disarm(task_id);

        if delay <= chrono::Duration::zero() {
            return ArmOutcome::NotDue;
        }
        let delay = match delay.to_std() {
            Ok(d) if d <= self.max_delay => d,
            _ => {
                info!(
                    task_id = %task_id,
                    delay_secs = delay.num_seconds(),
                    "due beyond timer horizon; deferred to next bootstrap"
                );
                return ArmOutcome::BeyondHorizon;
            }
        };

        self.next_generation += 1;
        let generation = self.next_generation;
        let fired = TimerFired {
            task_id: task_id.to_string(),
            generation,
        };
        let tx = self.fired_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Closed only when the engine has gone away; nothing left to notify.
            let _ = tx.send(fired);
        });

        debug!(task_id = %task_id, generation, delay_secs = delay.as_secs(), "timer armed");
        self.timers
            .insert(task_id.to_string(), ArmedTimer { generation, handle });
        ArmOutcome::Armed { generation }
    }

    fn disarm(&mut self, task_id: &str) -> bool {
        match self.timers.remove(task_id) {
            Some(timer) => {
                timer.handle.abort();
                debug!(task_id = %task_id, generation = timer.generation, "timer disarmed");
                true
            }
            None => false,
        }
    }

    fn disarm_all(&mut self) -> usize {
        let n = self.timers.len();
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
        n
    }

    fn take_fired(&mut self, fired: &TimerFired) -> bool {
        match self.timers.get(&fired.task_id) {
            Some(timer) if timer.generation == fired.generation => {
                self.timers.remove(&fired.task_id);
                true
            }
            _ => false,
        }
    }

    fn armed_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.timers.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn len(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for TokioTimerRegistry {
    fn drop(&mut self) {
        self.disarm_all();
    }
}
