use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use campus_core::config::SchedulerConfig;
use campus_tasks::{Task, TaskStore};

use crate::{
    clock::{Clock, SystemClock},
    error::{Result, SchedulerError},
    registry::{TimerFired, TokioTimerRegistry, MAX_TIMER_DELAY},
    scheduler::{FireOutcome, OccurrenceScheduler, ScheduleOutcome},
};

const COMMAND_QUEUE: usize = 256;

/// Runtime knobs for [`SchedulerEngine`].
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Timezone that stored due dates and times are written in.
    pub reference_offset: FixedOffset,
    /// Timers further out than this are not armed.
    pub max_timer_delay: Duration,
    /// Re-run the bootstrap on this period, if set.
    pub rehydrate_every: Option<Duration>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            reference_offset: Utc.fix(),
            max_timer_delay: MAX_TIMER_DELAY,
            rehydrate_every: None,
        }
    }
}

impl SchedulerSettings {
    pub fn from_config(cfg: &SchedulerConfig) -> campus_core::Result<Self> {
        Ok(Self {
            reference_offset: cfg.reference_offset()?,
            max_timer_delay: cfg
                .max_timer_delay_secs
                .map_or(MAX_TIMER_DELAY, |secs| {
                    Duration::from_secs(secs).min(MAX_TIMER_DELAY)
                }),
            rehydrate_every: cfg
                .rehydrate_interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        })
    }
}

enum SchedulerCommand {
    Schedule {
        task: Box<Task>,
        reply: oneshot::Sender<ScheduleOutcome>,
    },
    Cancel {
        task_id: String,
        reply: oneshot::Sender<bool>,
    },
    Initialize {
        reply: oneshot::Sender<Result<usize>>,
    },
    Armed {
        reply: oneshot::Sender<Vec<String>>,
    },
}

/// Cloneable front door to a running [`SchedulerEngine`].
///
/// Every call is queued behind whatever the engine is doing, including an
/// in-flight fire transaction, and resolves once the engine has applied it.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Arm (or re-arm) the timer for `task`'s due instant.
    pub async fn schedule(&self, task: &Task) -> Result<ScheduleOutcome> {
        let task = Box::new(task.clone());
        self.request(|reply| SchedulerCommand::Schedule { task, reply })
            .await
    }

    /// Cancel the pending timer for `task_id`. Returns whether one existed.
    pub async fn cancel(&self, task_id: &str) -> Result<bool> {
        let task_id = task_id.to_string();
        self.request(|reply| SchedulerCommand::Cancel { task_id, reply })
            .await
    }

    /// Drop every timer and rebuild them from the store.
    pub async fn initialize(&self) -> Result<usize> {
        self.request(|reply| SchedulerCommand::Initialize { reply })
            .await?
    }

    /// IDs of tasks with a pending timer, sorted.
    pub async fn armed(&self) -> Result<Vec<String>> {
        self.request(|reply| SchedulerCommand::Armed { reply })
            .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SchedulerCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| SchedulerError::EngineStopped)?;
        rx.await.map_err(|_| SchedulerError::EngineStopped)
    }
}

/// Owns the occurrence scheduler and serialises everything that touches it:
/// handle commands, fired timers and periodic rehydration.
pub struct SchedulerEngine {
    scheduler: OccurrenceScheduler,
    commands: mpsc::Receiver<SchedulerCommand>,
    fired: mpsc::UnboundedReceiver<TimerFired>,
    rehydrate_every: Option<Duration>,
}

impl SchedulerEngine {
    /// Build an engine reading "now" from the system clock in the reference offset.
    pub fn new(store: Arc<dyn TaskStore>, settings: SchedulerSettings) -> (Self, SchedulerHandle) {
        let clock = Arc::new(SystemClock::new(settings.reference_offset));
        Self::with_clock(store, settings, clock)
    }

    pub fn with_clock(
        store: Arc<dyn TaskStore>,
        settings: SchedulerSettings,
        clock: Arc<dyn Clock>,
    ) -> (Self, SchedulerHandle) {
        let (tx, commands) = mpsc::channel(COMMAND_QUEUE);
        let (fired_tx, fired) = mpsc::unbounded_channel();
        let registry = TokioTimerRegistry::new(fired_tx, settings.max_timer_delay);

        let engine = Self {
            scheduler: OccurrenceScheduler::new(store, Box::new(registry), clock),
            commands,
            fired,
            rehydrate_every: settings.rehydrate_every,
        };
        (engine, SchedulerHandle { tx })
    }

    /// Main event loop. Bootstraps timers from the store, then runs until
    /// `shutdown` broadcasts `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let Self {
            mut scheduler,
            mut commands,
            mut fired,
            rehydrate_every,
        } = self;
        info!("scheduler engine started");

        if let Err(e) = scheduler.initialize().await {
            error!(error = %e, "scheduler bootstrap failed; repeating tasks stay unarmed");
        }

        let mut rehydrate = rehydrate_every.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        loop {
            tokio::select! {
                Some(cmd) = commands.recv() => {
                    handle_command(&mut scheduler, cmd).await;
                }
                Some(msg) = fired.recv() => {
                    let task_id = msg.task_id.clone();
                    match scheduler.on_fire(msg).await {
                        FireOutcome::Failed { reason } => {
                            error!(task_id = %task_id, %reason, "occurrence generation failed");
                        }
                        outcome => debug!(task_id = %task_id, ?outcome, "timer handled"),
                    }
                }
                _ = tick(rehydrate.as_mut()) => {
                    if let Err(e) = scheduler.initialize().await {
                        error!(error = %e, "scheduler rehydrate failed");
                    }
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }

        let cancelled = scheduler.shutdown();
        debug!(count = cancelled, "pending timers cancelled");
    }
}

async fn handle_command(scheduler: &mut OccurrenceScheduler, cmd: SchedulerCommand) {
    // A dropped reply receiver just means the caller stopped waiting.
    match cmd {
        SchedulerCommand::Schedule { task, reply } => {
            let _ = reply.send(scheduler.schedule_next_occurrence(&task));
        }
        SchedulerCommand::Cancel { task_id, reply } => {
            let _ = reply.send(scheduler.cancel_job_for_task(&task_id));
        }
        SchedulerCommand::Initialize { reply } => {
            let _ = reply.send(scheduler.initialize().await);
        }
        SchedulerCommand::Armed { reply } => {
            let _ = reply.send(scheduler.armed_ids());
        }
    }
}

async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
