use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use campus_tasks::{Task, TaskStatus, TaskStore};

use crate::{
    calculator::compute_next,
    clock::Clock,
    error::Result,
    registry::{ArmOutcome, TimerFired, TimerRegistry},
};

/// What [`OccurrenceScheduler::schedule_next_occurrence`] did with a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// A timer is pending for the task's due instant.
    Armed,
    /// The task's repeat rule is not `Custom`.
    NotRepeating,
    /// The due instant is now or in the past.
    NotDue,
    /// Due too far ahead for the registry; left to the next bootstrap.
    BeyondHorizon,
}

/// What handling a fired timer led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    /// The timer had been disarmed or replaced after it elapsed.
    Stale,
    /// The task was deleted before the timer was handled.
    TaskMissing,
    /// The end condition is met; no successor.
    SeriesConcluded,
    /// The successor was committed. `rearmed` is `None` if it could not be re-read.
    Generated {
        successor_id: String,
        rearmed: Option<ScheduleOutcome>,
    },
    /// The store failed; the fired task keeps its repeat rule and nothing is retried.
    Failed { reason: String },
}

/// Arms, disarms and fires occurrence timers for repeating tasks.
///
/// Owns its timer registry; every method takes `&mut self`, so callers must
/// serialise access (the engine does this with a single event loop).
pub struct OccurrenceScheduler {
    store: Arc<dyn TaskStore>,
    registry: Box<dyn TimerRegistry>,
    clock: Arc<dyn Clock>,
}

impl OccurrenceScheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: Box<dyn TimerRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            clock,
        }
    }

    /// Arm a timer for `task`'s own due instant, replacing any existing one.
    ///
    /// Call after creating or updating a task whose repeat rule is `Custom`.
    pub fn schedule_next_occurrence(&mut self, task: &Task) -> ScheduleOutcome {
        self.registry.disarm(&task.id);

        if !task.repeat_config.is_custom() {
            return ScheduleOutcome::NotRepeating;
        }

        let trigger = task.due_at();
        let delay = trigger - self.clock.now();
        match self.registry.arm(&task.id, delay) {
            ArmOutcome::Armed { .. } => {
                info!(
                    task_id = %task.id,
                    title = %task.title,
                    due = %trigger,
                    in_secs = delay.num_seconds(),
                    "occurrence scheduled"
                );
                ScheduleOutcome::Armed
            }
            ArmOutcome::NotDue => {
                debug!(task_id = %task.id, due = %trigger, "due instant not in the future; not armed");
                ScheduleOutcome::NotDue
            }
            ArmOutcome::BeyondHorizon => ScheduleOutcome::BeyondHorizon,
        }
    }

    /// Cancel the pending timer for `task_id`, if any.
    ///
    /// Call before applying any update or delete to the task.
    pub fn cancel_job_for_task(&mut self, task_id: &str) -> bool {
        let cancelled = self.registry.disarm(task_id);
        if cancelled {
            info!(task_id = %task_id, "scheduled occurrence cancelled");
        }
        cancelled
    }

    /// Handle a timer-fired message: drop it if stale, otherwise reload the
    /// task from the store and fire it.
    pub async fn on_fire(&mut self, fired: TimerFired) -> FireOutcome {
        if !self.registry.take_fired(&fired) {
            debug!(task_id = %fired.task_id, generation = fired.generation, "stale timer ignored");
            return FireOutcome::Stale;
        }

        match self.store.find_task(&fired.task_id).await {
            Ok(Some(task)) => self.fire(&task).await,
            Ok(None) => {
                warn!(task_id = %fired.task_id, "fired task no longer exists");
                FireOutcome::TaskMissing
            }
            Err(e) => {
                error!(task_id = %fired.task_id, error = %e, "could not load fired task");
                FireOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Generate the occurrence after `task`, retire `task`, and arm the successor.
    ///
    /// Any timer still registered for `task` is consumed first, whatever the outcome.
    pub async fn fire(&mut self, task: &Task) -> FireOutcome {
        self.registry.disarm(&task.id);
        info!(task_id = %task.id, title = %task.title, "generating next occurrence");

        let Some(next_due) = compute_next(task) else {
            info!(task_id = %task.id, "end condition met; series concluded");
            return FireOutcome::SeriesConcluded;
        };

        let Some(successor) = build_successor(
            task,
            Uuid::new_v4().to_string(),
            next_due,
            self.clock.timestamp(),
        ) else {
            warn!(
                task_id = %task.id,
                occurrence = task.occurrence_count,
                "occurrence count exhausted; series concluded"
            );
            return FireOutcome::SeriesConcluded;
        };

        if let Err(e) = self.store.generate_successor(&successor, &task.id).await {
            error!(
                task_id = %task.id,
                error = %e,
                "occurrence transaction rolled back; series halted until manual recovery"
            );
            return FireOutcome::Failed {
                reason: e.to_string(),
            };
        }
        info!(
            task_id = %task.id,
            successor_id = %successor.id,
            due = %next_due,
            occurrence = successor.occurrence_count,
            "next occurrence created"
        );

        let rearmed = match self.store.find_task(&successor.id).await {
            Ok(Some(created)) => Some(self.schedule_next_occurrence(&created)),
            Ok(None) => {
                error!(successor_id = %successor.id, "committed successor not found on re-read");
                None
            }
            Err(e) => {
                error!(successor_id = %successor.id, error = %e, "could not re-read successor");
                None
            }
        };

        FireOutcome::Generated {
            successor_id: successor.id,
            rearmed,
        }
    }

    /// Rebuild every timer from the store.
    ///
    /// Clears the registry, then schedules each `Custom` task due today or
    /// later. A task that had a timer before the clear and is no longer in
    /// the future fired without being handled yet; it is fired here, and the
    /// queued message for it becomes stale. Returns the number of timers
    /// armed. A failed scan leaves the registry empty.
    pub async fn initialize(&mut self) -> Result<usize> {
        let previously_armed: HashSet<String> = self.registry.armed_ids().into_iter().collect();
        let cleared = self.registry.disarm_all();
        if cleared > 0 {
            debug!(count = cleared, "cleared existing timers before bootstrap");
        }

        let today = self.clock.now().date();
        let tasks = self.store.find_tasks_with_active_custom_repeat(today).await?;

        let mut armed = 0;
        let mut deferred = 0;
        let mut fired = 0;
        for task in &tasks {
            match self.schedule_next_occurrence(task) {
                ScheduleOutcome::Armed => armed += 1,
                ScheduleOutcome::BeyondHorizon => deferred += 1,
                ScheduleOutcome::NotDue if previously_armed.contains(&task.id) => {
                    info!(task_id = %task.id, "timer elapsed before bootstrap; firing now");
                    fired += 1;
                    if let FireOutcome::Generated {
                        rearmed: Some(ScheduleOutcome::Armed),
                        ..
                    } = self.fire(task).await
                    {
                        armed += 1;
                    }
                }
                ScheduleOutcome::NotRepeating | ScheduleOutcome::NotDue => {}
            }
        }

        info!(found = tasks.len(), armed, deferred, fired, "scheduler bootstrap complete");
        Ok(armed)
    }

    /// IDs of tasks with a pending timer.
    pub fn armed_ids(&self) -> Vec<String> {
        self.registry.armed_ids()
    }

    /// Cancel every pending timer.
    pub fn shutdown(&mut self) -> usize {
        self.registry.disarm_all()
    }
}

/// The task that follows `task` in its series, due at `due`.
///
/// Copies the assignment and repeat rule; resets status and submission state.
/// `None` when the occurrence count cannot be incremented.
pub fn build_successor(
    task: &Task,
    id: String,
    due: NaiveDateTime,
    created_at: String,
) -> Option<Task> {
    let occurrence_count = task.occurrence_count.checked_add(1)?;
    Some(Task {
        id,
        title: task.title.clone(),
        description: task.description.clone(),
        due_date: due.date(),
        due_time: due.time(),
        priority: task.priority,
        status: TaskStatus::NotStarted,
        created_at,
        attachment_required: task.attachment_required,
        text_submission_required: task.text_submission_required,
        submission_text: String::new(),
        assigned_to: task.assigned_to.clone(),
        tagged_members: task.tagged_members.clone(),
        repeat_config: task.repeat_config,
        occurrence_count,
        attachments: Vec::new(),
        generator_task_id: Some(task.series_id().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::num::NonZeroU32;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use campus_tasks::{
        Attachment, EndCondition, Frequency, Priority, RepeatConfig, TaskStoreError,
    };
    use chrono::{Duration, NaiveDate};

    use crate::clock::ManualClock;
    use crate::registry::{TokioTimerRegistry, MAX_TIMER_DELAY};

    #[derive(Default)]
    struct MemoryStore {
        tasks: Mutex<HashMap<String, Task>>,
        fail_transactions: Mutex<bool>,
        fail_scans: Mutex<bool>,
    }

    impl MemoryStore {
        fn with(tasks: Vec<Task>) -> Arc<Self> {
            let store = Self::default();
            {
                let mut map = store.tasks.lock().unwrap();
                for t in tasks {
                    map.insert(t.id.clone(), t);
                }
            }
            Arc::new(store)
        }

        fn get(&self, id: &str) -> Option<Task> {
            self.tasks.lock().unwrap().get(id).cloned()
        }

        fn len(&self) -> usize {
            self.tasks.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TaskStore for MemoryStore {
        async fn find_task(&self, id: &str) -> campus_tasks::Result<Option<Task>> {
            Ok(self.get(id))
        }

        async fn find_tasks_with_active_custom_repeat(
            &self,
            since: NaiveDate,
        ) -> campus_tasks::Result<Vec<Task>> {
            if *self.fail_scans.lock().unwrap() {
                return Err(TaskStoreError::Unavailable("database locked".into()));
            }
            Ok(self
                .tasks
                .lock()
                .unwrap()
                .values()
                .filter(|t| t.repeat_config.is_custom() && t.due_date >= since)
                .cloned()
                .collect())
        }

        async fn generate_successor(
            &self,
            successor: &Task,
            retire_id: &str,
        ) -> campus_tasks::Result<()> {
            if *self.fail_transactions.lock().unwrap() {
                return Err(TaskStoreError::Unavailable("disk full".into()));
            }
            let mut map = self.tasks.lock().unwrap();
            match map.get_mut(retire_id) {
                Some(t) if t.repeat_config.is_custom() => t.repeat_config = RepeatConfig::None,
                _ => {
                    return Err(TaskStoreError::Conflict {
                        id: retire_id.to_string(),
                    })
                }
            }
            map.insert(successor.id.clone(), successor.clone());
            Ok(())
        }
    }

    /// Records arms instead of spawning timers.
    #[derive(Default)]
    struct FakeRegistry {
        armed: HashMap<String, u64>,
        next_generation: u64,
        horizon: Option<Duration>,
    }

    impl TimerRegistry for FakeRegistry {
        fn arm(&mut self, task_id: &str, delay: Duration) -> ArmOutcome {
            self.disarm(task_id);
            if delay <= Duration::zero() {
                return ArmOutcome::NotDue;
            }
            if self.horizon.is_some_and(|h| delay > h) {
                return ArmOutcome::BeyondHorizon;
            }
            self.next_generation += 1;
            self.armed.insert(task_id.to_string(), self.next_generation);
            ArmOutcome::Armed {
                generation: self.next_generation,
            }
        }

        fn disarm(&mut self, task_id: &str) -> bool {
            self.armed.remove(task_id).is_some()
        }

        fn disarm_all(&mut self) -> usize {
            let n = self.armed.len();
            self.armed.clear();
            n
        }

        fn take_fired(&mut self, fired: &TimerFired) -> bool {
            if self.armed.get(&fired.task_id) == Some(&fired.generation) {
                self.armed.remove(&fired.task_id);
                true
            } else {
                false
            }
        }

        fn armed_ids(&self) -> Vec<String> {
            let mut ids: Vec<String> = self.armed.keys().cloned().collect();
            ids.sort();
            ids
        }

        fn len(&self) -> usize {
            self.armed.len()
        }
    }

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hh, mm, 0)
            .unwrap()
    }

    fn monthly(end_condition: EndCondition) -> RepeatConfig {
        RepeatConfig::Custom {
            interval: NonZeroU32::MIN,
            frequency: Frequency::Months,
            end_condition,
        }
    }

    fn task(id: &str, due: NaiveDateTime, repeat: RepeatConfig) -> Task {
        Task {
            id: id.to_string(),
            title: "Staff meeting notes".to_string(),
            description: "upload minutes".to_string(),
            due_date: due.date(),
            due_time: due.time(),
            priority: Priority::High,
            status: TaskStatus::Completed,
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
            attachment_required: true,
            text_submission_required: true,
            submission_text: "done".to_string(),
            assigned_to: vec!["staff-7".to_string()],
            tagged_members: vec!["staff-8".to_string()],
            repeat_config: repeat,
            occurrence_count: 0,
            attachments: vec![Attachment {
                name: "minutes.pdf".to_string(),
                path: "/public/attachments/tasks/minutes.pdf".to_string(),
            }],
            generator_task_id: None,
        }
    }

    fn scheduler(store: Arc<MemoryStore>, now: NaiveDateTime) -> OccurrenceScheduler {
        OccurrenceScheduler::new(
            store,
            Box::new(FakeRegistry::default()),
            Arc::new(ManualClock::new(now)),
        )
    }

    #[test]
    fn non_custom_task_is_never_armed() {
        let now = at(2024, 1, 1, 0, 0);
        let mut s = scheduler(MemoryStore::with(vec![]), now);
        let t = task("t-1", at(2024, 6, 1, 9, 0), RepeatConfig::None);
        assert_eq!(s.schedule_next_occurrence(&t), ScheduleOutcome::NotRepeating);
        assert!(s.armed_ids().is_empty());
    }

    #[test]
    fn only_strictly_future_instants_are_armed() {
        let now = at(2024, 1, 1, 9, 0);
        let mut s = scheduler(MemoryStore::with(vec![]), now);
        let repeat = monthly(EndCondition::None);

        assert_eq!(
            s.schedule_next_occurrence(&task("past", at(2023, 12, 31, 9, 0), repeat)),
            ScheduleOutcome::NotDue
        );
        assert_eq!(
            s.schedule_next_occurrence(&task("present", now, repeat)),
            ScheduleOutcome::NotDue
        );
        assert_eq!(
            s.schedule_next_occurrence(&task("future", at(2024, 1, 1, 9, 1), repeat)),
            ScheduleOutcome::Armed
        );
        assert_eq!(s.armed_ids(), vec!["future".to_string()]);
    }

    #[test]
    fn rescheduling_same_task_keeps_one_timer() {
        let now = at(2024, 1, 1, 0, 0);
        let mut s = scheduler(MemoryStore::with(vec![]), now);
        let mut t = task("t-1", at(2024, 2, 1, 9, 0), monthly(EndCondition::None));
        s.schedule_next_occurrence(&t);
        t.due_date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        s.schedule_next_occurrence(&t);
        assert_eq!(s.armed_ids(), vec!["t-1".to_string()]);

        // Moving the task into the past removes the old timer too.
        t.due_date = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
        assert_eq!(s.schedule_next_occurrence(&t), ScheduleOutcome::NotDue);
        assert!(s.armed_ids().is_empty());
    }

    #[test]
    fn cancel_disarms_and_is_idempotent() {
        let now = at(2024, 1, 1, 0, 0);
        let mut s = scheduler(MemoryStore::with(vec![]), now);
        s.schedule_next_occurrence(&task("t-1", at(2024, 2, 1, 9, 0), monthly(EndCondition::None)));
        assert!(s.cancel_job_for_task("t-1"));
        assert!(!s.cancel_job_for_task("t-1"));
        assert!(s.armed_ids().is_empty());
    }

    #[tokio::test]
    async fn firing_month_end_task_creates_clamped_successor() {
        let t1 = task("T1", at(2024, 3, 31, 23, 59), monthly(EndCondition::None));
        let store = MemoryStore::with(vec![t1.clone()]);
        let mut s = scheduler(Arc::clone(&store), at(2024, 3, 31, 23, 59));

        let outcome = s.fire(&t1).await;
        let FireOutcome::Generated {
            successor_id,
            rearmed,
        } = outcome
        else {
            panic!("expected a successor, got {outcome:?}");
        };
        assert_eq!(rearmed, Some(ScheduleOutcome::Armed));
        assert_eq!(s.armed_ids(), vec![successor_id.clone()]);

        let t2 = store.get(&successor_id).unwrap();
        assert_eq!(t2.due_at(), at(2024, 4, 30, 23, 59));
        assert_eq!(t2.occurrence_count, 1);
        assert_eq!(t2.generator_task_id.as_deref(), Some("T1"));
        assert_eq!(t2.repeat_config, t1.repeat_config);
        assert_eq!(t2.status, TaskStatus::NotStarted);
        assert!(t2.submission_text.is_empty());
        assert!(t2.attachments.is_empty());
        assert_eq!(t2.title, t1.title);
        assert_eq!(t2.priority, Priority::High);
        assert_eq!(t2.assigned_to, t1.assigned_to);
        assert_eq!(t2.tagged_members, t1.tagged_members);
        assert!(t2.attachment_required && t2.text_submission_required);

        let retired = store.get("T1").unwrap();
        assert_eq!(retired.repeat_config, RepeatConfig::None);
        assert_eq!(retired.submission_text, "done");
    }

    #[tokio::test]
    async fn series_chain_points_at_first_task() {
        let t1 = task("T1", at(2024, 1, 10, 8, 0), monthly(EndCondition::None));
        let store = MemoryStore::with(vec![t1.clone()]);
        let mut s = scheduler(Arc::clone(&store), at(2024, 1, 1, 0, 0));

        let mut current = t1;
        let mut ids = vec![current.id.clone()];
        for expected_count in 1..=3 {
            let FireOutcome::Generated { successor_id, .. } = s.fire(&current).await else {
                panic!("series should continue");
            };
            current = store.get(&successor_id).unwrap();
            assert_eq!(current.occurrence_count, expected_count);
            assert_eq!(current.generator_task_id.as_deref(), Some("T1"));
            ids.push(successor_id);
        }
        // Only the newest occurrence is still live.
        for id in &ids[..3] {
            assert_eq!(store.get(id).unwrap().repeat_config, RepeatConfig::None);
        }
        assert!(store.get(&ids[3]).unwrap().repeat_config.is_custom());
    }

    #[tokio::test]
    async fn after_count_concludes_series() {
        let mut last = task("T4", at(2024, 4, 10, 8, 0), monthly(EndCondition::After(3)));
        last.occurrence_count = 3;
        last.generator_task_id = Some("T1".into());
        let store = MemoryStore::with(vec![last.clone()]);
        let mut s = scheduler(Arc::clone(&store), at(2024, 4, 10, 8, 0));

        assert_eq!(s.fire(&last).await, FireOutcome::SeriesConcluded);
        assert_eq!(store.len(), 1);
        assert!(store.get("T4").unwrap().repeat_config.is_custom());
    }

    #[tokio::test]
    async fn failed_transaction_keeps_repeat_rule_and_does_not_rearm() {
        let t1 = task("T1", at(2024, 3, 31, 23, 59), monthly(EndCondition::None));
        let store = MemoryStore::with(vec![t1.clone()]);
        *store.fail_transactions.lock().unwrap() = true;
        let mut s = scheduler(Arc::clone(&store), at(2024, 3, 1, 0, 0));
        s.schedule_next_occurrence(&t1);

        let outcome = s.fire(&t1).await;
        assert!(matches!(outcome, FireOutcome::Failed { .. }));
        assert_eq!(store.len(), 1);
        assert!(store.get("T1").unwrap().repeat_config.is_custom());
        assert!(s.armed_ids().is_empty(), "fired timer is consumed, nothing re-armed");
    }

    #[tokio::test]
    async fn stale_fire_message_does_nothing() {
        let t1 = task("T1", at(2024, 3, 31, 23, 59), monthly(EndCondition::None));
        let store = MemoryStore::with(vec![t1.clone()]);
        let mut s = scheduler(Arc::clone(&store), at(2024, 3, 1, 0, 0));
        s.schedule_next_occurrence(&t1);
        s.cancel_job_for_task("T1");

        let outcome = s
            .on_fire(TimerFired {
                task_id: "T1".into(),
                generation: 1,
            })
            .await;
        assert_eq!(outcome, FireOutcome::Stale);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn on_fire_reloads_task_from_store() {
        let t1 = task("T1", at(2024, 3, 31, 23, 59), monthly(EndCondition::None));
        let store = MemoryStore::with(vec![t1.clone()]);
        let mut s = scheduler(Arc::clone(&store), at(2024, 3, 1, 0, 0));
        assert_eq!(s.schedule_next_occurrence(&t1), ScheduleOutcome::Armed);

        // Deleted between arming and firing, without a cancel.
        store.tasks.lock().unwrap().clear();
        let outcome = s
            .on_fire(TimerFired {
                task_id: "T1".into(),
                generation: 1,
            })
            .await;
        assert_eq!(outcome, FireOutcome::TaskMissing);
        assert!(s.armed_ids().is_empty());
    }

    #[tokio::test]
    async fn bootstrap_arms_only_future_custom_tasks() {
        let now = at(2030, 1, 1, 12, 0);
        let repeat = monthly(EndCondition::None);
        let store = MemoryStore::with(vec![
            task("future-1", at(2030, 1, 2, 9, 0), repeat),
            task("future-2", at(2030, 2, 1, 9, 0), repeat),
            task("later-today", at(2030, 1, 1, 18, 0), repeat),
            task("earlier-today", at(2030, 1, 1, 8, 0), repeat),
            task("past", at(2029, 12, 1, 9, 0), repeat),
            task("one-off", at(2030, 3, 1, 9, 0), RepeatConfig::None),
        ]);
        let mut s = scheduler(store, now);

        assert_eq!(s.initialize().await.unwrap(), 3);
        assert_eq!(
            s.armed_ids(),
            vec![
                "future-1".to_string(),
                "future-2".to_string(),
                "later-today".to_string()
            ]
        );
        // Re-running starts from a clean registry.
        assert_eq!(s.initialize().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn bootstrap_skips_tasks_beyond_horizon() {
        let now = at(2030, 1, 1, 0, 0);
        let repeat = monthly(EndCondition::None);
        let store = MemoryStore::with(vec![
            task("soon", at(2030, 1, 5, 9, 0), repeat),
            task("far", at(2031, 1, 5, 9, 0), repeat),
        ]);
        let registry = FakeRegistry {
            horizon: Some(Duration::days(30)),
            ..Default::default()
        };
        let mut s =
            OccurrenceScheduler::new(store, Box::new(registry), Arc::new(ManualClock::new(now)));

        assert_eq!(s.initialize().await.unwrap(), 1);
        assert_eq!(s.armed_ids(), vec!["soon".to_string()]);
    }

    #[test]
    fn successor_of_successor_keeps_series_head() {
        let mut t2 = task("T2", at(2024, 4, 30, 23, 59), monthly(EndCondition::None));
        t2.generator_task_id = Some("T1".into());
        t2.occurrence_count = 1;
        let t3 = build_successor(&t2, "T3".into(), at(2024, 5, 30, 23, 59), "now".into()).unwrap();
        assert_eq!(t3.generator_task_id.as_deref(), Some("T1"));
        assert_eq!(t3.occurrence_count, 2);
    }

    #[test]
    fn successor_count_does_not_overflow() {
        let mut t = task("T1", at(2024, 3, 31, 23, 59), monthly(EndCondition::None));
        t.occurrence_count = u32::MAX;
        assert!(build_successor(&t, "T2".into(), at(2024, 4, 30, 23, 59), "now".into()).is_none());
    }

    #[tokio::test]
    async fn exhausted_occurrence_count_concludes_series() {
        let mut t1 = task("T1", at(2024, 3, 31, 23, 59), monthly(EndCondition::None));
        t1.occurrence_count = u32::MAX;
        let store = MemoryStore::with(vec![t1.clone()]);
        let mut s = scheduler(Arc::clone(&store), at(2024, 3, 1, 0, 0));
        assert_eq!(s.schedule_next_occurrence(&t1), ScheduleOutcome::Armed);

        let outcome = s
            .on_fire(TimerFired {
                task_id: "T1".into(),
                generation: 1,
            })
            .await;
        assert_eq!(outcome, FireOutcome::SeriesConcluded);
        assert_eq!(store.len(), 1);
        assert!(store.get("T1").unwrap().repeat_config.is_custom());
        assert!(s.armed_ids().is_empty());

        // The scheduler keeps working afterwards.
        let t2 = task("T2", at(2024, 5, 1, 9, 0), monthly(EndCondition::None));
        assert_eq!(s.schedule_next_occurrence(&t2), ScheduleOutcome::Armed);
    }

    #[tokio::test]
    async fn successor_created_at_comes_from_clock() {
        let t1 = task("T1", at(2024, 3, 31, 23, 59), monthly(EndCondition::None));
        let store = MemoryStore::with(vec![t1.clone()]);
        let mut s = scheduler(Arc::clone(&store), at(2024, 3, 31, 23, 59));

        let FireOutcome::Generated { successor_id, .. } = s.fire(&t1).await else {
            panic!("series should continue");
        };
        assert_eq!(
            store.get(&successor_id).unwrap().created_at,
            "2024-03-31T23:59:00+00:00"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn bootstrap_fires_timer_that_elapsed_before_it_was_handled() {
        let due = at(2024, 3, 31, 23, 59);
        let t1 = task("T1", due, monthly(EndCondition::None));
        let store = MemoryStore::with(vec![t1.clone()]);
        let clock = Arc::new(ManualClock::new(due - Duration::seconds(5)));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut s = OccurrenceScheduler::new(
            Arc::clone(&store) as Arc<dyn TaskStore>,
            Box::new(TokioTimerRegistry::new(tx, MAX_TIMER_DELAY)),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        assert_eq!(s.schedule_next_occurrence(&t1), ScheduleOutcome::Armed);

        // The timer elapses and posts its message, but a rehydrate runs first.
        let fired = rx.recv().await.expect("timer should fire");
        clock.set(due + Duration::seconds(1));
        assert_eq!(s.initialize().await.unwrap(), 1);

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("T1").unwrap().repeat_config, RepeatConfig::None);
        let armed = s.armed_ids();
        assert_eq!(armed.len(), 1);
        assert!(!armed.contains(&"T1".to_string()));

        // The queued message is now stale and cannot generate a second successor.
        assert_eq!(s.on_fire(fired).await, FireOutcome::Stale);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn bootstrap_scan_failure_leaves_registry_empty_but_usable() {
        let repeat = monthly(EndCondition::None);
        let store = MemoryStore::with(vec![task("a", at(2030, 1, 2, 9, 0), repeat)]);
        let mut s = scheduler(Arc::clone(&store), at(2030, 1, 1, 0, 0));
        s.schedule_next_occurrence(&task("old", at(2030, 1, 3, 9, 0), repeat));

        *store.fail_scans.lock().unwrap() = true;
        assert!(s.initialize().await.is_err());
        assert!(s.armed_ids().is_empty());

        let later = task("b", at(2030, 2, 1, 9, 0), repeat);
        assert_eq!(s.schedule_next_occurrence(&later), ScheduleOutcome::Armed);
        assert_eq!(s.armed_ids(), vec!["b".to_string()]);

        *store.fail_scans.lock().unwrap() = false;
        assert_eq!(s.initialize().await.unwrap(), 1);
    }
}
