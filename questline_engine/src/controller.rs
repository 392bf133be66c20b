//! Progression controller.
//!
//! The controller owns the cursor `(quest, sequence, step)` and the active task
//! list. Each call to [`Controller::tick`] performs one unit of work: resume
//! from an interruption, skip or compile the current step, drive the head task,
//! or move on to the next sequence.
//!
//! Everything is driven from the host's tick thread. [`SharedController`]
//! serializes ticks when a host calls in from more than one thread, and a
//! [`StopSignal`] lets any thread request a stop that the next tick honors.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};
use questline_data::{QuestDef, QuestId, START_SEQUENCE};
use thiserror::Error;
use uuid::Uuid;
use variantly::Variantly;

use crate::config::EngineConfig;
use crate::factory::{StepContext, compile_step};
use crate::skip::{SkipReason, step_skip_reason};
use crate::task::{Task, TaskError, TaskStatus};
use crate::world::{Aid, CombatResolver, WorldFacade, WorldSnapshot};

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Variantly)]
pub enum ControllerState {
    /// No active quest.
    Idle,
    /// Cursor is valid but the current step has no task list yet.
    AwaitingCompilation,
    /// Driving the head of the task list.
    Running,
    /// Suspended by combat, a busy host, or a manual pause.
    Interrupted,
    /// The current sequence is fully consumed.
    Exhausted,
}

/// The single source of truth for where execution is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor {
    pub quest: QuestId,
    pub sequence: u8,
    pub step: usize,
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} seq {} step {}", self.quest, self.sequence, self.step)
    }
}

/// Why the controller is suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    Busy,
    Combat,
    Paused,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickReport {
    Idle,
    Stopped(String),
    Interrupted(Interruption),
    Resumed(Cursor),
    Skipped { cursor: Cursor, reason: SkipReason },
    Compiled { cursor: Cursor, tasks: usize },
    Working(String),
    TaskCompleted(String),
    SequenceAdvanced { from: u8, to: u8 },
    QuestCompleted(QuestId),
}

/// A hard failure that ended a run. The cursor still points at the failing step.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{quest} sequence {sequence} step {step}: {task} failed: {cause}")]
pub struct RunFailure {
    pub quest: QuestId,
    pub sequence: u8,
    pub step: usize,
    pub task: String,
    #[source]
    pub cause: TaskError,
}

impl RunFailure {
    pub fn cursor(&self) -> Cursor {
        Cursor {
            quest: self.quest,
            sequence: self.sequence,
            step: self.step,
        }
    }
}

/// Reasons a quest cannot be selected for execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
    #[error("quest {0} is disabled")]
    Disabled(QuestId),
    #[error("quest {0} has no steps")]
    NoSteps(QuestId),
    #[error("quest {0} has no start sequence")]
    MissingStartSequence(QuestId),
    #[error("quest {quest} has no sequence {sequence}")]
    UnknownSequence { quest: QuestId, sequence: u8 },
    #[error("quest {quest} sequence {sequence} has no step {step}")]
    StepOutOfRange { quest: QuestId, sequence: u8, step: usize },
    #[error("no failed run to resume")]
    NothingToResume,
}

/// Cloneable, thread-safe stop request inspected at the top of each tick.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<Mutex<Option<String>>>);

impl StopSignal {
    pub fn request(&self, reason: impl Into<String>) {
        *self.lock() = Some(reason.into());
    }

    fn take(&self) -> Option<String> {
        self.lock().take()
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The top-level step driver.
pub struct Controller {
    config: EngineConfig,
    state: ControllerState,
    quest: Option<Arc<QuestDef>>,
    cursor: Option<Cursor>,
    tasks: VecDeque<Box<dyn Task>>,
    head_started: bool,
    interruption: Option<Interruption>,
    paused: bool,
    combat: Option<Box<dyn CombatResolver + Send>>,
    combat_engaged: bool,
    stop: StopSignal,
    compilations: usize,
    last_failure: Option<RunFailure>,
    run_id: Option<Uuid>,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("state", &self.state)
            .field("cursor", &self.cursor)
            .field("tasks", &self.tasks.len())
            .field("interruption", &self.interruption)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl Controller {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: ControllerState::Idle,
            quest: None,
            cursor: None,
            tasks: VecDeque::new(),
            head_started: false,
            interruption: None,
            paused: false,
            combat: None,
            combat_engaged: false,
            stop: StopSignal::default(),
            compilations: 0,
            last_failure: None,
            run_id: None,
        }
    }

    /// Hand combat to an external resolver instead of just waiting it out.
    #[must_use]
    pub fn with_combat(mut self, resolver: Box<dyn CombatResolver + Send>) -> Self {
        self.combat = Some(resolver);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn cursor(&self) -> Option<Cursor> {
        self.cursor
    }

    pub fn quest(&self) -> Option<&QuestDef> {
        self.quest.as_deref()
    }

    /// The started, not yet complete task, if any.
    pub fn current_task(&self) -> Option<&dyn Task> {
        if !self.head_started {
            return None;
        }
        self.tasks.front().map(|task| &**task)
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Number of task lists compiled during the current run.
    pub fn compilations(&self) -> usize {
        self.compilations
    }

    pub fn last_failure(&self) -> Option<&RunFailure> {
        self.last_failure.as_ref()
    }

    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Select a quest and position the cursor at its first step.
    ///
    /// # Errors
    /// - if the quest is disabled, has no steps, or lacks a start sequence
    pub fn start(&mut self, quest: Arc<QuestDef>) -> Result<(), SelectError> {
        self.start_at(quest, START_SEQUENCE, 0)
    }

    /// Select a quest and position the cursor at an arbitrary step.
    ///
    /// # Errors
    /// - if the quest cannot run, or the position does not exist
    pub fn start_at(&mut self, quest: Arc<QuestDef>, sequence: u8, step: usize) -> Result<(), SelectError> {
        let id = quest.id;
        if quest.disabled {
            return Err(SelectError::Disabled(id));
        }
        if quest.step_count() == 0 {
            return Err(SelectError::NoSteps(id));
        }
        if quest.sequence(START_SEQUENCE).is_none() {
            return Err(SelectError::MissingStartSequence(id));
        }
        let Some(seq) = quest.sequence(sequence) else {
            return Err(SelectError::UnknownSequence { quest: id, sequence });
        };
        if step >= seq.steps.len() {
            return Err(SelectError::StepOutOfRange {
                quest: id,
                sequence,
                step,
            });
        }

        if let Some(previous) = self.cursor {
            info!("replacing active run at {previous}");
        }
        self.reset();
        if let Some(stale) = self.stop.take() {
            debug!("dropping stop request from the previous run ({stale})");
        }
        let run_id = Uuid::new_v4();
        self.run_id = Some(run_id);
        self.compilations = 0;
        self.last_failure = None;
        self.cursor = Some(Cursor { quest: id, sequence, step });
        self.quest = Some(quest);
        self.state = ControllerState::AwaitingCompilation;
        info!("run {run_id}: starting {id} at sequence {sequence} step {step}");
        Ok(())
    }

    /// Restart at the cursor retained after a hard failure.
    ///
    /// # Errors
    /// - `NothingToResume` unless the last run ended in a failure
    pub fn resume_failed(&mut self) -> Result<(), SelectError> {
        if !self.state.is_idle() || self.quest.is_none() || self.last_failure.is_none() {
            return Err(SelectError::NothingToResume);
        }
        let Some(cursor) = self.cursor else {
            return Err(SelectError::NothingToResume);
        };
        self.last_failure = None;
        self.state = ControllerState::AwaitingCompilation;
        info!("resuming failed run at {cursor}");
        Ok(())
    }

    /// Stop immediately and return to `Idle`. Calling it again is harmless.
    ///
    /// The active task list is dropped without further calls into it.
    pub fn stop(&mut self, reason: &str) {
        self.stop.take();
        if self.state.is_idle() && self.cursor.is_none() {
            debug!("stop ({reason}): already idle");
            return;
        }
        match self.cursor {
            Some(cursor) => info!("stopping at {cursor}: {reason}"),
            None => info!("stopping: {reason}"),
        }
        self.reset();
    }

    /// Suspend the step driver until [`Controller::resume`] is called.
    pub fn pause(&mut self) {
        if !self.state.is_idle() {
            self.paused = true;
        }
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Perform one unit of work.
    ///
    /// # Errors
    /// - `RunFailure` if a task or the step's compilation fails hard; the
    ///   controller is then `Idle` with the cursor left on the failing step
    pub fn tick(&mut self, world: &mut dyn WorldFacade) -> Result<TickReport, RunFailure> {
        if let Some(reason) = self.stop.take() {
            self.stop(&reason);
            return Ok(TickReport::Stopped(reason));
        }

        match self.state {
            ControllerState::Idle => Ok(TickReport::Idle),
            ControllerState::Interrupted => Ok(self.tick_interrupted(world)),
            ControllerState::AwaitingCompilation => self.tick_awaiting(world),
            ControllerState::Running => self.tick_running(world),
            ControllerState::Exhausted => Ok(self.tick_exhausted()),
        }
    }

    fn tick_interrupted(&mut self, world: &mut dyn WorldFacade) -> TickReport {
        let snapshot = world.snapshot();
        let interruption = self.interruption.unwrap_or(Interruption::Paused);
        let still = match interruption {
            Interruption::Paused => self.paused,
            Interruption::Busy => snapshot.busy,
            Interruption::Combat => {
                let resolved = match self.combat.as_mut() {
                    Some(resolver) if self.combat_engaged => resolver.update(world),
                    _ => true,
                };
                !resolved || world.snapshot().in_combat
            },
        };
        if still {
            return TickReport::Interrupted(interruption);
        }

        self.interruption = None;
        self.combat_engaged = false;
        self.state = ControllerState::AwaitingCompilation;
        let Some(cursor) = self.cursor else {
            self.reset();
            return TickReport::Idle;
        };
        info!("{interruption:?} cleared, resuming at {cursor}");
        TickReport::Resumed(cursor)
    }

    fn tick_awaiting(&mut self, world: &mut dyn WorldFacade) -> Result<TickReport, RunFailure> {
        let snapshot = world.snapshot();
        if let Some(interruption) = self.detect_interruption(world, &snapshot, true) {
            return Ok(self.interrupt(interruption, world));
        }

        let (Some(quest), Some(cursor)) = (self.quest.clone(), self.cursor) else {
            self.reset();
            return Ok(TickReport::Idle);
        };
        let Some(sequence) = quest.sequence(cursor.sequence) else {
            warn!("{cursor}: sequence vanished from quest");
            self.state = ControllerState::Exhausted;
            return Ok(TickReport::Working(String::from("sequence lookup")));
        };
        let Some(step) = sequence.steps.get(cursor.step) else {
            self.state = ControllerState::Exhausted;
            return Ok(TickReport::Working(String::from("sequence lookup")));
        };

        if let Some(reason) = step_skip_reason(quest.id, step, &snapshot) {
            info!("skipping {cursor} ({}): {reason}", step.interaction);
            self.advance_step(sequence.steps.len());
            return Ok(TickReport::Skipped { cursor, reason });
        }

        let ctx = StepContext {
            quest: &quest,
            sequence,
            step_index: cursor.step,
            step,
            config: &self.config,
        };
        let tasks = match compile_step(&ctx, world) {
            Ok(tasks) => tasks,
            Err(cause) => return Err(self.fail(format!("compiling {}", step.interaction), cause)),
        };
        self.compilations += 1;
        let count = tasks.len();
        info!("compiled {cursor} ({}) into {count} task(s)", step.interaction);

        if tasks.is_empty() {
            self.advance_step(sequence.steps.len());
        } else {
            self.tasks = tasks.into();
            self.head_started = false;
            self.state = ControllerState::Running;
        }
        Ok(TickReport::Compiled { cursor, tasks: count })
    }

    fn tick_running(&mut self, world: &mut dyn WorldFacade) -> Result<TickReport, RunFailure> {
        let snapshot = world.snapshot();
        if let Some(interruption) = self.detect_interruption(world, &snapshot, !self.head_started) {
            return Ok(self.interrupt(interruption, world));
        }

        let Some(task) = self.tasks.front_mut() else {
            self.finish_task_list();
            return Ok(TickReport::Working(String::new()));
        };
        let label = task.to_string();

        if !self.head_started {
            self.head_started = true;
            debug!("starting {label}");
            if let Err(cause) = task.start(world) {
                return Err(self.fail(label, cause));
            }
        }

        match task.update(world) {
            Ok(TaskStatus::StillRunning) => Ok(TickReport::Working(label)),
            Ok(TaskStatus::Complete) => {
                debug!("completed {label}");
                self.tasks.pop_front();
                self.head_started = false;
                if self.tasks.is_empty() {
                    self.finish_task_list();
                }
                Ok(TickReport::TaskCompleted(label))
            },
            Err(cause) => Err(self.fail(label, cause)),
        }
    }

    fn tick_exhausted(&mut self) -> TickReport {
        let (Some(quest), Some(cursor)) = (self.quest.clone(), self.cursor) else {
            self.reset();
            return TickReport::Idle;
        };
        match quest.next_sequence_after(cursor.sequence) {
            Some(next) => {
                info!("{}: sequence {} -> {}", quest.id, cursor.sequence, next.sequence);
                self.cursor = Some(Cursor {
                    sequence: next.sequence,
                    step: 0,
                    ..cursor
                });
                self.state = ControllerState::AwaitingCompilation;
                TickReport::SequenceAdvanced {
                    from: cursor.sequence,
                    to: next.sequence,
                }
            },
            None => {
                if quest.sequence(cursor.sequence).is_some_and(|s| !s.is_end()) {
                    warn!("{} finished at sequence {} without a turn-in sequence", quest.id, cursor.sequence);
                }
                info!("{} complete after {} compilation(s)", quest.id, self.compilations);
                self.reset();
                TickReport::QuestCompleted(quest.id)
            },
        }
    }

    /// Busy only blocks work that has not produced a side effect yet; combat
    /// and manual pauses suspend at any point.
    fn detect_interruption(
        &self,
        world: &dyn WorldFacade,
        snapshot: &WorldSnapshot,
        before_side_effects: bool,
    ) -> Option<Interruption> {
        if self.paused {
            return Some(Interruption::Paused);
        }
        let duty_automated = snapshot.duty.is_some() && world.aid_active(Aid::DutyAutomation);
        if snapshot.in_combat && !duty_automated {
            return Some(Interruption::Combat);
        }
        if snapshot.busy && before_side_effects {
            return Some(Interruption::Busy);
        }
        None
    }

    fn interrupt(&mut self, interruption: Interruption, world: &mut dyn WorldFacade) -> TickReport {
        if let Some(cursor) = self.cursor {
            info!("{interruption:?} at {cursor}; discarding {} task(s)", self.tasks.len());
        }
        self.tasks.clear();
        self.head_started = false;
        self.interruption = Some(interruption);
        self.state = ControllerState::Interrupted;
        if interruption == Interruption::Combat
            && let Some(resolver) = self.combat.as_mut()
        {
            if world.aid_available(Aid::CombatRotation) {
                self.combat_engaged = resolver.start(world);
                if !self.combat_engaged {
                    warn!("combat resolver declined; waiting for combat to end");
                }
            } else {
                warn!("no combat rotation available; waiting for combat to end");
            }
        }
        TickReport::Interrupted(interruption)
    }

    fn finish_task_list(&mut self) {
        let len = self
            .quest
            .as_ref()
            .zip(self.cursor)
            .and_then(|(q, c)| q.sequence(c.sequence))
            .map_or(0, |s| s.steps.len());
        self.advance_step(len);
    }

    /// Move to the next step; past the last one the sequence is exhausted.
    fn advance_step(&mut self, steps_in_sequence: usize) {
        let Some(cursor) = self.cursor.as_mut() else {
            self.state = ControllerState::Idle;
            return;
        };
        cursor.step += 1;
        self.state = if cursor.step >= steps_in_sequence {
            ControllerState::Exhausted
        } else {
            ControllerState::AwaitingCompilation
        };
    }

    fn fail(&mut self, task: String, cause: TaskError) -> RunFailure {
        let cursor = self.cursor.unwrap_or(Cursor {
            quest: QuestId(0),
            sequence: START_SEQUENCE,
            step: 0,
        });
        let failure = RunFailure {
            quest: cursor.quest,
            sequence: cursor.sequence,
            step: cursor.step,
            task,
            cause,
        };
        error!("{failure}");
        self.tasks.clear();
        self.head_started = false;
        self.interruption = None;
        self.state = ControllerState::Idle;
        self.last_failure = Some(failure.clone());
        failure
    }

    fn reset(&mut self) {
        self.tasks.clear();
        self.head_started = false;
        self.quest = None;
        self.cursor = None;
        self.interruption = None;
        self.paused = false;
        self.combat_engaged = false;
        self.state = ControllerState::Idle;
    }
}

/// A controller behind a mutex, for hosts that tick from several threads.
#[derive(Debug, Clone)]
pub struct SharedController(Arc<Mutex<Controller>>);

impl SharedController {
    pub fn new(controller: Controller) -> Self {
        Self(Arc::new(Mutex::new(controller)))
    }

    /// # Errors
    /// - see [`Controller::tick`]
    pub fn tick(&self, world: &mut dyn WorldFacade) -> Result<TickReport, RunFailure> {
        self.lock().tick(world)
    }

    /// Run a closure with exclusive access to the controller.
    pub fn with<R>(&self, f: impl FnOnce(&mut Controller) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.lock().stop_signal()
    }

    fn lock(&self) -> MutexGuard<'_, Controller> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimWorld;
    use questline_data::{InteractionType, SequenceDef, StepDef, Vec3};

    fn config() -> EngineConfig {
        EngineConfig {
            wait_at_start_ms: 0,
            ..EngineConfig::default()
        }
    }

    fn walk(to: Vec3) -> StepDef {
        StepDef {
            interaction: InteractionType::WalkTo,
            position: Some(to),
            ..StepDef::default()
        }
    }

    fn quest(sequences: Vec<(u8, Vec<StepDef>)>) -> Arc<QuestDef> {
        Arc::new(QuestDef {
            id: QuestId(11),
            name: "controller".into(),
            author: Vec::new(),
            comment: None,
            disabled: false,
            sequences: sequences
                .into_iter()
                .map(|(sequence, steps)| SequenceDef {
                    sequence,
                    steps,
                    comment: None,
                })
                .collect(),
        })
    }

    fn run(controller: &mut Controller, world: &mut SimWorld, max_ticks: usize) -> Vec<TickReport> {
        let mut reports = Vec::new();
        for _ in 0..max_ticks {
            if controller.state().is_idle() {
                break;
            }
            reports.push(controller.tick(world).expect("tick"));
            world.tick();
        }
        reports
    }

    #[test]
    fn rejects_unrunnable_quests() {
        let mut controller = Controller::new(config());
        let empty = quest(vec![(0, Vec::new())]);
        assert_eq!(controller.start(empty), Err(SelectError::NoSteps(QuestId(11))));
        let no_start = quest(vec![(3, vec![walk(Vec3::default())])]);
        assert_eq!(
            controller.start(no_start),
            Err(SelectError::MissingStartSequence(QuestId(11)))
        );
        let q = quest(vec![(0, vec![walk(Vec3::default())])]);
        assert_eq!(
            controller.start_at(q, 0, 4),
            Err(SelectError::StepOutOfRange {
                quest: QuestId(11),
                sequence: 0,
                step: 4,
            })
        );
        assert!(controller.state().is_idle());
    }

    #[test]
    fn walks_through_gapped_sequences() {
        let q = quest(vec![
            (0, vec![walk(Vec3::new(1.0, 0.0, 0.0)), walk(Vec3::new(2.0, 0.0, 0.0))]),
            (4, vec![walk(Vec3::new(10.0, 0.0, 0.0))]),
            (255, vec![walk(Vec3::new(20.0, 0.0, 0.0))]),
        ]);
        let mut world = SimWorld::new();
        let mut controller = Controller::new(config());
        controller.start(q).expect("start");
        let run_id = controller.run_id();
        assert!(run_id.is_some());

        let reports = run(&mut controller, &mut world, 50);
        let advances: Vec<_> = reports
            .iter()
            .filter_map(|r| match r {
                TickReport::SequenceAdvanced { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect();
        assert_eq!(advances, vec![(0, 4), (4, 255)]);
        assert_eq!(reports.last(), Some(&TickReport::QuestCompleted(QuestId(11))));
        assert_eq!(controller.compilations(), 4);
        assert!(controller.cursor().is_none());
    }

    #[test]
    fn busy_host_defers_compilation() {
        let q = quest(vec![(0, vec![walk(Vec3::new(1.0, 0.0, 0.0))])]);
        let mut world = SimWorld::new();
        world.state.busy = true;
        let mut controller = Controller::new(config());
        controller.start(q).expect("start");
        assert_eq!(
            controller.tick(&mut world),
            Ok(TickReport::Interrupted(Interruption::Busy))
        );
        assert_eq!(
            controller.tick(&mut world),
            Ok(TickReport::Interrupted(Interruption::Busy))
        );
        assert_eq!(controller.compilations(), 0);
        world.state.busy = false;
        assert!(matches!(controller.tick(&mut world), Ok(TickReport::Resumed(_))));
        assert!(matches!(controller.tick(&mut world), Ok(TickReport::Compiled { .. })));
    }

    struct Resolver {
        calls: Arc<Mutex<u32>>,
    }

    impl CombatResolver for Resolver {
        fn start(&mut self, _: &mut dyn WorldFacade) -> bool {
            true
        }

        fn update(&mut self, world: &mut dyn WorldFacade) -> bool {
            let mut calls = self.calls.lock().expect("lock");
            *calls += 1;
            if *calls >= 2 {
                // the sim only lets the snapshot say when combat ended
                return !world.snapshot().in_combat;
            }
            false
        }
    }

    #[test]
    fn combat_hands_off_to_resolver() {
        let q = quest(vec![(0, vec![walk(Vec3::new(50.0, 0.0, 0.0))])]);
        let mut world = SimWorld::new();
        world.path_ticks = 5;
        world.aids.push(Aid::CombatRotation);
        let calls = Arc::new(Mutex::new(0));
        let mut controller = Controller::new(config()).with_combat(Box::new(Resolver {
            calls: Arc::clone(&calls),
        }));
        controller.start(q).expect("start");
        controller.tick(&mut world).expect("compile");
        controller.tick(&mut world).expect("start move");
        assert!(controller.current_task().is_some());

        world.state.in_combat = true;
        assert_eq!(
            controller.tick(&mut world),
            Ok(TickReport::Interrupted(Interruption::Combat))
        );
        assert_eq!(controller.pending_tasks(), 0);
        assert_eq!(
            controller.tick(&mut world),
            Ok(TickReport::Interrupted(Interruption::Combat))
        );
        world.state.in_combat = false;
        assert!(matches!(controller.tick(&mut world), Ok(TickReport::Resumed(_))));
        assert_eq!(*calls.lock().expect("lock"), 2);
        assert_eq!(controller.cursor().map(|c| c.step), Some(0));
    }

    #[test]
    fn pause_and_resume_keep_cursor() {
        let q = quest(vec![(
            0,
            vec![walk(Vec3::new(1.0, 0.0, 0.0)), walk(Vec3::new(2.0, 0.0, 0.0))],
        )]);
        let mut world = SimWorld::new();
        let mut controller = Controller::new(config());
        controller.start(q).expect("start");
        controller.tick(&mut world).expect("compile");
        controller.tick(&mut world).expect("walk");
        let cursor = controller.cursor();
        controller.pause();
        assert_eq!(
            controller.tick(&mut world),
            Ok(TickReport::Interrupted(Interruption::Paused))
        );
        assert_eq!(
            controller.tick(&mut world),
            Ok(TickReport::Interrupted(Interruption::Paused))
        );
        controller.resume();
        assert!(matches!(controller.tick(&mut world), Ok(TickReport::Resumed(_))));
        assert_eq!(controller.cursor(), cursor);
    }

    #[test]
    fn stop_signal_is_honored_next_tick() {
        let q = quest(vec![(0, vec![walk(Vec3::new(50.0, 0.0, 0.0))])]);
        let mut world = SimWorld::new();
        world.path_ticks = 10;
        let shared = SharedController::new(Controller::new(config()));
        shared.with(|c| c.start(q)).expect("start");
        shared.tick(&mut world).expect("compile");

        let signal = shared.stop_signal();
        std::thread::spawn(move || signal.request("from another thread"))
            .join()
            .expect("join");
        assert_eq!(
            shared.tick(&mut world),
            Ok(TickReport::Stopped("from another thread".into()))
        );
        assert!(shared.with(|c| c.state().is_idle() && c.cursor().is_none()));
        shared.with(|c| c.stop("again"));
        assert!(shared.with(|c| c.state().is_idle()));
    }

    #[test]
    fn resume_after_failure_restarts_failing_step() {
        let step = StepDef {
            interaction: InteractionType::Interact,
            data_id: Some(99),
            ..StepDef::default()
        };
        let q = quest(vec![(0, vec![walk(Vec3::new(1.0, 0.0, 0.0)), step])]);
        let cfg = config();
        let mut world = SimWorld::new();
        let mut controller = Controller::new(cfg.clone());
        controller.start(q).expect("start");
        assert_eq!(controller.resume_failed(), Err(SelectError::NothingToResume));

        let failure = loop {
            match controller.tick(&mut world) {
                Ok(_) => world.advance(cfg.entity_timeout()),
                Err(failure) => break failure,
            }
        };
        assert_eq!(failure.cause, TaskError::EntityNotFound(99));
        assert_eq!(failure.step, 1);
        assert!(controller.state().is_idle());

        world.add_entity(99, Vec3::default());
        controller.resume_failed().expect("resume");
        assert_eq!(controller.cursor().map(|c| c.step), Some(1));
        let reports = run(&mut controller, &mut world, 20);
        assert_eq!(reports.last(), Some(&TickReport::QuestCompleted(QuestId(11))));
    }

    #[test]
    fn stale_stop_request_does_not_reach_next_run() {
        let mut world = SimWorld::new();
        world.path_ticks = 10;
        let mut controller = Controller::new(config());
        let signal = controller.stop_signal();

        controller
            .start(quest(vec![(0, vec![walk(Vec3::new(50.0, 0.0, 0.0))])]))
            .expect("start");
        signal.request("old run");
        controller.stop("manual");
        controller
            .start(quest(vec![(0, vec![walk(Vec3::new(50.0, 0.0, 0.0))])]))
            .expect("restart");
        assert!(matches!(controller.tick(&mut world), Ok(TickReport::Compiled { .. })));
        assert!(controller.state().is_running());

        // a request aimed at the run being replaced
        signal.request("after the fact");
        controller
            .start(quest(vec![(0, vec![walk(Vec3::new(50.0, 0.0, 0.0))])]))
            .expect("replace");
        assert!(matches!(controller.tick(&mut world), Ok(TickReport::Compiled { .. })));
    }

    #[test]
    fn combat_without_rotation_waits_it_out() {
        let q = quest(vec![(0, vec![walk(Vec3::new(50.0, 0.0, 0.0))])]);
        let mut world = SimWorld::new();
        world.path_ticks = 5;
        let calls = Arc::new(Mutex::new(0));
        let mut controller = Controller::new(config()).with_combat(Box::new(Resolver {
            calls: Arc::clone(&calls),
        }));
        controller.start(q).expect("start");
        controller.tick(&mut world).expect("compile");

        world.state.in_combat = true;
        assert_eq!(
            controller.tick(&mut world),
            Ok(TickReport::Interrupted(Interruption::Combat))
        );
        assert_eq!(
            controller.tick(&mut world),
            Ok(TickReport::Interrupted(Interruption::Combat))
        );
        world.state.in_combat = false;
        assert!(matches!(controller.tick(&mut world), Ok(TickReport::Resumed(_))));
        assert_eq!(*calls.lock().expect("lock"), 0);
    }

    #[test]
    fn disabled_quest_is_rejected() {
        let mut def = (*quest(vec![(0, vec![walk(Vec3::default())])])).clone();
        def.disabled = true;
        let mut controller = Controller::new(config());
        assert_eq!(
            controller.start(Arc::new(def)),
            Err(SelectError::Disabled(QuestId(11)))
        );
        assert!(controller.cursor().is_none());
        assert!(controller.state().is_idle());
    }

    #[test]
    fn missing_parameter_fails_compilation_in_place() {
        let say = StepDef {
            interaction: InteractionType::Say,
            ..StepDef::default()
        };
        let q = quest(vec![(0, vec![walk(Vec3::default()), say])]);
        let mut world = SimWorld::new();
        let mut controller = Controller::new(config());
        controller.start_at(q, 0, 1).expect("start");

        let failure = controller.tick(&mut world).expect_err("no chat message");
        assert_eq!(failure.cause, TaskError::MissingParameter("chat_message"));
        assert!(controller.state().is_idle());
        assert_eq!(controller.compilations(), 0);
        assert_eq!(controller.cursor(), Some(failure.cursor()));
        assert_eq!(failure.step, 1);
        assert!(world.calls.is_empty());
    }

    #[test]
    fn busy_does_not_interrupt_started_task() {
        let q = quest(vec![(0, vec![walk(Vec3::new(50.0, 0.0, 0.0))])]);
        let mut world = SimWorld::new();
        world.path_ticks = 5;
        let mut controller = Controller::new(config());
        controller.start(q).expect("start");
        controller.tick(&mut world).expect("compile");
        assert!(matches!(controller.tick(&mut world), Ok(TickReport::Working(_))));
        assert!(controller.current_task().is_some());

        world.state.busy = true;
        world.tick();
        assert!(matches!(controller.tick(&mut world), Ok(TickReport::Working(_))));
        assert_eq!(controller.pending_tasks(), 1);
        assert!(controller.state().is_running());
    }
}
