//! Task module --
//!
//! A task is the smallest unit of executable work. The controller calls
//! [`Task::start`] once and then [`Task::update`] once per tick until the task
//! reports [`TaskStatus::Complete`] or raises a [`TaskError`].
//!
//! Tasks hold only the parameters they were compiled with plus short-lived
//! retry bookkeeping; they never reference one another. Ordering lives purely
//! in the position of a task within its compiled list.

pub mod chat;
pub mod interact;
pub mod item;
pub mod movement;
pub mod timing;
pub mod wait;

pub use chat::*;
pub use interact::*;
pub use item::*;
pub use movement::*;
pub use timing::*;
pub use wait::*;

use std::fmt;
use std::time::{Duration, Instant};

use questline_data::{AetheryteId, DataId, ItemId, QuestId, QuestWorkValue, StepDef, has_pattern};
use thiserror::Error;

use crate::skip::completion_flags_match;
use crate::world::{WorldFacade, WorldSnapshot};

/// Result of polling a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    StillRunning,
    Complete,
}

/// Unrecoverable task failure. Transient conditions never surface as errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    #[error("step is missing required parameter '{0}'")]
    MissingParameter(&'static str),
    #[error("entity {0} never became available")]
    EntityNotFound(DataId),
    #[error("entity {data_id} is out of range ({distance:.1} > {limit:.1})")]
    OutOfRange { data_id: DataId, distance: f32, limit: f32 },
    #[error("item {0} is not in the inventory")]
    ItemMissing(ItemId),
    #[error("aetheryte {0} is not attuned")]
    AetheryteLocked(AetheryteId),
    #[error("pathfinding failed: {0}")]
    PathfindingFailed(String),
    #[error("{task} timed out after {elapsed:?}")]
    TimedOut { task: String, elapsed: Duration },
    #[error("{task} was rejected {attempts} times")]
    Rejected { task: String, attempts: u32 },
}

/// Tag identifying each task type, used for diagnostics and ordering checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    WaitDelay,
    WaitForProgress,
    Mount,
    Dismount,
    MoveTo,
    Teleport,
    Aethernet,
    Interact,
    AttuneAetheryte,
    UseItem,
    EquipItem,
    Say,
    Emote,
    Action,
    Duty,
}

/// The two-phase contract every task implements.
pub trait Task: fmt::Display + Send {
    /// Make the first attempt. `false` means no side effect was produced yet.
    ///
    /// # Errors
    /// - if the task cannot possibly succeed
    fn start(&mut self, world: &mut dyn WorldFacade) -> Result<bool, TaskError>;

    /// Poll the task once. Must be safe to call redundantly.
    ///
    /// # Errors
    /// - if the task cannot possibly succeed
    fn update(&mut self, world: &mut dyn WorldFacade) -> Result<TaskStatus, TaskError>;

    fn kind(&self) -> TaskKind;
}

/// An ordered list of compiled tasks, head first.
pub type TaskList = Vec<Box<dyn Task>>;

/// When a side-effecting task may consider its work done.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// As soon as the host accepts the request.
    Acknowledged,
    /// Once the quest's work bytes match the pattern.
    Flags {
        quest: QuestId,
        pattern: Vec<Option<QuestWorkValue>>,
    },
    QuestAccepted(QuestId),
    QuestCompleted(QuestId),
    Attuned(AetheryteId),
    Equipped(ItemId),
}

impl Completion {
    /// Completion implied by a step: its completion flags if it has any.
    pub fn for_step(quest: QuestId, step: &StepDef) -> Self {
        if has_pattern(&step.completion_flags) {
            Completion::Flags {
                quest,
                pattern: step.completion_flags.clone(),
            }
        } else {
            Completion::Acknowledged
        }
    }

    pub fn reached(&self, world: &WorldSnapshot, acknowledged: bool) -> bool {
        match self {
            Completion::Acknowledged => acknowledged,
            Completion::Flags { quest, pattern } => completion_flags_match(pattern, *quest, world),
            Completion::QuestAccepted(q) => world.is_accepted(*q) || world.is_completed(*q),
            Completion::QuestCompleted(q) => world.is_completed(*q),
            Completion::Attuned(a) => world.is_attuned(*a),
            Completion::Equipped(item) => world.is_equipped(*item),
        }
    }
}

/// Shared driver for "send a request, then wait for its effect" tasks.
///
/// The done-check always runs before any retry, so redundant polls never
/// repeat a side effect whose result is already visible.
#[derive(Debug, Clone)]
pub struct Effect {
    completion: Completion,
    retry: Retry,
    acknowledged: bool,
}

impl Effect {
    pub fn new(completion: Completion, retry: Retry) -> Self {
        Self {
            completion,
            retry,
            acknowledged: false,
        }
    }

    pub fn completion(&self) -> &Completion {
        &self.completion
    }

    pub fn acknowledged(&self) -> bool {
        self.acknowledged
    }

    pub fn is_done(&self, world: &WorldSnapshot) -> bool {
        self.completion.reached(world, self.acknowledged)
    }

    /// Whether a new attempt may be made right now.
    pub fn attempt_due(&self, world: &dyn WorldFacade, snapshot: &WorldSnapshot) -> bool {
        !snapshot.busy && self.retry.due(world.now())
    }

    /// Record the outcome of one attempt.
    ///
    /// # Errors
    /// - once rejections exhaust the retry budget
    pub fn record(&mut self, accepted: bool, now: Instant) -> Result<(), Exhausted> {
        self.acknowledged |= accepted;
        self.retry.record(accepted, now)
    }

    /// One poll: done-check, then at most one attempt.
    ///
    /// # Errors
    /// - once rejections exhaust the retry budget
    pub fn poll<F>(&mut self, world: &mut dyn WorldFacade, attempt: F) -> Result<TaskStatus, Exhausted>
    where
        F: FnOnce(&mut dyn WorldFacade) -> bool,
    {
        let snapshot = world.snapshot();
        if self.is_done(&snapshot) {
            return Ok(TaskStatus::Complete);
        }
        if !self.attempt_due(world, &snapshot) {
            return Ok(TaskStatus::StillRunning);
        }
        let accepted = attempt(world);
        let now = world.now();
        self.record(accepted, now)?;
        if self.is_done(&snapshot) {
            return Ok(TaskStatus::Complete);
        }
        Ok(TaskStatus::StillRunning)
    }
}
