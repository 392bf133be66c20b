//! Task factory registry.
//!
//! Each factory is a free function that looks at one step and contributes zero
//! or more tasks. [`compile_step`] runs every factory in [`FACTORY_ORDER`] and
//! concatenates their output, so the position of a factory in that table is
//! the position of its tasks in the compiled list.

use std::fmt;

use log::debug;
use questline_data::{
    Capability, InteractionType, ItemTarget, QuestDef, QuestId, START_SEQUENCE, SequenceDef, StepDef,
};

use crate::config::EngineConfig;
use crate::skip::{aethernet_skip_reason, shortcut_skip_reason};
use crate::task::{
    AttuneAetheryte, Completion, Dismount, Emote, EnterDuty, EquipItem, Interact, Mount, MoveTo, Say, Task,
    TaskError, TaskKind, TaskList, Teleport, UseAction, UseAethernet, UseItem, WaitDelay, WaitForProgress,
};
use crate::world::{MoveRequest, UseTarget, WorldFacade, WorldSnapshot};

/// Identifies one factory in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactoryKind {
    WaitAtStart,
    AetheryteShortcut,
    AethernetShortcut,
    Movement,
    Dismount,
    Interaction,
}

/// Priority order in which factories contribute to a step's task list.
///
/// Traversal comes before anything done at the destination; dismounting sits
/// between arriving and interacting.
pub const FACTORY_ORDER: [FactoryKind; 6] = [
    FactoryKind::WaitAtStart,
    FactoryKind::AetheryteShortcut,
    FactoryKind::AethernetShortcut,
    FactoryKind::Movement,
    FactoryKind::Dismount,
    FactoryKind::Interaction,
];

/// Signature shared by every factory. `so_far` holds the tasks contributed by
/// higher-priority factories for the same step.
pub type Factory = fn(&StepContext<'_>, &WorldSnapshot, &[Box<dyn Task>]) -> Result<TaskList, TaskError>;

impl FactoryKind {
    pub fn factory(self) -> Factory {
        match self {
            FactoryKind::WaitAtStart => wait_at_start,
            FactoryKind::AetheryteShortcut => aetheryte_shortcut,
            FactoryKind::AethernetShortcut => aethernet_shortcut,
            FactoryKind::Movement => movement,
            FactoryKind::Dismount => dismount,
            FactoryKind::Interaction => interaction,
        }
    }
}

impl fmt::Display for FactoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FactoryKind::WaitAtStart => "wait-at-start",
            FactoryKind::AetheryteShortcut => "aetheryte-shortcut",
            FactoryKind::AethernetShortcut => "aethernet-shortcut",
            FactoryKind::Movement => "movement",
            FactoryKind::Dismount => "dismount",
            FactoryKind::Interaction => "interaction",
        };
        f.write_str(name)
    }
}

/// Everything a factory may know about the step being compiled.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub quest: &'a QuestDef,
    pub sequence: &'a SequenceDef,
    pub step_index: usize,
    pub step: &'a StepDef,
    pub config: &'a EngineConfig,
}

impl StepContext<'_> {
    pub fn quest_id(&self) -> QuestId {
        self.quest.id
    }

    /// Quest accepted or turned in by this step.
    pub fn target_quest(&self) -> QuestId {
        self.step.target_quest.unwrap_or(self.quest.id)
    }

    fn completion(&self) -> Completion {
        Completion::for_step(self.quest.id, self.step)
    }
}

/// Compile one step into its ordered task list.
///
/// # Errors
/// - `MissingParameter` if the step lacks a parameter its interaction requires
pub fn compile_step(ctx: &StepContext<'_>, world: &dyn WorldFacade) -> Result<TaskList, TaskError> {
    let snapshot = world.snapshot();
    let mut tasks = TaskList::new();
    for kind in FACTORY_ORDER {
        let contributed = kind.factory()(ctx, &snapshot, &tasks)?;
        if !contributed.is_empty() {
            debug!("{kind} factory contributed {} task(s)", contributed.len());
        }
        tasks.extend(contributed);
    }
    Ok(tasks)
}

fn require<T>(value: Option<T>, parameter: &'static str) -> Result<T, TaskError> {
    value.ok_or(TaskError::MissingParameter(parameter))
}

fn wait_at_start(ctx: &StepContext<'_>, _: &WorldSnapshot, _: &[Box<dyn Task>]) -> Result<TaskList, TaskError> {
    let delay = ctx.config.wait_at_start();
    if ctx.sequence.sequence != START_SEQUENCE || ctx.step_index != 0 || delay.is_zero() {
        return Ok(Vec::new());
    }
    Ok(vec![Box::new(WaitDelay::new(delay))])
}

fn aetheryte_shortcut(
    ctx: &StepContext<'_>,
    world: &WorldSnapshot,
    _: &[Box<dyn Task>],
) -> Result<TaskList, TaskError> {
    let Some(aetheryte) = ctx.step.aetheryte_shortcut else {
        return Ok(Vec::new());
    };
    if let Some(reason) =
        shortcut_skip_reason(ctx.step.aetheryte_shortcut_if(), ctx.quest.id, aetheryte, ctx.step, world)
    {
        debug!("not teleporting to aetheryte {aetheryte}: {reason}");
        return Ok(Vec::new());
    }
    Ok(vec![Box::new(Teleport::new(aetheryte, ctx.step.territory, ctx.config))])
}

fn aethernet_shortcut(
    ctx: &StepContext<'_>,
    world: &WorldSnapshot,
    _: &[Box<dyn Task>],
) -> Result<TaskList, TaskError> {
    let Some(shortcut) = ctx.step.aethernet_shortcut else {
        return Ok(Vec::new());
    };
    if let Some(reason) = aethernet_skip_reason(ctx.step.aethernet_shortcut_if(), ctx.quest.id, shortcut, world) {
        debug!("not using aethernet {} -> {}: {reason}", shortcut.from, shortcut.to);
        return Ok(Vec::new());
    }
    Ok(vec![Box::new(UseAethernet::new(shortcut, ctx.config))])
}

fn movement(ctx: &StepContext<'_>, world: &WorldSnapshot, _: &[Box<dyn Task>]) -> Result<TaskList, TaskError> {
    let step = ctx.step;
    let Some(destination) = step.position else {
        if step.interaction == InteractionType::WalkTo {
            return Err(TaskError::MissingParameter("position"));
        }
        return Ok(Vec::new());
    };

    let fly = step.fly && world.is_unlocked(Capability::Flying);
    let mut tasks: TaskList = Vec::new();
    if step.mount == Some(true) || (fly && step.mount != Some(false)) {
        tasks.push(Box::new(Mount::new(ctx.config)));
    }
    let request = MoveRequest {
        territory: step.territory,
        destination,
        stop_distance: step.stop_distance.unwrap_or(ctx.config.default_stop_distance),
        fly,
        land: step.land,
        sprint: step.sprint.unwrap_or(true),
        direct: step.disable_navmesh,
    };
    tasks.push(Box::new(MoveTo::new(request, ctx.config)));
    Ok(tasks)
}

fn dismount(ctx: &StepContext<'_>, world: &WorldSnapshot, so_far: &[Box<dyn Task>]) -> Result<TaskList, TaskError> {
    if !ctx.step.interaction.requires_dismount() {
        return Ok(Vec::new());
    }
    let list_mounts = so_far
        .iter()
        .any(|t| matches!(t.kind(), TaskKind::Mount | TaskKind::MoveTo));
    if !world.mounted && !list_mounts {
        return Ok(Vec::new());
    }
    Ok(vec![Box::new(Dismount::new(ctx.config))])
}

fn interaction(ctx: &StepContext<'_>, _: &WorldSnapshot, _: &[Box<dyn Task>]) -> Result<TaskList, TaskError> {
    let step = ctx.step;
    let config = ctx.config;
    let max_distance = (!step.ignore_distance_to_object).then_some(config.interaction_distance);

    let task: Box<dyn Task> = match step.interaction {
        InteractionType::WalkTo => return Ok(Vec::new()),
        InteractionType::Interact => {
            let data_id = require(step.data_id, "data_id")?;
            Box::new(Interact::new(data_id, ctx.completion(), max_distance, config))
        },
        InteractionType::UseItem => {
            let item = require(step.item_id, "item_id")?;
            let target = match step.item_target {
                ItemTarget::SelfTarget => UseTarget::Player,
                ItemTarget::Entity => UseTarget::Entity(require(step.data_id, "data_id")?),
                ItemTarget::Ground => UseTarget::Ground(require(step.position, "position")?),
            };
            Box::new(UseItem::new(item, target, ctx.completion(), config))
        },
        InteractionType::EquipItem => Box::new(EquipItem::new(require(step.item_id, "item_id")?, config)),
        InteractionType::Say => {
            let message = require(step.chat_message.as_deref(), "chat_message")?;
            Box::new(Say::new(message, ctx.completion(), config))
        },
        InteractionType::Emote => {
            let emote = require(step.emote, "emote")?;
            Box::new(Emote::new(emote, step.data_id, ctx.completion(), config))
        },
        InteractionType::Action => {
            let action = require(step.action, "action")?;
            let target = step.data_id.map_or(UseTarget::Player, UseTarget::Entity);
            Box::new(UseAction::new(action, target, ctx.completion(), config))
        },
        InteractionType::AttuneAetheryte => {
            Box::new(AttuneAetheryte::new(require(step.aetheryte, "aetheryte")?, config))
        },
        InteractionType::Duty => Box::new(EnterDuty::new(require(step.content_id, "content_id")?, config)),
        InteractionType::AcceptQuest => {
            let goal = Completion::QuestAccepted(ctx.target_quest());
            match step.data_id {
                Some(data_id) => Box::new(Interact::new(data_id, goal, max_distance, config)),
                None => Box::new(WaitForProgress::new(ctx.quest.id, goal)),
            }
        },
        InteractionType::CompleteQuest => {
            let goal = Completion::QuestCompleted(ctx.target_quest());
            match step.data_id {
                Some(data_id) => Box::new(Interact::new(data_id, goal, max_distance, config)),
                None => Box::new(WaitForProgress::new(ctx.quest.id, goal)),
            }
        },
        InteractionType::WaitForManualProgress => Box::new(WaitForProgress::new(ctx.quest.id, ctx.completion())),
    };
    Ok(vec![task])
}
