//! Chat, emote, and action tasks. Fire-and-confirm requests with no
//! precondition beyond the host accepting them.

use std::fmt;

use questline_data::{ActionId, DataId, EmoteId};

use super::{Completion, Effect, Retry, Task, TaskError, TaskKind, TaskStatus};
use crate::config::EngineConfig;
use crate::world::{UseTarget, WorldFacade};

fn effect(completion: Completion, config: &EngineConfig) -> Effect {
    Effect::new(
        completion,
        Retry::new(config.interaction_attempts, config.retry_delay()),
    )
}

/// Send a chat message.
#[derive(Debug, Clone)]
pub struct Say {
    message: String,
    effect: Effect,
}

impl Say {
    pub fn new(message: impl Into<String>, completion: Completion, config: &EngineConfig) -> Self {
        Self {
            message: message.into(),
            effect: effect(completion, config),
        }
    }
}

impl fmt::Display for Say {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Say(\"{}\")", self.message)
    }
}

impl Task for Say {
    fn start(&mut self, world: &mut dyn WorldFacade) -> Result<bool, TaskError> {
        if self.effect.is_done(&world.snapshot()) {
            return Ok(false);
        }
        let accepted = world.send_chat(&self.message);
        let now = world.now();
        self.effect.record(accepted, now).map_err(|e| e.rejected(self))?;
        Ok(accepted)
    }

    fn update(&mut self, world: &mut dyn WorldFacade) -> Result<TaskStatus, TaskError> {
        let message = &self.message;
        self.effect
            .poll(world, |w| w.send_chat(message))
            .map_err(|e| e.rejected(self))
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Say
    }
}

/// Perform an emote, optionally at an entity.
#[derive(Debug, Clone)]
pub struct Emote {
    emote: EmoteId,
    target: Option<DataId>,
    effect: Effect,
}

impl Emote {
    pub fn new(emote: EmoteId, target: Option<DataId>, completion: Completion, config: &EngineConfig) -> Self {
        Self {
            emote,
            target,
            effect: effect(completion, config),
        }
    }
}

impl fmt::Display for Emote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            Some(target) => write!(f, "Emote({} at {target})", self.emote),
            None => write!(f, "Emote({})", self.emote),
        }
    }
}

impl Task for Emote {
    fn start(&mut self, world: &mut dyn WorldFacade) -> Result<bool, TaskError> {
        if self.effect.is_done(&world.snapshot()) {
            return Ok(false);
        }
        let accepted = world.perform_emote(self.emote, self.target);
        let now = world.now();
        self.effect.record(accepted, now).map_err(|e| e.rejected(self))?;
        Ok(accepted)
    }

    fn update(&mut self, world: &mut dyn WorldFacade) -> Result<TaskStatus, TaskError> {
        let (emote, target) = (self.emote, self.target);
        self.effect
            .poll(world, |w| w.perform_emote(emote, target))
            .map_err(|e| e.rejected(self))
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Emote
    }
}

/// Use a combat or general action.
#[derive(Debug, Clone)]
pub struct UseAction {
    action: ActionId,
    target: UseTarget,
    effect: Effect,
}

impl UseAction {
    pub fn new(action: ActionId, target: UseTarget, completion: Completion, config: &EngineConfig) -> Self {
        Self {
            action,
            target,
            effect: effect(completion, config),
        }
    }
}

impl fmt::Display for UseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action({} on {})", self.action, self.target)
    }
}

impl Task for UseAction {
    fn start(&mut self, world: &mut dyn WorldFacade) -> Result<bool, TaskError> {
        if self.effect.is_done(&world.snapshot()) {
            return Ok(false);
        }
        let accepted = world.use_action(self.action, self.target);
        let now = world.now();
        self.effect.record(accepted, now).map_err(|e| e.rejected(self))?;
        Ok(accepted)
    }

    fn update(&mut self, world: &mut dyn WorldFacade) -> Result<TaskStatus, TaskError> {
        let (action, target) = (self.action, self.target);
        self.effect
            .poll(world, |w| w.use_action(action, target))
            .map_err(|e| e.rejected(self))
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Action
    }
}
