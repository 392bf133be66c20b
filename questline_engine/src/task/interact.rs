//! Tasks that talk to a specific entity or aetheryte.

use std::fmt;

use log::{debug, info};
use questline_data::{AetheryteId, DataId};

use super::{Completion, Effect, Retry, Task, TaskError, TaskKind, TaskStatus, Timeout};
use crate::config::EngineConfig;
use crate::world::WorldFacade;

/// Interact with an entity until the host shows the expected effect.
///
/// Also drives quest acceptance and turn-in, which are interactions whose
/// completion is the quest state rather than quest work bytes.
#[derive(Debug, Clone)]
pub struct Interact {
    data_id: DataId,
    effect: Effect,
    /// `None` when the step ignores the distance check.
    max_distance: Option<f32>,
    lookup: Timeout,
}

impl Interact {
    pub fn new(data_id: DataId, completion: Completion, max_distance: Option<f32>, config: &EngineConfig) -> Self {
        Self {
            data_id,
            effect: Effect::new(
                completion,
                Retry::new(config.interaction_attempts, config.retry_delay()),
            ),
            max_distance,
            lookup: Timeout::new(config.entity_timeout()),
        }
    }

    pub fn data_id(&self) -> DataId {
        self.data_id
    }

    pub fn completion(&self) -> &Completion {
        self.effect.completion()
    }

    /// Whether the entity can be interacted with right now.
    ///
    /// A missing or untargetable entity is transient until the lookup timeout
    /// passes; being out of range is not.
    fn reachable(&mut self, world: &dyn WorldFacade) -> Result<bool, TaskError> {
        let now = world.now();
        let found = world.find_entity(self.data_id).filter(|e| e.targetable);
        let Some(entity) = found else {
            self.lookup.arm(now);
            if self.lookup.expired(now) {
                return Err(TaskError::EntityNotFound(self.data_id));
            }
            return Ok(false);
        };
        self.lookup.reset();

        if let Some(limit) = self.max_distance {
            let distance = world.snapshot().position.distance(&entity.position);
            if distance > limit {
                return Err(TaskError::OutOfRange {
                    data_id: self.data_id,
                    distance,
                    limit,
                });
            }
        }
        Ok(true)
    }
}

impl fmt::Display for Interact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.effect.completion() {
            Completion::QuestAccepted(q) => write!(f, "AcceptQuest({q} from {})", self.data_id),
            Completion::QuestCompleted(q) => write!(f, "CompleteQuest({q} at {})", self.data_id),
            _ => write!(f, "Interact({})", self.data_id),
        }
    }
}

impl Task for Interact {
    fn start(&mut self, world: &mut dyn WorldFacade) -> Result<bool, TaskError> {
        if self.effect.is_done(&world.snapshot()) {
            debug!("{self}: effect already visible");
            return Ok(false);
        }
        if !self.reachable(world)? {
            return Ok(false);
        }
        let accepted = world.interact(self.data_id);
        let now = world.now();
        self.effect.record(accepted, now).map_err(|e| e.rejected(self))?;
        Ok(accepted)
    }

    fn update(&mut self, world: &mut dyn WorldFacade) -> Result<TaskStatus, TaskError> {
        let snapshot = world.snapshot();
        if self.effect.is_done(&snapshot) {
            return Ok(TaskStatus::Complete);
        }
        if !self.effect.attempt_due(world, &snapshot) || !self.reachable(world)? {
            return Ok(TaskStatus::StillRunning);
        }
        let data_id = self.data_id;
        self.effect
            .poll(world, |w| w.interact(data_id))
            .map_err(|e| e.rejected(self))
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Interact
    }
}

/// Attune to an aetheryte so it becomes a fast-travel destination.
#[derive(Debug, Clone)]
pub struct AttuneAetheryte {
    aetheryte: AetheryteId,
    effect: Effect,
}

impl AttuneAetheryte {
    pub fn new(aetheryte: AetheryteId, config: &EngineConfig) -> Self {
        Self {
            aetheryte,
            effect: Effect::new(
                Completion::Attuned(aetheryte),
                Retry::new(config.interaction_attempts, config.retry_delay()),
            ),
        }
    }
}

impl fmt::Display for AttuneAetheryte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttuneAetheryte({})", self.aetheryte)
    }
}

impl Task for AttuneAetheryte {
    fn start(&mut self, world: &mut dyn WorldFacade) -> Result<bool, TaskError> {
        if self.effect.is_done(&world.snapshot()) {
            return Ok(false);
        }
        let accepted = world.attune_aetheryte(self.aetheryte);
        let now = world.now();
        self.effect.record(accepted, now).map_err(|e| e.rejected(self))?;
        if accepted {
            info!("{self}: attunement requested");
        }
        Ok(accepted)
    }

    fn update(&mut self, world: &mut dyn WorldFacade) -> Result<TaskStatus, TaskError> {
        let aetheryte = self.aetheryte;
        self.effect
            .poll(world, |w| w.attune_aetheryte(aetheryte))
            .map_err(|e| e.rejected(self))
    }

    fn kind(&self) -> TaskKind {
        TaskKind::AttuneAetheryte
    }
}
