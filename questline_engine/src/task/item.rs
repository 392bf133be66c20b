//! Inventory tasks.

use std::fmt;

use questline_data::ItemId;

use super::{Completion, Effect, Retry, Task, TaskError, TaskKind, TaskStatus};
use crate::config::EngineConfig;
use crate::world::{UseTarget, WorldFacade};

/// Use an item on the player, an entity, or a ground position.
#[derive(Debug, Clone)]
pub struct UseItem {
    item: ItemId,
    target: UseTarget,
    effect: Effect,
}

impl UseItem {
    pub fn new(item: ItemId, target: UseTarget, completion: Completion, config: &EngineConfig) -> Self {
        Self {
            item,
            target,
            effect: Effect::new(
                completion,
                Retry::new(config.interaction_attempts, config.retry_delay()),
            ),
        }
    }

    pub fn target(&self) -> UseTarget {
        self.target
    }
}

impl fmt::Display for UseItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UseItem({} on {})", self.item, self.target)
    }
}

impl Task for UseItem {
    fn start(&mut self, world: &mut dyn WorldFacade) -> Result<bool, TaskError> {
        let snapshot = world.snapshot();
        if self.effect.is_done(&snapshot) {
            return Ok(false);
        }
        if !snapshot.has_item(self.item) {
            return Err(TaskError::ItemMissing(self.item));
        }
        let accepted = world.use_item(self.item, self.target);
        let now = world.now();
        self.effect.record(accepted, now).map_err(|e| e.rejected(self))?;
        Ok(accepted)
    }

    fn update(&mut self, world: &mut dyn WorldFacade) -> Result<TaskStatus, TaskError> {
        let snapshot = world.snapshot();
        if self.effect.is_done(&snapshot) {
            return Ok(TaskStatus::Complete);
        }
        // a consumed item only fails the task once its effect is known to be missing
        if !snapshot.has_item(self.item) && self.effect.attempt_due(world, &snapshot) {
            return Err(TaskError::ItemMissing(self.item));
        }
        let (item, target) = (self.item, self.target);
        self.effect
            .poll(world, |w| w.use_item(item, target))
            .map_err(|e| e.rejected(self))
    }

    fn kind(&self) -> TaskKind {
        TaskKind::UseItem
    }
}

/// Put on a piece of gear from the inventory.
#[derive(Debug, Clone)]
pub struct EquipItem {
    item: ItemId,
    effect: Effect,
}

impl EquipItem {
    pub fn new(item: ItemId, config: &EngineConfig) -> Self {
        Self {
            item,
            effect: Effect::new(
                Completion::Equipped(item),
                Retry::new(config.interaction_attempts, config.retry_delay()),
            ),
        }
    }
}

impl fmt::Display for EquipItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EquipItem({})", self.item)
    }
}

impl Task for EquipItem {
    fn start(&mut self, world: &mut dyn WorldFacade) -> Result<bool, TaskError> {
        let snapshot = world.snapshot();
        if self.effect.is_done(&snapshot) {
            return Ok(false);
        }
        if !snapshot.has_item(self.item) {
            return Err(TaskError::ItemMissing(self.item));
        }
        let accepted = world.equip_item(self.item);
        let now = world.now();
        self.effect.record(accepted, now).map_err(|e| e.rejected(self))?;
        Ok(accepted)
    }

    fn update(&mut self, world: &mut dyn WorldFacade) -> Result<TaskStatus, TaskError> {
        let item = self.item;
        self.effect
            .poll(world, |w| w.equip_item(item))
            .map_err(|e| e.rejected(self))
    }

    fn kind(&self) -> TaskKind {
        TaskKind::EquipItem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimCall, SimEffect, SimTrigger, SimWorld};
    use questline_data::{QuestId, QuestWorkValue};

    #[test]
    fn use_item_without_item_fails() {
        let mut world = SimWorld::new();
        let mut task = UseItem::new(50, UseTarget::Player, Completion::Acknowledged, &EngineConfig::default());
        assert_eq!(task.start(&mut world), Err(TaskError::ItemMissing(50)));
    }

    #[test]
    fn consumed_item_still_completes_on_flags() {
        let quest = QuestId(2);
        let mut world = SimWorld::new();
        world.state.inventory.insert(50, 1);
        world.state.quest_work.insert(quest, [0; 6]);
        world.on(
            SimTrigger::UseItem(50),
            vec![SimEffect::TakeItem(50), SimEffect::SetWork(quest, [0x10, 0, 0, 0, 0, 0])],
        );
        let completion = Completion::Flags {
            quest,
            pattern: vec![Some(QuestWorkValue::new(Some(1), None))],
        };
        let mut task = UseItem::new(50, UseTarget::Entity(8), completion, &EngineConfig::default());
        assert!(task.start(&mut world).expect("start"));
        assert_eq!(task.update(&mut world), Ok(TaskStatus::Complete));
        assert_eq!(world.calls, vec![SimCall::UseItem(50, UseTarget::Entity(8))]);
    }

    #[test]
    fn equip_completes_once_worn() {
        let mut world = SimWorld::new();
        world.state.inventory.insert(77, 1);
        let mut task = EquipItem::new(77, &EngineConfig::default());
        assert!(task.start(&mut world).expect("start"));
        assert_eq!(task.update(&mut world), Ok(TaskStatus::Complete));

        let mut again = EquipItem::new(77, &EngineConfig::default());
        assert!(!again.start(&mut world).expect("start"));
        assert_eq!(world.count_calls(|c| matches!(c, SimCall::Equip(77))), 1);
    }
}
