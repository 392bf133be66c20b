//! The world-state facade consumed by the engine.
//!
//! Everything the engine knows about the live environment arrives through
//! [`WorldFacade`]. Calls are allowed to be slow, wrong while the host is
//! loading, or to report "not done yet"; every caller retries on a later tick.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Instant;

use questline_data::{
    AetheryteId, ActionId, Capability, ContentId, DataId, EmoteId, ItemId, QUEST_WORK_LEN, QuestId, TerritoryId,
    Vec3,
};
use serde::{Deserialize, Serialize};
use variantly::Variantly;

/// Quest work bytes as reported by the host.
pub type QuestWork = [u8; QUEST_WORK_LEN];

/// Read-only view of world state used by skip rules and factories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSnapshot {
    pub territory: TerritoryId,
    pub position: Vec3,
    pub mounted: bool,
    pub in_combat: bool,
    /// Host is occupied with something unrelated (loading, cutscene, crafting...).
    pub busy: bool,
    pub inventory: BTreeMap<ItemId, u32>,
    pub equipped: BTreeSet<ItemId>,
    pub quest_work: BTreeMap<QuestId, QuestWork>,
    pub accepted_quests: BTreeSet<QuestId>,
    pub completed_quests: BTreeSet<QuestId>,
    pub unlocked: BTreeSet<Capability>,
    pub attuned_aetherytes: BTreeSet<AetheryteId>,
    /// Entities currently showing a quest marker on their nameplate.
    pub marked_entities: BTreeSet<DataId>,
    pub extra_conditions: BTreeSet<String>,
    pub open_menus: BTreeSet<String>,
    pub status_effects: BTreeSet<u32>,
    pub duty: Option<ContentId>,
}

impl WorldSnapshot {
    pub fn item_count(&self, item: ItemId) -> u32 {
        self.inventory.get(&item).copied().unwrap_or(0)
    }

    pub fn has_item(&self, item: ItemId) -> bool {
        self.item_count(item) > 0
    }

    pub fn is_equipped(&self, item: ItemId) -> bool {
        self.equipped.contains(&item)
    }

    pub fn is_accepted(&self, quest: QuestId) -> bool {
        self.accepted_quests.contains(&quest)
    }

    pub fn is_completed(&self, quest: QuestId) -> bool {
        self.completed_quests.contains(&quest)
    }

    pub fn work(&self, quest: QuestId) -> Option<&QuestWork> {
        self.quest_work.get(&quest)
    }

    pub fn is_unlocked(&self, capability: Capability) -> bool {
        self.unlocked.contains(&capability)
    }

    pub fn is_attuned(&self, aetheryte: AetheryteId) -> bool {
        self.attuned_aetherytes.contains(&aetheryte)
    }
}

/// What the facade knows about one entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityInfo {
    pub data_id: DataId,
    pub position: Vec3,
    pub targetable: bool,
}

/// Target of an item or action use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UseTarget {
    Player,
    Entity(DataId),
    Ground(Vec3),
}

impl fmt::Display for UseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UseTarget::Player => f.write_str("self"),
            UseTarget::Entity(id) => write!(f, "entity {id}"),
            UseTarget::Ground(pos) => write!(f, "ground {pos}"),
        }
    }
}

/// A pathfinding request handed to the external mover.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveRequest {
    pub territory: TerritoryId,
    pub destination: Vec3,
    pub stop_distance: f32,
    pub fly: bool,
    pub land: bool,
    pub sprint: bool,
    /// Walk in a straight line instead of asking the pathfinder.
    pub direct: bool,
}

/// Progress reported by the external pathfinder.
#[derive(Debug, Clone, PartialEq, Variantly)]
pub enum MovementState {
    Idle,
    Computing,
    Running,
    Arrived,
    Failed(String),
}

/// Optional third-party automation aids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Aid {
    CombatRotation,
    DutyAutomation,
}

/// Capability surface the engine uses to observe and affect the world.
///
/// Boolean results report whether the host accepted the request, not whether
/// the effect has already happened.
pub trait WorldFacade {
    /// Current time. All task deadlines are measured against this clock.
    fn now(&self) -> Instant;
    fn snapshot(&self) -> WorldSnapshot;
    fn find_entity(&self, data_id: DataId) -> Option<EntityInfo>;

    fn interact(&mut self, data_id: DataId) -> bool;
    fn use_item(&mut self, item: ItemId, target: UseTarget) -> bool;
    fn equip_item(&mut self, item: ItemId) -> bool;
    fn use_action(&mut self, action: ActionId, target: UseTarget) -> bool;
    fn send_chat(&mut self, message: &str) -> bool;
    fn perform_emote(&mut self, emote: EmoteId, target: Option<DataId>) -> bool;

    fn mount(&mut self) -> bool;
    fn dismount(&mut self) -> bool;
    fn teleport(&mut self, aetheryte: AetheryteId) -> bool;
    fn use_aethernet(&mut self, from: AetheryteId, to: AetheryteId) -> bool;
    fn attune_aetheryte(&mut self, aetheryte: AetheryteId) -> bool;
    fn enter_duty(&mut self, content: ContentId) -> bool;

    fn move_to(&mut self, request: MoveRequest) -> bool;
    fn movement_state(&self) -> MovementState;
    fn stop_movement(&mut self);

    fn aid_available(&self, aid: Aid) -> bool;
    fn aid_active(&self, aid: Aid) -> bool;
}

/// External collaborator that resolves combat while the step driver is suspended.
pub trait CombatResolver {
    /// Begin resolving the current engagement. Returns false if it cannot.
    fn start(&mut self, world: &mut dyn WorldFacade) -> bool;
    /// Returns true once the collaborator considers combat resolved.
    fn update(&mut self, world: &mut dyn WorldFacade) -> bool;
}
