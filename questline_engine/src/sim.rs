//! In-memory world used by tests and the dry-run binary.
//!
//! `SimWorld` keeps a [`WorldSnapshot`] plus a virtual clock and a handful of
//! scripted behaviours: pathfinding latency, loading screens after fast
//! travel, rejected calls, and quest progression triggered by interactions.
//! Every side-effecting facade call is appended to [`SimWorld::calls`].

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, info};
use questline_data::{
    ActionId, AetheryteId, Capability, ContentId, DataId, EmoteId, ItemId, QuestId, TerritoryId, Vec3,
};
use serde::{Deserialize, Serialize};

use crate::world::{
    Aid, EntityInfo, MoveRequest, MovementState, QuestWork, UseTarget, WorldFacade, WorldSnapshot,
};

/// Length of one simulated tick.
pub const SIM_TICK: Duration = Duration::from_millis(100);

/// A scripted entity placed in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEntity {
    pub territory: TerritoryId,
    pub position: Vec3,
    #[serde(default = "default_targetable")]
    pub targetable: bool,
}

fn default_targetable() -> bool {
    true
}

/// A facade call that may set scripted effects in motion.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SimTrigger {
    Interact(DataId),
    UseItem(ItemId),
    Equip(ItemId),
    Say(String),
    Emote(EmoteId),
    Action(ActionId),
    /// Fires when the duty is cleared.
    Duty(ContentId),
}

/// World changes applied when a trigger fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimEffect {
    AcceptQuest(QuestId),
    CompleteQuest(QuestId),
    SetWork(QuestId, QuestWork),
    GiveItem(ItemId, u32),
    TakeItem(ItemId),
    Mark(DataId),
    Unmark(DataId),
    Unlock(Capability),
    SetCondition(String),
}

/// Serialized starting point for a simulated run (`sim.ron`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimScenario {
    pub state: WorldSnapshot,
    pub entities: BTreeMap<DataId, SimEntity>,
    pub aetheryte_territories: BTreeMap<AetheryteId, TerritoryId>,
    pub triggers: BTreeMap<SimTrigger, Vec<SimEffect>>,
    pub aids: Vec<Aid>,
    pub path_ticks: u32,
    pub load_ticks: u32,
    pub duty_ticks: u32,
    pub rejection_chance: f64,
}

/// A side-effecting call the engine made into the simulated world.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCall {
    Interact(DataId),
    UseItem(ItemId, UseTarget),
    Equip(ItemId),
    Action(ActionId, UseTarget),
    Chat(String),
    Emote(EmoteId, Option<DataId>),
    Mount,
    Dismount,
    Teleport(AetheryteId),
    Aethernet(AetheryteId, AetheryteId),
    Attune(AetheryteId),
    EnterDuty(ContentId),
    MoveTo(MoveRequest),
    StopMovement,
}

#[derive(Debug, Clone)]
struct PendingMove {
    request: MoveRequest,
    remaining: u32,
}

/// Scriptable [`WorldFacade`] over an in-memory snapshot.
#[derive(Debug, Clone)]
pub struct SimWorld {
    pub state: WorldSnapshot,
    pub entities: BTreeMap<DataId, SimEntity>,
    pub aetheryte_territories: BTreeMap<AetheryteId, TerritoryId>,
    pub triggers: BTreeMap<SimTrigger, Vec<SimEffect>>,
    /// Aids that are installed; installed aids are considered active.
    pub aids: Vec<Aid>,
    /// Ticks the pathfinder needs to reach a destination. Zero arrives at once.
    pub path_ticks: u32,
    /// When set, every movement request fails with this reason.
    pub path_failure: Option<String>,
    /// Ticks the host stays busy after a teleport or aethernet hop.
    pub load_ticks: u32,
    /// Ticks an automated duty takes to clear.
    pub duty_ticks: u32,
    /// Reject this many upcoming side-effecting calls.
    pub reject_next: u32,
    /// Probability that any side-effecting call is rejected.
    pub rejection_chance: f64,
    pub calls: Vec<SimCall>,
    clock: Instant,
    busy_for: u32,
    duty_for: u32,
    movement: MovementState,
    pending: Option<PendingMove>,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWorld {
    pub fn new() -> Self {
        Self::from_scenario(SimScenario::default())
    }

    pub fn from_scenario(scenario: SimScenario) -> Self {
        Self {
            state: scenario.state,
            entities: scenario.entities,
            aetheryte_territories: scenario.aetheryte_territories,
            triggers: scenario.triggers,
            aids: scenario.aids,
            path_ticks: scenario.path_ticks,
            path_failure: None,
            load_ticks: scenario.load_ticks,
            duty_ticks: scenario.duty_ticks,
            reject_next: 0,
            rejection_chance: scenario.rejection_chance,
            calls: Vec::new(),
            clock: Instant::now(),
            busy_for: 0,
            duty_for: 0,
            movement: MovementState::Idle,
            pending: None,
        }
    }

    /// Place a targetable entity in the player's current territory.
    pub fn add_entity(&mut self, data_id: DataId, position: Vec3) {
        self.entities.insert(
            data_id,
            SimEntity {
                territory: self.state.territory,
                position,
                targetable: true,
            },
        );
    }

    /// Script the effects of a trigger, replacing earlier ones.
    pub fn on(&mut self, trigger: SimTrigger, effects: Vec<SimEffect>) {
        self.triggers.insert(trigger, effects);
    }

    /// Move the virtual clock forward without simulating anything else.
    pub fn advance(&mut self, by: Duration) {
        self.clock += by;
    }

    /// Simulate one host tick: the clock, pathfinding, loading, and duties move on.
    pub fn tick(&mut self) {
        self.clock += SIM_TICK;

        if let Some(pending) = self.pending.as_mut() {
            pending.remaining = pending.remaining.saturating_sub(1);
            if pending.remaining == 0 {
                self.state.position = pending.request.destination;
                self.movement = MovementState::Arrived;
                self.pending = None;
            } else {
                self.movement = MovementState::Running;
            }
        }

        if self.busy_for > 0 {
            self.busy_for -= 1;
            if self.busy_for == 0 {
                self.state.busy = false;
            }
        }

        if let Some(content) = self.state.duty
            && self.aids.contains(&Aid::DutyAutomation)
        {
            self.duty_for = self.duty_for.saturating_sub(1);
            if self.duty_for == 0 {
                debug!("sim: duty {content} cleared");
                self.state.duty = None;
                self.fire(&SimTrigger::Duty(content));
            }
        }
    }

    pub fn count_calls(&self, pred: impl Fn(&SimCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    fn fire(&mut self, trigger: &SimTrigger) {
        let Some(effects) = self.triggers.get(trigger).cloned() else {
            return;
        };
        for effect in effects {
            self.apply(effect);
        }
    }

    fn apply(&mut self, effect: SimEffect) {
        debug!("sim: applying {effect:?}");
        let state = &mut self.state;
        match effect {
            SimEffect::AcceptQuest(q) => {
                state.accepted_quests.insert(q);
                state.quest_work.entry(q).or_default();
            },
            SimEffect::CompleteQuest(q) => {
                state.accepted_quests.remove(&q);
                state.quest_work.remove(&q);
                state.completed_quests.insert(q);
            },
            SimEffect::SetWork(q, work) => {
                state.quest_work.insert(q, work);
            },
            SimEffect::GiveItem(item, count) => {
                *state.inventory.entry(item).or_default() += count;
            },
            SimEffect::TakeItem(item) => {
                state.inventory.remove(&item);
            },
            SimEffect::Mark(d) => {
                state.marked_entities.insert(d);
            },
            SimEffect::Unmark(d) => {
                state.marked_entities.remove(&d);
            },
            SimEffect::Unlock(c) => {
                state.unlocked.insert(c);
            },
            SimEffect::SetCondition(tag) => {
                state.extra_conditions.insert(tag);
            },
        }
    }

    /// Decide whether the next side-effecting call is rejected.
    fn rejects(&mut self) -> bool {
        if self.reject_next > 0 {
            self.reject_next -= 1;
            return true;
        }
        self.rejection_chance > 0.0 && rand::random_bool(self.rejection_chance.min(1.0))
    }

    fn start_loading(&mut self) {
        if self.load_ticks > 0 {
            self.state.busy = true;
            self.busy_for = self.load_ticks;
        }
    }

    fn arrive_at(&mut self, data_id: DataId) {
        if let Some(entity) = self.entities.get(&data_id) {
            self.state.territory = entity.territory;
            self.state.position = entity.position;
        }
    }
}

impl WorldFacade for SimWorld {
    fn now(&self) -> Instant {
        self.clock
    }

    fn snapshot(&self) -> WorldSnapshot {
        self.state.clone()
    }

    fn find_entity(&self, data_id: DataId) -> Option<EntityInfo> {
        self.entities
            .get(&data_id)
            .filter(|e| e.territory == self.state.territory)
            .map(|e| EntityInfo {
                data_id,
                position: e.position,
                targetable: e.targetable,
            })
    }

    fn interact(&mut self, data_id: DataId) -> bool {
        self.calls.push(SimCall::Interact(data_id));
        if self.rejects() || self.find_entity(data_id).is_none_or(|e| !e.targetable) {
            return false;
        }
        self.fire(&SimTrigger::Interact(data_id));
        true
    }

    fn use_item(&mut self, item: ItemId, target: UseTarget) -> bool {
        self.calls.push(SimCall::UseItem(item, target));
        if self.rejects() || !self.state.has_item(item) {
            return false;
        }
        self.fire(&SimTrigger::UseItem(item));
        true
    }

    fn equip_item(&mut self, item: ItemId) -> bool {
        self.calls.push(SimCall::Equip(item));
        if self.rejects() || !self.state.has_item(item) {
            return false;
        }
        self.state.equipped.insert(item);
        self.fire(&SimTrigger::Equip(item));
        true
    }

    fn use_action(&mut self, action: ActionId, target: UseTarget) -> bool {
        self.calls.push(SimCall::Action(action, target));
        if self.rejects() {
            return false;
        }
        self.fire(&SimTrigger::Action(action));
        true
    }

    fn send_chat(&mut self, message: &str) -> bool {
        self.calls.push(SimCall::Chat(message.to_string()));
        if self.rejects() {
            return false;
        }
        self.fire(&SimTrigger::Say(message.to_string()));
        true
    }

    fn perform_emote(&mut self, emote: EmoteId, target: Option<DataId>) -> bool {
        self.calls.push(SimCall::Emote(emote, target));
        if self.rejects() {
            return false;
        }
        self.fire(&SimTrigger::Emote(emote));
        true
    }

    fn mount(&mut self) -> bool {
        self.calls.push(SimCall::Mount);
        if self.rejects() || !self.state.is_unlocked(Capability::Mount) {
            return false;
        }
        self.state.mounted = true;
        true
    }

    fn dismount(&mut self) -> bool {
        self.calls.push(SimCall::Dismount);
        if self.rejects() {
            return false;
        }
        self.state.mounted = false;
        true
    }

    fn teleport(&mut self, aetheryte: AetheryteId) -> bool {
        self.calls.push(SimCall::Teleport(aetheryte));
        if self.rejects() || !self.state.is_attuned(aetheryte) {
            return false;
        }
        let Some(&territory) = self.aetheryte_territories.get(&aetheryte) else {
            return false;
        };
        info!("sim: teleported to territory {territory}");
        self.state.territory = territory;
        self.state.mounted = false;
        self.arrive_at(aetheryte);
        self.start_loading();
        true
    }

    fn use_aethernet(&mut self, from: AetheryteId, to: AetheryteId) -> bool {
        self.calls.push(SimCall::Aethernet(from, to));
        if self.rejects() || !self.state.is_attuned(from) || !self.state.is_attuned(to) {
            return false;
        }
        self.arrive_at(to);
        self.start_loading();
        true
    }

    fn attune_aetheryte(&mut self, aetheryte: AetheryteId) -> bool {
        self.calls.push(SimCall::Attune(aetheryte));
        if self.rejects() {
            return false;
        }
        self.state.attuned_aetherytes.insert(aetheryte);
        true
    }

    fn enter_duty(&mut self, content: ContentId) -> bool {
        self.calls.push(SimCall::EnterDuty(content));
        if self.rejects() || self.state.duty.is_some() {
            return false;
        }
        self.state.duty = Some(content);
        self.duty_for = self.duty_ticks.max(1);
        if !self.aids.contains(&Aid::DutyAutomation) {
            // cleared by hand after entering
            self.fire(&SimTrigger::Duty(content));
        }
        true
    }

    fn move_to(&mut self, request: MoveRequest) -> bool {
        self.calls.push(SimCall::MoveTo(request));
        if self.rejects() || request.territory != self.state.territory {
            return false;
        }
        if let Some(reason) = &self.path_failure {
            self.movement = MovementState::Failed(reason.clone());
            return true;
        }
        if self.path_ticks == 0 {
            self.state.position = request.destination;
            self.movement = MovementState::Arrived;
        } else {
            self.movement = MovementState::Computing;
            self.pending = Some(PendingMove {
                request,
                remaining: self.path_ticks,
            });
        }
        true
    }

    fn movement_state(&self) -> MovementState {
        self.movement.clone()
    }

    fn stop_movement(&mut self) {
        self.calls.push(SimCall::StopMovement);
        self.pending = None;
        self.movement = MovementState::Idle;
    }

    fn aid_available(&self, aid: Aid) -> bool {
        self.aids.contains(&aid)
    }

    fn aid_active(&self, aid: Aid) -> bool {
        self.aids.contains(&aid)
    }
}

/// Load a simulated starting world from a RON file.
///
/// # Errors
/// - if the file cannot be read or is not a valid `SimScenario`
pub fn load_scenario(path: &Path) -> Result<SimScenario> {
    let text = fs::read_to_string(path).with_context(|| format!("reading sim scenario '{}'", path.display()))?;
    ron::from_str(&text).with_context(|| format!("parsing sim scenario '{}'", path.display()))
}
