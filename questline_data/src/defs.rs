use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an entity (NPC, object, aetheryte) in the live world.
pub type DataId = u32;
pub type ItemId = u32;
pub type TerritoryId = u16;
pub type AetheryteId = u32;
pub type ContentId = u32;
pub type EmoteId = u16;
pub type ActionId = u32;

/// The designated first sequence of every quest with steps.
pub const START_SEQUENCE: u8 = 0;
/// Reserved sentinel for the final / turn-in sequence.
pub const END_SEQUENCE: u8 = 255;
/// Number of quest work bytes a completion-flag pattern may address.
pub const QUEST_WORK_LEN: usize = 6;

/// Opaque, comparable quest identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestId(pub u32);

impl fmt::Display for QuestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}", self.0)
    }
}

/// A point in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Straight-line distance between two points.
    pub fn distance(&self, other: &Vec3) -> f32 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Distance on the ground plane, ignoring height.
    pub fn distance_2d(&self, other: &Vec3) -> f32 {
        let (dx, dz) = (self.x - other.x, self.z - other.z);
        (dx * dx + dz * dz).sqrt()
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

/// A complete quest as produced by the offline loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestDef {
    pub id: QuestId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author: Vec<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub sequences: Vec<SequenceDef>,
}

impl QuestDef {
    /// Look up a sequence by its declared number.
    pub fn sequence(&self, number: u8) -> Option<&SequenceDef> {
        self.sequences.iter().find(|s| s.sequence == number)
    }

    /// The lowest declared sequence strictly after `number`.
    ///
    /// Sequence numbers need not be contiguous. The end sentinel is the highest
    /// possible value, so it is always the last one found.
    pub fn next_sequence_after(&self, number: u8) -> Option<&SequenceDef> {
        self.sequences
            .iter()
            .filter(|s| s.sequence > number)
            .min_by_key(|s| s.sequence)
    }

    /// Total number of steps across every sequence.
    pub fn step_count(&self) -> usize {
        self.sequences.iter().map(|s| s.steps.len()).sum()
    }
}

/// One numbered stage of a quest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceDef {
    pub sequence: u8,
    #[serde(default)]
    pub steps: Vec<StepDef>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl SequenceDef {
    pub fn is_end(&self) -> bool {
        self.sequence == END_SEQUENCE
    }
}

/// Closed set of interaction intents a step may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InteractionType {
    #[default]
    WalkTo,
    Interact,
    UseItem,
    EquipItem,
    Say,
    Emote,
    Action,
    AttuneAetheryte,
    Duty,
    AcceptQuest,
    CompleteQuest,
    WaitForManualProgress,
}

impl InteractionType {
    /// Interactions the host refuses while the player is mounted.
    pub fn requires_dismount(self) -> bool {
        matches!(
            self,
            InteractionType::Interact
                | InteractionType::UseItem
                | InteractionType::EquipItem
                | InteractionType::Emote
                | InteractionType::Action
                | InteractionType::AttuneAetheryte
                | InteractionType::Duty
                | InteractionType::AcceptQuest
                | InteractionType::CompleteQuest
        )
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InteractionType::WalkTo => "walk-to",
            InteractionType::Interact => "interact",
            InteractionType::UseItem => "use-item",
            InteractionType::EquipItem => "equip-item",
            InteractionType::Say => "say",
            InteractionType::Emote => "emote",
            InteractionType::Action => "action",
            InteractionType::AttuneAetheryte => "attune-aetheryte",
            InteractionType::Duty => "duty",
            InteractionType::AcceptQuest => "accept-quest",
            InteractionType::CompleteQuest => "complete-quest",
            InteractionType::WaitForManualProgress => "wait-for-progress",
        };
        f.write_str(name)
    }
}

/// What an item is used on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ItemTarget {
    #[default]
    SelfTarget,
    /// The step's `data_id` entity.
    Entity,
    /// The step's `position`.
    Ground,
}

/// In-city fast travel between two aethernet shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AethernetShortcutDef {
    pub from: AetheryteId,
    pub to: AetheryteId,
}

/// One declarative unit of quest progress. Immutable once loaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepDef {
    pub interaction: InteractionType,
    #[serde(default)]
    pub territory: TerritoryId,
    #[serde(default)]
    pub position: Option<Vec3>,
    #[serde(default)]
    pub stop_distance: Option<f32>,
    #[serde(default)]
    pub data_id: Option<DataId>,
    #[serde(default)]
    pub item_id: Option<ItemId>,
    #[serde(default)]
    pub item_target: ItemTarget,
    #[serde(default)]
    pub chat_message: Option<String>,
    #[serde(default)]
    pub emote: Option<EmoteId>,
    #[serde(default)]
    pub action: Option<ActionId>,
    #[serde(default)]
    pub aetheryte: Option<AetheryteId>,
    #[serde(default)]
    pub content_id: Option<ContentId>,
    /// Quest accepted/completed by this step, when not the owning quest.
    #[serde(default)]
    pub target_quest: Option<QuestId>,
    #[serde(default)]
    pub aetheryte_shortcut: Option<AetheryteId>,
    #[serde(default)]
    pub aethernet_shortcut: Option<AethernetShortcutDef>,
    #[serde(default)]
    pub disable_navmesh: bool,
    /// `Some(true)` forces a mount before moving, `Some(false)` forbids one.
    #[serde(default)]
    pub mount: Option<bool>,
    #[serde(default)]
    pub fly: bool,
    #[serde(default)]
    pub land: bool,
    #[serde(default)]
    pub sprint: Option<bool>,
    #[serde(default)]
    pub ignore_distance_to_object: bool,
    #[serde(default)]
    pub completion_flags: Vec<Option<QuestWorkValue>>,
    #[serde(default)]
    pub skip_conditions: Option<SkipConditionsDef>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl StepDef {
    pub fn step_if(&self) -> Option<&SkipRuleDef> {
        self.skip_conditions.as_ref().and_then(|s| s.step_if.as_ref())
    }

    pub fn aetheryte_shortcut_if(&self) -> Option<&SkipRuleDef> {
        self.skip_conditions
            .as_ref()
            .and_then(|s| s.aetheryte_shortcut_if.as_ref())
    }

    pub fn aethernet_shortcut_if(&self) -> Option<&SkipRuleDef> {
        self.skip_conditions
            .as_ref()
            .and_then(|s| s.aethernet_shortcut_if.as_ref())
    }
}

/// Optional skip rules attached to a step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkipConditionsDef {
    /// Evaluated before the step is compiled into tasks.
    #[serde(default)]
    pub step_if: Option<SkipRuleDef>,
    /// When satisfied, the aetheryte teleport shortcut is not taken.
    #[serde(default)]
    pub aetheryte_shortcut_if: Option<SkipRuleDef>,
    /// When satisfied, the aethernet shortcut is not taken.
    #[serde(default)]
    pub aethernet_shortcut_if: Option<SkipRuleDef>,
}

/// A set of independently optional predicates.
///
/// Populated categories are OR'd when evaluated; `never` retires the whole rule
/// without deleting the authored data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkipRuleDef {
    #[serde(default)]
    pub never: bool,
    #[serde(default)]
    pub completion_flags: Vec<Option<QuestWorkValue>>,
    #[serde(default)]
    pub in_territory: Vec<TerritoryId>,
    #[serde(default)]
    pub not_in_territory: Vec<TerritoryId>,
    #[serde(default)]
    pub item_absent: Option<ItemId>,
    #[serde(default)]
    pub quests_accepted: Vec<QuestId>,
    #[serde(default)]
    pub quests_completed: Vec<QuestId>,
    #[serde(default)]
    pub nameplate_marker_absent: Vec<DataId>,
    #[serde(default)]
    pub capability_locked: Option<Capability>,
    #[serde(default)]
    pub capability_unlocked: Option<Capability>,
    #[serde(default)]
    pub aetheryte_locked: Option<AetheryteId>,
    #[serde(default)]
    pub aetheryte_unlocked: Option<AetheryteId>,
    #[serde(default)]
    pub near_position: Option<NearPositionDef>,
    #[serde(default)]
    pub not_near_position: Option<NearPositionDef>,
    #[serde(default)]
    pub extra_condition: Option<String>,
}

impl SkipRuleDef {
    /// True when no predicate category is populated.
    pub fn is_empty(&self) -> bool {
        !has_pattern(&self.completion_flags)
            && self.in_territory.is_empty()
            && self.not_in_territory.is_empty()
            && self.item_absent.is_none()
            && self.quests_accepted.is_empty()
            && self.quests_completed.is_empty()
            && self.nameplate_marker_absent.is_empty()
            && self.capability_locked.is_none()
            && self.capability_unlocked.is_none()
            && self.aetheryte_locked.is_none()
            && self.aetheryte_unlocked.is_none()
            && self.near_position.is_none()
            && self.not_near_position.is_none()
            && self.extra_condition.is_none()
    }
}

/// Returns true if a completion-flag pattern constrains at least one nibble.
pub fn has_pattern(pattern: &[Option<QuestWorkValue>]) -> bool {
    pattern.iter().flatten().any(|v| v.high.is_some() || v.low.is_some())
}

/// Expected value of one quest work byte, split into optional nibbles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuestWorkValue {
    #[serde(default)]
    pub high: Option<u8>,
    #[serde(default)]
    pub low: Option<u8>,
}

impl QuestWorkValue {
    pub const fn new(high: Option<u8>, low: Option<u8>) -> Self {
        Self { high, low }
    }

    /// Whether `byte` agrees with every populated nibble.
    pub fn matches(&self, byte: u8) -> bool {
        self.high.is_none_or(|h| byte >> 4 == h) && self.low.is_none_or(|l| byte & 0x0F == l)
    }
}

/// Named capabilities whose lock state a skip rule may test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    Flying,
    Mount,
    Sprint,
    Diving,
    Teleport,
}

/// Proximity test against a point in a specific territory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NearPositionDef {
    pub position: Vec3,
    #[serde(default = "default_near_radius")]
    pub radius: f32,
    pub territory: TerritoryId,
}

fn default_near_radius() -> f32 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequence(number: u8) -> SequenceDef {
        SequenceDef {
            sequence: number,
            steps: vec![StepDef::default()],
            comment: None,
        }
    }

    #[test]
    fn next_sequence_skips_gaps_and_ends_on_sentinel() {
        let quest = QuestDef {
            id: QuestId(1),
            name: "gaps".into(),
            author: Vec::new(),
            comment: None,
            disabled: false,
            sequences: vec![sequence(0), sequence(3), sequence(END_SEQUENCE), sequence(1)],
        };
        assert_eq!(quest.next_sequence_after(0).map(|s| s.sequence), Some(1));
        assert_eq!(quest.next_sequence_after(1).map(|s| s.sequence), Some(3));
        assert_eq!(quest.next_sequence_after(3).map(|s| s.sequence), Some(END_SEQUENCE));
        assert!(quest.next_sequence_after(END_SEQUENCE).is_none());
        assert_eq!(quest.step_count(), 4);
    }

    #[test]
    fn work_value_matches_populated_nibbles_only() {
        assert!(QuestWorkValue::new(Some(1), None).matches(0x1F));
        assert!(!QuestWorkValue::new(Some(2), None).matches(0x1F));
        assert!(QuestWorkValue::new(None, Some(0xF)).matches(0x3F));
        assert!(QuestWorkValue::new(Some(0), Some(2)).matches(0x02));
        assert!(QuestWorkValue::default().matches(0xAB));
    }

    #[test]
    fn empty_rule_detection_ignores_unconstrained_patterns() {
        let mut rule = SkipRuleDef {
            completion_flags: vec![None, Some(QuestWorkValue::default())],
            ..SkipRuleDef::default()
        };
        assert!(rule.is_empty());
        rule.in_territory.push(5);
        assert!(!rule.is_empty());
    }

    #[test]
    fn dismount_required_for_object_interactions() {
        assert!(InteractionType::Interact.requires_dismount());
        assert!(!InteractionType::WalkTo.requires_dismount());
        assert!(!InteractionType::Say.requires_dismount());
    }

    #[test]
    fn step_parses_from_ron_with_defaults() {
        let text = r#"(
            interaction: Interact,
            territory: 132,
            position: Some((x: 1.0, y: 2.0, z: 3.0)),
            data_id: Some(1000100),
            skip_conditions: Some((step_if: Some((in_territory: [5])))),
        )"#;
        let step: StepDef = ron::from_str(text).expect("parse step");
        assert_eq!(step.interaction, InteractionType::Interact);
        assert_eq!(step.data_id, Some(1_000_100));
        assert!(!step.fly);
        assert_eq!(step.step_if().map(|r| r.in_territory.clone()), Some(vec![5]));
    }
}
