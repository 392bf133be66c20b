//! Skip evaluator.
//!
//! Pure functions that decide, against a read-only [`WorldSnapshot`], whether a
//! step or a traversal shortcut should be bypassed. Nothing in here mutates
//! state, so evaluating the same rule twice against the same snapshot always
//! gives the same answer.
//!
//! Populated predicate categories are OR'd: a rule fires as soon as any one of
//! them matches. List-valued categories are OR'd internally too. A rule with
//! `never` set is retired and never fires.

use std::fmt;

use questline_data::{
    AethernetShortcutDef, AetheryteId, Capability, DataId, InteractionType, ItemId, NearPositionDef, QuestId,
    QuestWorkValue, SkipRuleDef, StepDef, TerritoryId, has_pattern,
};

use crate::world::WorldSnapshot;

/// Why something was skipped. Diagnostic only.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    InTerritory(TerritoryId),
    NotInTerritory(TerritoryId),
    ItemAbsent(ItemId),
    CompletionFlagsMatch,
    QuestAccepted(QuestId),
    QuestCompleted(QuestId),
    MarkerAbsent(DataId),
    CapabilityLocked(Capability),
    CapabilityUnlocked(Capability),
    AetheryteLocked(AetheryteId),
    AetheryteUnlocked(AetheryteId),
    NearPosition,
    NotNearPosition,
    ExtraCondition(String),
    AlreadyAttuned(AetheryteId),
    AlreadyInTerritory(TerritoryId),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InTerritory(t) => write!(f, "in territory {t}"),
            SkipReason::NotInTerritory(t) => write!(f, "not in territory {t}"),
            SkipReason::ItemAbsent(i) => write!(f, "item {i} not in inventory"),
            SkipReason::CompletionFlagsMatch => f.write_str("quest work matches completion flags"),
            SkipReason::QuestAccepted(q) => write!(f, "quest {q} accepted"),
            SkipReason::QuestCompleted(q) => write!(f, "quest {q} completed"),
            SkipReason::MarkerAbsent(d) => write!(f, "no quest marker on {d}"),
            SkipReason::CapabilityLocked(c) => write!(f, "{c:?} locked"),
            SkipReason::CapabilityUnlocked(c) => write!(f, "{c:?} unlocked"),
            SkipReason::AetheryteLocked(a) => write!(f, "aetheryte {a} not attuned"),
            SkipReason::AetheryteUnlocked(a) => write!(f, "aetheryte {a} attuned"),
            SkipReason::NearPosition => f.write_str("near position"),
            SkipReason::NotNearPosition => f.write_str("not near position"),
            SkipReason::ExtraCondition(tag) => write!(f, "extra condition '{tag}'"),
            SkipReason::AlreadyAttuned(a) => write!(f, "aetheryte {a} already attuned"),
            SkipReason::AlreadyInTerritory(t) => write!(f, "already in territory {t}"),
        }
    }
}

/// Evaluate a rule, returning the first matching category.
///
/// `quest` selects which quest's work values a completion-flag pattern is
/// compared against.
pub fn rule_match(rule: &SkipRuleDef, quest: QuestId, world: &WorldSnapshot) -> Option<SkipReason> {
    if rule.never || rule.is_empty() {
        return None;
    }

    if rule.in_territory.contains(&world.territory) {
        return Some(SkipReason::InTerritory(world.territory));
    }
    if !rule.not_in_territory.is_empty() && !rule.not_in_territory.contains(&world.territory) {
        return Some(SkipReason::NotInTerritory(world.territory));
    }
    if let Some(item) = rule.item_absent
        && !world.has_item(item)
    {
        return Some(SkipReason::ItemAbsent(item));
    }
    if completion_flags_match(&rule.completion_flags, quest, world) {
        return Some(SkipReason::CompletionFlagsMatch);
    }
    if let Some(q) = rule.quests_accepted.iter().find(|q| world.is_accepted(**q)) {
        return Some(SkipReason::QuestAccepted(*q));
    }
    if let Some(q) = rule.quests_completed.iter().find(|q| world.is_completed(**q)) {
        return Some(SkipReason::QuestCompleted(*q));
    }
    if let Some(d) = rule
        .nameplate_marker_absent
        .iter()
        .find(|d| !world.marked_entities.contains(*d))
    {
        return Some(SkipReason::MarkerAbsent(*d));
    }
    if let Some(c) = rule.capability_locked
        && !world.is_unlocked(c)
    {
        return Some(SkipReason::CapabilityLocked(c));
    }
    if let Some(c) = rule.capability_unlocked
        && world.is_unlocked(c)
    {
        return Some(SkipReason::CapabilityUnlocked(c));
    }
    if let Some(a) = rule.aetheryte_locked
        && !world.is_attuned(a)
    {
        return Some(SkipReason::AetheryteLocked(a));
    }
    if let Some(a) = rule.aetheryte_unlocked
        && world.is_attuned(a)
    {
        return Some(SkipReason::AetheryteUnlocked(a));
    }
    if let Some(near) = &rule.near_position
        && is_near(near, world)
    {
        return Some(SkipReason::NearPosition);
    }
    if let Some(near) = &rule.not_near_position
        && !is_near(near, world)
    {
        return Some(SkipReason::NotNearPosition);
    }
    if let Some(tag) = &rule.extra_condition
        && world.extra_conditions.contains(tag)
    {
        return Some(SkipReason::ExtraCondition(tag.clone()));
    }
    None
}

pub fn rule_fires(rule: &SkipRuleDef, quest: QuestId, world: &WorldSnapshot) -> bool {
    rule_match(rule, quest, world).is_some()
}

/// Decide whether a step should be skipped before it is compiled.
///
/// Checks the authored step-skip rule first, then the built-in skips for steps
/// whose effect is already visible in the world.
pub fn step_skip_reason(quest: QuestId, step: &StepDef, world: &WorldSnapshot) -> Option<SkipReason> {
    if let Some(rule) = step.step_if()
        && let Some(reason) = rule_match(rule, quest, world)
    {
        return Some(reason);
    }

    let target = step.target_quest.unwrap_or(quest);
    match step.interaction {
        InteractionType::AttuneAetheryte => {
            if let Some(a) = step.aetheryte
                && world.is_attuned(a)
            {
                return Some(SkipReason::AlreadyAttuned(a));
            }
        },
        InteractionType::AcceptQuest => {
            if world.is_completed(target) {
                return Some(SkipReason::QuestCompleted(target));
            }
            if world.is_accepted(target) {
                return Some(SkipReason::QuestAccepted(target));
            }
        },
        InteractionType::CompleteQuest => {
            if world.is_completed(target) {
                return Some(SkipReason::QuestCompleted(target));
            }
        },
        _ => {},
    }

    if completion_flags_match(&step.completion_flags, quest, world) {
        return Some(SkipReason::CompletionFlagsMatch);
    }
    None
}

/// Decide whether an aetheryte teleport into `step` should be bypassed.
///
/// Only movement factories consult this; it never skips the step itself.
pub fn shortcut_skip_reason(
    rule: Option<&SkipRuleDef>,
    quest: QuestId,
    aetheryte: AetheryteId,
    step: &StepDef,
    world: &WorldSnapshot,
) -> Option<SkipReason> {
    if let Some(rule) = rule
        && let Some(reason) = rule_match(rule, quest, world)
    {
        return Some(reason);
    }
    if world.territory == step.territory {
        return Some(SkipReason::AlreadyInTerritory(step.territory));
    }
    if !world.is_attuned(aetheryte) {
        return Some(SkipReason::AetheryteLocked(aetheryte));
    }
    None
}

/// Decide whether an in-city aethernet hop into `step` should be bypassed.
pub fn aethernet_skip_reason(
    rule: Option<&SkipRuleDef>,
    quest: QuestId,
    shortcut: AethernetShortcutDef,
    world: &WorldSnapshot,
) -> Option<SkipReason> {
    if let Some(rule) = rule
        && let Some(reason) = rule_match(rule, quest, world)
    {
        return Some(reason);
    }
    [shortcut.from, shortcut.to]
        .into_iter()
        .find(|a| !world.is_attuned(*a))
        .map(SkipReason::AetheryteLocked)
}

/// Whether a quest's current work bytes satisfy a completion-flag pattern.
///
/// An empty or fully unconstrained pattern never matches, nor does a quest the
/// world reports no work values for.
pub fn completion_flags_match(pattern: &[Option<QuestWorkValue>], quest: QuestId, world: &WorldSnapshot) -> bool {
    if !has_pattern(pattern) {
        return false;
    }
    let Some(work) = world.work(quest) else {
        return false;
    };
    pattern
        .iter()
        .zip(work.iter())
        .all(|(expected, byte)| expected.is_none_or(|v| v.matches(*byte)))
}

fn is_near(near: &NearPositionDef, world: &WorldSnapshot) -> bool {
    world.territory == near.territory && world.position.distance(&near.position) <= near.radius
}

#[cfg(test)]
mod tests {
    use super::*;
    use questline_data::Vec3;

    const QUEST: QuestId = QuestId(100);

    fn world() -> WorldSnapshot {
        WorldSnapshot {
            territory: 5,
            position: Vec3::new(10.0, 0.0, 10.0),
            ..WorldSnapshot::default()
        }
    }

    fn step_with_rule(interaction: InteractionType, rule: SkipRuleDef) -> StepDef {
        StepDef {
            interaction,
            territory: 5,
            skip_conditions: Some(questline_data::SkipConditionsDef {
                step_if: Some(rule),
                ..Default::default()
            }),
            ..StepDef::default()
        }
    }

    #[test]
    fn territory_membership_is_ored() {
        let rule = SkipRuleDef {
            in_territory: vec![1, 5, 9],
            ..SkipRuleDef::default()
        };
        assert_eq!(rule_match(&rule, QUEST, &world()), Some(SkipReason::InTerritory(5)));

        let rule = SkipRuleDef {
            not_in_territory: vec![1, 2],
            ..SkipRuleDef::default()
        };
        assert!(rule_fires(&rule, QUEST, &world()));
        let rule = SkipRuleDef {
            not_in_territory: vec![5],
            ..SkipRuleDef::default()
        };
        assert!(!rule_fires(&rule, QUEST, &world()));
    }

    #[test]
    fn never_dominates_every_populated_predicate() {
        let mut snapshot = world();
        snapshot.extra_conditions.insert("inside".into());
        let rule = SkipRuleDef {
            never: true,
            in_territory: vec![5],
            item_absent: Some(77),
            capability_locked: Some(Capability::Flying),
            extra_condition: Some("inside".into()),
            near_position: Some(NearPositionDef {
                position: Vec3::new(10.0, 0.0, 10.0),
                radius: 5.0,
                territory: 5,
            }),
            ..SkipRuleDef::default()
        };
        assert!(!rule_fires(&rule, QUEST, &snapshot));
        let step = step_with_rule(InteractionType::Interact, rule);
        assert!(step_skip_reason(QUEST, &step, &snapshot).is_none());
    }

    #[test]
    fn categories_are_ored() {
        let mut snapshot = world();
        snapshot.inventory.insert(77, 1);
        let rule = SkipRuleDef {
            in_territory: vec![99],
            item_absent: Some(77),
            quests_completed: vec![QuestId(3)],
            ..SkipRuleDef::default()
        };
        assert!(!rule_fires(&rule, QUEST, &snapshot));
        snapshot.completed_quests.insert(QuestId(3));
        assert_eq!(
            rule_match(&rule, QUEST, &snapshot),
            Some(SkipReason::QuestCompleted(QuestId(3)))
        );
    }

    #[test]
    fn empty_rule_never_fires() {
        assert!(!rule_fires(&SkipRuleDef::default(), QUEST, &world()));
    }

    #[test]
    fn completion_flags_compare_against_owning_quest() {
        let mut snapshot = world();
        let pattern = vec![Some(QuestWorkValue::new(Some(1), None)), None, Some(QuestWorkValue::new(None, Some(2)))];
        assert!(!completion_flags_match(&pattern, QUEST, &snapshot));
        snapshot.quest_work.insert(QUEST, [0x13, 0xFF, 0x02, 0, 0, 0]);
        assert!(completion_flags_match(&pattern, QUEST, &snapshot));
        assert!(!completion_flags_match(&pattern, QuestId(101), &snapshot));
        snapshot.quest_work.insert(QUEST, [0x23, 0xFF, 0x02, 0, 0, 0]);
        assert!(!completion_flags_match(&pattern, QUEST, &snapshot));
    }

    #[test]
    fn proximity_requires_matching_territory() {
        let near = NearPositionDef {
            position: Vec3::new(12.0, 0.0, 10.0),
            radius: 3.0,
            territory: 5,
        };
        let rule = SkipRuleDef {
            near_position: Some(near),
            ..SkipRuleDef::default()
        };
        assert!(rule_fires(&rule, QUEST, &world()));
        let elsewhere = NearPositionDef { territory: 6, ..near };
        let rule = SkipRuleDef {
            near_position: Some(elsewhere),
            ..SkipRuleDef::default()
        };
        assert!(!rule_fires(&rule, QUEST, &world()));
        let rule = SkipRuleDef {
            not_near_position: Some(elsewhere),
            ..SkipRuleDef::default()
        };
        assert_eq!(rule_match(&rule, QUEST, &world()), Some(SkipReason::NotNearPosition));
    }

    #[test]
    fn markers_and_capabilities() {
        let mut snapshot = world();
        snapshot.marked_entities.insert(1_000_001);
        let rule = SkipRuleDef {
            nameplate_marker_absent: vec![1_000_001, 1_000_002],
            ..SkipRuleDef::default()
        };
        assert_eq!(
            rule_match(&rule, QUEST, &snapshot),
            Some(SkipReason::MarkerAbsent(1_000_002))
        );

        let rule = SkipRuleDef {
            capability_unlocked: Some(Capability::Flying),
            ..SkipRuleDef::default()
        };
        assert!(!rule_fires(&rule, QUEST, &snapshot));
        snapshot.unlocked.insert(Capability::Flying);
        assert!(rule_fires(&rule, QUEST, &snapshot));
    }

    #[test]
    fn evaluation_is_idempotent() {
        let mut snapshot = world();
        snapshot.extra_conditions.insert("lobby".into());
        let rule = SkipRuleDef {
            extra_condition: Some("lobby".into()),
            ..SkipRuleDef::default()
        };
        let first = rule_match(&rule, QUEST, &snapshot);
        let second = rule_match(&rule, QUEST, &snapshot);
        assert_eq!(first, second);
        assert_eq!(first, Some(SkipReason::ExtraCondition("lobby".into())));
    }

    #[test]
    fn built_in_skips_for_finished_effects() {
        let mut snapshot = world();
        snapshot.attuned_aetherytes.insert(8);
        let attune = StepDef {
            interaction: InteractionType::AttuneAetheryte,
            aetheryte: Some(8),
            ..StepDef::default()
        };
        assert_eq!(
            step_skip_reason(QUEST, &attune, &snapshot),
            Some(SkipReason::AlreadyAttuned(8))
        );

        let accept = StepDef {
            interaction: InteractionType::AcceptQuest,
            ..StepDef::default()
        };
        assert!(step_skip_reason(QUEST, &accept, &snapshot).is_none());
        snapshot.accepted_quests.insert(QUEST);
        assert_eq!(
            step_skip_reason(QUEST, &accept, &snapshot),
            Some(SkipReason::QuestAccepted(QUEST))
        );

        let complete_other = StepDef {
            interaction: InteractionType::CompleteQuest,
            target_quest: Some(QuestId(9)),
            ..StepDef::default()
        };
        assert!(step_skip_reason(QUEST, &complete_other, &snapshot).is_none());
        snapshot.completed_quests.insert(QuestId(9));
        assert!(step_skip_reason(QUEST, &complete_other, &snapshot).is_some());
    }

    #[test]
    fn shortcut_bypassed_when_already_there_or_locked() {
        let step = StepDef {
            interaction: InteractionType::Interact,
            territory: 5,
            ..StepDef::default()
        };
        let mut snapshot = world();
        assert_eq!(
            shortcut_skip_reason(None, QUEST, 8, &step, &snapshot),
            Some(SkipReason::AlreadyInTerritory(5))
        );
        snapshot.territory = 6;
        assert_eq!(
            shortcut_skip_reason(None, QUEST, 8, &step, &snapshot),
            Some(SkipReason::AetheryteLocked(8))
        );
        snapshot.attuned_aetherytes.insert(8);
        assert!(shortcut_skip_reason(None, QUEST, 8, &step, &snapshot).is_none());
        let rule = SkipRuleDef {
            in_territory: vec![6],
            ..SkipRuleDef::default()
        };
        assert!(shortcut_skip_reason(Some(&rule), QUEST, 8, &step, &snapshot).is_some());
    }

    #[test]
    fn aethernet_needs_both_shards_attuned() {
        let hop = AethernetShortcutDef { from: 8, to: 40 };
        let mut snapshot = world();
        snapshot.attuned_aetherytes.insert(8);
        assert_eq!(
            aethernet_skip_reason(None, QUEST, hop, &snapshot),
            Some(SkipReason::AetheryteLocked(40))
        );
        snapshot.attuned_aetherytes.insert(40);
        assert!(aethernet_skip_reason(None, QUEST, hop, &snapshot).is_none());
    }
}
