use std::collections::HashSet;
use std::fmt;

use crate::*;

/// Validation error for malformed quest data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    DuplicateSequence { quest: QuestId, sequence: u8 },
    MissingStartSequence { quest: QuestId },
    SequenceOrder { quest: QuestId, sequence: u8, previous: u8 },
    MissingParameter { context: String, parameter: &'static str },
    InvalidValue { context: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::DuplicateSequence { quest, sequence } => {
                write!(f, "quest {quest}: duplicate sequence {sequence}")
            },
            ValidationError::MissingStartSequence { quest } => {
                write!(f, "quest {quest}: has steps but no sequence {START_SEQUENCE}")
            },
            ValidationError::SequenceOrder {
                quest,
                sequence,
                previous,
            } => {
                write!(f, "quest {quest}: sequence {sequence} declared after {previous}")
            },
            ValidationError::MissingParameter { context, parameter } => {
                write!(f, "missing '{parameter}' ({context})")
            },
            ValidationError::InvalidValue { context } => {
                write!(f, "invalid value ({context})")
            },
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate sequence structure and per-step required parameters.
///
/// ```
/// use questline_data::{InteractionType, QuestDef, QuestId, SequenceDef, StepDef, Vec3, validate_quest};
///
/// let quest = QuestDef {
///     id: QuestId(7),
///     name: "Demo".into(),
///     author: vec!["someone".into()],
///     comment: None,
///     disabled: false,
///     sequences: vec![SequenceDef {
///         sequence: 0,
///         steps: vec![StepDef {
///             interaction: InteractionType::WalkTo,
///             territory: 132,
///             position: Some(Vec3::new(1.0, 0.0, 1.0)),
///             ..StepDef::default()
///         }],
///         comment: None,
///     }],
/// };
/// assert!(validate_quest(&quest).is_empty());
/// ```
pub fn validate_quest(quest: &QuestDef) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    let mut previous: Option<u8> = None;
    for seq in &quest.sequences {
        if !seen.insert(seq.sequence) {
            errors.push(ValidationError::DuplicateSequence {
                quest: quest.id,
                sequence: seq.sequence,
            });
        }
        if let Some(prev) = previous
            && seq.sequence <= prev
        {
            errors.push(ValidationError::SequenceOrder {
                quest: quest.id,
                sequence: seq.sequence,
                previous: prev,
            });
        }
        previous = Some(seq.sequence);
    }

    if quest.step_count() > 0 && !seen.contains(&START_SEQUENCE) {
        errors.push(ValidationError::MissingStartSequence { quest: quest.id });
    }

    for seq in &quest.sequences {
        for (index, step) in seq.steps.iter().enumerate() {
            let context = format!("quest {} sequence {} step {index}", quest.id, seq.sequence);
            validate_step(step, &context, &mut errors);
        }
    }

    errors
}

fn validate_step(step: &StepDef, context: &str, errors: &mut Vec<ValidationError>) {
    let mut require = |present: bool, parameter: &'static str| {
        if !present {
            errors.push(ValidationError::MissingParameter {
                context: format!("{context} ({})", step.interaction),
                parameter,
            });
        }
    };

    match step.interaction {
        InteractionType::WalkTo => require(step.position.is_some(), "position"),
        InteractionType::Interact => require(step.data_id.is_some(), "data_id"),
        InteractionType::UseItem => {
            require(step.item_id.is_some(), "item_id");
            match step.item_target {
                ItemTarget::Entity => require(step.data_id.is_some(), "data_id"),
                ItemTarget::Ground => require(step.position.is_some(), "position"),
                ItemTarget::SelfTarget => {},
            }
        },
        InteractionType::EquipItem => require(step.item_id.is_some(), "item_id"),
        InteractionType::Say => require(step.chat_message.is_some(), "chat_message"),
        InteractionType::Emote => require(step.emote.is_some(), "emote"),
        InteractionType::Action => require(step.action.is_some(), "action"),
        InteractionType::AttuneAetheryte => require(step.aetheryte.is_some(), "aetheryte"),
        InteractionType::Duty => require(step.content_id.is_some(), "content_id"),
        InteractionType::AcceptQuest
        | InteractionType::CompleteQuest
        | InteractionType::WaitForManualProgress => {},
    }

    if let Some(distance) = step.stop_distance
        && distance <= 0.0
    {
        errors.push(ValidationError::InvalidValue {
            context: format!("{context}: stop distance must be positive ({distance})"),
        });
    }

    validate_pattern(&step.completion_flags, &format!("{context} completion flags"), errors);

    if let Some(skip) = &step.skip_conditions {
        let rules = [
            ("step_if", &skip.step_if),
            ("aetheryte_shortcut_if", &skip.aetheryte_shortcut_if),
            ("aethernet_shortcut_if", &skip.aethernet_shortcut_if),
        ];
        for (name, rule) in rules {
            if let Some(rule) = rule {
                validate_rule(rule, &format!("{context} {name}"), errors);
            }
        }
    }
}

fn validate_rule(rule: &SkipRuleDef, context: &str, errors: &mut Vec<ValidationError>) {
    validate_pattern(&rule.completion_flags, context, errors);
    for near in [&rule.near_position, &rule.not_near_position].into_iter().flatten() {
        if near.radius <= 0.0 {
            errors.push(ValidationError::InvalidValue {
                context: format!("{context}: radius must be positive ({})", near.radius),
            });
        }
    }
    if rule.extra_condition.as_deref().is_some_and(|tag| tag.trim().is_empty()) {
        errors.push(ValidationError::InvalidValue {
            context: format!("{context}: empty extra condition tag"),
        });
    }
}

fn validate_pattern(pattern: &[Option<QuestWorkValue>], context: &str, errors: &mut Vec<ValidationError>) {
    if pattern.len() > QUEST_WORK_LEN {
        errors.push(ValidationError::InvalidValue {
            context: format!("{context}: {} entries, at most {QUEST_WORK_LEN}", pattern.len()),
        });
    }
    for value in pattern.iter().flatten() {
        for nibble in [value.high, value.low].into_iter().flatten() {
            if nibble > 0x0F {
                errors.push(ValidationError::InvalidValue {
                    context: format!("{context}: nibble out of range ({nibble})"),
                });
            }
        }
    }
}
