//! Loader for the quest catalog.
//!
//! Quests are stored one per RON file under `quests/`. Every file is parsed
//! and validated before anything runs; all problems are reported together.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::{info, warn};
use questline_data::{QuestDef, QuestId, validate_quest};

/// Every loaded quest, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct QuestCatalog {
    quests: BTreeMap<QuestId, Arc<QuestDef>>,
}

impl QuestCatalog {
    pub fn get(&self, id: QuestId) -> Option<Arc<QuestDef>> {
        self.quests.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.quests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quests.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = QuestId> + '_ {
        self.quests.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuestDef> {
        self.quests.values().map(AsRef::as_ref)
    }

    /// Add a quest, rejecting duplicate ids.
    ///
    /// # Errors
    /// - if a quest with the same id is already present
    pub fn insert(&mut self, quest: QuestDef) -> Result<()> {
        let id = quest.id;
        if self.quests.contains_key(&id) {
            bail!("duplicate quest id {id}");
        }
        self.quests.insert(id, Arc::new(quest));
        Ok(())
    }
}

/// Parse a single quest definition from RON text.
///
/// # Errors
/// - if the text is not a valid `QuestDef`
pub fn parse_quest(text: &str) -> Result<QuestDef> {
    ron::from_str(text).context("parsing quest RON")
}

/// Read one quest file.
///
/// # Errors
/// - on file IO or deserialization failure
pub fn load_quest(path: &Path) -> Result<QuestDef> {
    let text = fs::read_to_string(path).with_context(|| format!("reading quest file '{}'", path.display()))?;
    parse_quest(&text).with_context(|| format!("in quest file '{}'", path.display()))
}

/// Load and validate every `*.ron` quest in `dir`.
///
/// # Errors
/// - if the directory cannot be read, any file fails to parse, two files share
///   a quest id, or any quest fails validation
pub fn load_catalog(dir: &Path) -> Result<QuestCatalog> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading quest directory '{}'", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "ron"))
        .collect();
    paths.sort();

    let mut catalog = QuestCatalog::default();
    let mut problems = Vec::new();
    for path in &paths {
        let quest = load_quest(path)?;
        if quest.disabled {
            warn!("{} ('{}') is disabled", quest.id, quest.name);
        }
        problems.extend(
            validate_quest(&quest)
                .into_iter()
                .map(|err| format!("- {}: {err}", path.display())),
        );
        catalog
            .insert(quest)
            .with_context(|| format!("while loading '{}'", path.display()))?;
    }

    if !problems.is_empty() {
        bail!("quest validation failed:\n{}", problems.join("\n"));
    }
    info!("{} quests loaded from '{}'", catalog.len(), dir.display());
    Ok(catalog)
}
