use std::fs;
use std::path::{Path, PathBuf};

use qe::controller::{ControllerState, TickReport};
use qe::sim::load_scenario;
use qe::{Controller, SimWorld, load_catalog, load_config};
use questline_data::QuestId;
use questline_engine as qe;
use tempfile::TempDir;

const ERRAND: &str = r#"(
    id: 7,
    name: "Errand",
    sequences: [
        (sequence: 0, steps: [(interaction: AcceptQuest, data_id: Some(10))]),
        (sequence: 255, steps: [(interaction: CompleteQuest, data_id: Some(10))]),
    ],
)"#;

fn write(dir: &Path, name: &str, text: &str) {
    fs::write(dir.join(name), text).expect("write quest file");
}

fn shipped_data() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data")
}

#[test]
fn test_load_valid_catalog() {
    let dir = TempDir::new().expect("tempdir");
    write(dir.path(), "0007_errand.ron", ERRAND);
    write(dir.path(), "notes.txt", "not a quest");

    let catalog = load_catalog(dir.path()).expect("catalog loads");
    assert_eq!(catalog.len(), 1);
    let quest = catalog.get(QuestId(7)).expect("quest 7");
    assert_eq!(quest.name, "Errand");
    assert_eq!(quest.step_count(), 2);
    assert!(catalog.get(QuestId(8)).is_none());
}

#[test]
fn test_validation_errors_are_collected() {
    let dir = TempDir::new().expect("tempdir");
    let no_end = r#"(
        id: 1,
        name: "No end",
        sequences: [(sequence: 0, steps: [(interaction: Say)])],
    )"#;
    let no_start = r#"(
        id: 2,
        name: "No start",
        sequences: [(sequence: 255, steps: [(interaction: UseItem)])],
    )"#;
    write(dir.path(), "a.ron", no_end);
    write(dir.path(), "b.ron", no_start);

    let err = load_catalog(dir.path()).expect_err("invalid quests");
    let message = format!("{err:#}");
    assert!(message.contains("quest validation failed"), "{message}");
    assert!(message.contains("a.ron"), "{message}");
    assert!(message.contains("b.ron"), "{message}");
}

#[test]
fn test_duplicate_ids_rejected() {
    let dir = TempDir::new().expect("tempdir");
    write(dir.path(), "first.ron", ERRAND);
    write(dir.path(), "second.ron", ERRAND);

    let err = load_catalog(dir.path()).expect_err("duplicate ids");
    assert!(format!("{err:#}").contains("duplicate quest id"));
}

#[test]
fn test_malformed_file_names_path() {
    let dir = TempDir::new().expect("tempdir");
    write(dir.path(), "broken.ron", "(id: 3, name: ");

    let err = load_catalog(dir.path()).expect_err("malformed RON");
    assert!(format!("{err:#}").contains("broken.ron"));
}

#[test]
fn test_shipped_quests_run_to_completion() {
    let data = shipped_data();
    let config = load_config(&data.join("questline.toml"));
    let catalog = load_catalog(&data.join("quests")).expect("shipped catalog");
    assert_eq!(catalog.len(), 2);

    for id in catalog.ids().collect::<Vec<_>>() {
        let scenario = load_scenario(&data.join("sim.ron")).expect("shipped scenario");
        let mut world = SimWorld::from_scenario(scenario);
        let mut controller = Controller::new(config.clone());
        controller.start(catalog.get(id).expect("listed quest")).expect("start");

        let mut last = TickReport::Idle;
        for _ in 0..2_000 {
            if controller.state() == ControllerState::Idle {
                break;
            }
            last = controller.tick(&mut world).expect("shipped quest runs cleanly");
            world.tick();
        }
        assert_eq!(last, TickReport::QuestCompleted(id), "{id}");
        assert!(world.state.is_completed(id), "{id}");
    }
}
