#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
//! ** Questline **
//! Dry-run driver: executes one quest from the catalog against a simulated world.

use questline_engine::controller::{Controller, TickReport};
use questline_engine::data_paths::data_path;
use questline_engine::sim::{SimScenario, SimWorld, load_scenario};
use questline_engine::style::RunStyle;
use questline_engine::{QUESTLINE_VERSION, load_catalog, load_config};
use questline_data::QuestId;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use log::{info, warn};

use std::env;
use std::path::PathBuf;

/// Upper bound on simulated ticks before the run is abandoned.
const MAX_TICKS: usize = 100_000;

fn main() -> Result<()> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let Some(quest_arg) = args.next() else {
        bail!("usage: questline_engine <quest-id> [data-dir]");
    };
    let quest_id = QuestId(
        quest_arg
            .parse()
            .with_context(|| format!("'{quest_arg}' is not a quest id"))?,
    );
    let data_dir = args.next().map_or_else(|| data_path(""), PathBuf::from);
    info!("Start: questline {QUESTLINE_VERSION}, data from '{}'", data_dir.display());

    let config = load_config(&data_dir.join("questline.toml"));
    let catalog = load_catalog(&data_dir.join("quests")).context("while loading quest catalog")?;
    let Some(quest) = catalog.get(quest_id) else {
        bail!("quest {quest_id} is not in the catalog ({} quests loaded)", catalog.len());
    };

    let sim_path = data_dir.join("sim.ron");
    let scenario = if sim_path.is_file() {
        load_scenario(&sim_path).context("while loading simulated world")?
    } else {
        warn!("no '{}' found; simulating an empty world", sim_path.display());
        SimScenario::default()
    };
    let mut world = SimWorld::from_scenario(scenario);

    println!("{} {}", "quest".section_style(), format!("{quest_id} {}", quest.name).quest_style());
    let mut controller = Controller::new(config);
    controller.start(quest).context("while selecting quest")?;

    for _ in 0..MAX_TICKS {
        let report = match controller.tick(&mut world) {
            Ok(report) => report,
            Err(failure) => {
                println!("{} {}", "failed".section_style(), failure.to_string().error_style());
                return Err(failure).context("quest run failed");
            },
        };
        print_report(&report);
        if matches!(report, TickReport::QuestCompleted(_) | TickReport::Stopped(_)) {
            println!(
                "{} {} compilation(s), {} facade call(s)",
                "summary".section_style(),
                controller.compilations(),
                world.calls.len().to_string().bold()
            );
            return Ok(());
        }
        world.tick();
    }
    controller.stop("tick limit reached");
    bail!("quest {quest_id} did not finish within {MAX_TICKS} ticks");
}

fn print_report(report: &TickReport) {
    match report {
        TickReport::Compiled { cursor, tasks } => {
            println!("{} {tasks} task(s)", cursor.to_string().cursor_style());
        },
        TickReport::Skipped { cursor, reason } => {
            println!("{} {}", cursor.to_string().cursor_style(), format!("skipped: {reason}").skipped_style());
        },
        TickReport::TaskCompleted(task) => println!("  {} {}", "done".section_style(), task.task_style()),
        TickReport::Interrupted(why) => println!("  {}", format!("interrupted: {why:?}").interrupted_style()),
        TickReport::Resumed(cursor) => println!("  resumed at {}", cursor.to_string().cursor_style()),
        TickReport::SequenceAdvanced { from, to } => {
            println!("{} {from} -> {to}", "sequence".section_style());
        },
        TickReport::QuestCompleted(id) => println!("{}", format!("{id} complete").done_style()),
        TickReport::Stopped(reason) => println!("{}", format!("stopped: {reason}").error_style()),
        TickReport::Idle | TickReport::Working(_) => {},
    }
}
