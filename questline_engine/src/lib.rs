#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]

pub const QUESTLINE_VERSION: &str = env!("CARGO_PKG_VERSION");

// Core modules
pub mod config;
pub mod controller;
pub mod data_paths;
pub mod factory;
pub mod loader;
pub mod sim;
pub mod skip;
pub mod style;
pub mod task;
pub mod world;

// Re-exports for convenience
pub use config::{EngineConfig, load_config};
pub use controller::{Controller, ControllerState, Cursor, Interruption, RunFailure, SharedController, TickReport};
pub use factory::{FACTORY_ORDER, FactoryKind, StepContext, compile_step};
pub use loader::{QuestCatalog, load_catalog};
pub use sim::SimWorld;
pub use task::{Task, TaskError, TaskKind, TaskList, TaskStatus};
pub use world::{WorldFacade, WorldSnapshot};
