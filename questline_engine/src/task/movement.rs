//! Traversal tasks: mounting, pathfinding, and fast-travel shortcuts.

use std::fmt;

use log::{debug, info, warn};
use questline_data::{AethernetShortcutDef, AetheryteId, Capability, TerritoryId, Vec3};

use super::{Retry, Task, TaskError, TaskKind, TaskStatus, Timeout};
use crate::config::EngineConfig;
use crate::world::{MovementState, MoveRequest, WorldFacade};

/// Ground-plane arrival radius around the destination shard of an aethernet hop.
pub const AETHERNET_ARRIVAL_RADIUS: f32 = 20.0;

/// Summon a mount before moving.
#[derive(Debug, Clone)]
pub struct Mount {
    retry: Retry,
    timeout: Timeout,
}

impl Mount {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            retry: Retry::new(config.interaction_attempts, config.retry_delay()),
            timeout: Timeout::new(config.mount_timeout()),
        }
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Mount")
    }
}

impl Task for Mount {
    fn start(&mut self, world: &mut dyn WorldFacade) -> Result<bool, TaskError> {
        let snapshot = world.snapshot();
        if snapshot.mounted {
            return Ok(false);
        }
        if !snapshot.is_unlocked(Capability::Mount) {
            warn!("mount requested but mounting is locked; continuing on foot");
            return Ok(false);
        }
        self.timeout.arm(world.now());
        let accepted = world.mount();
        self.retry.record(accepted, world.now()).map_err(|e| e.rejected(self))?;
        Ok(accepted)
    }

    fn update(&mut self, world: &mut dyn WorldFacade) -> Result<TaskStatus, TaskError> {
        let snapshot = world.snapshot();
        if snapshot.mounted || !snapshot.is_unlocked(Capability::Mount) {
            return Ok(TaskStatus::Complete);
        }
        let now = world.now();
        self.timeout.arm(now);
        self.timeout.check(now, self)?;
        if !snapshot.busy && self.retry.due(now) {
            let accepted = world.mount();
            self.retry.record(accepted, now).map_err(|e| e.rejected(self))?;
        }
        Ok(TaskStatus::StillRunning)
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Mount
    }
}

/// Get off the mount before an interaction the host refuses while mounted.
#[derive(Debug, Clone)]
pub struct Dismount {
    retry: Retry,
    timeout: Timeout,
}

impl Dismount {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            retry: Retry::new(config.interaction_attempts, config.retry_delay()),
            timeout: Timeout::new(config.mount_timeout()),
        }
    }
}

impl fmt::Display for Dismount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Dismount")
    }
}

impl Task for Dismount {
    fn start(&mut self, world: &mut dyn WorldFacade) -> Result<bool, TaskError> {
        if !world.snapshot().mounted {
            return Ok(false);
        }
        self.timeout.arm(world.now());
        let accepted = world.dismount();
        self.retry.record(accepted, world.now()).map_err(|e| e.rejected(self))?;
        Ok(accepted)
    }

    fn update(&mut self, world: &mut dyn WorldFacade) -> Result<TaskStatus, TaskError> {
        let snapshot = world.snapshot();
        if !snapshot.mounted {
            return Ok(TaskStatus::Complete);
        }
        let now = world.now();
        self.timeout.arm(now);
        self.timeout.check(now, self)?;
        if !snapshot.busy && self.retry.due(now) {
            let accepted = world.dismount();
            self.retry.record(accepted, now).map_err(|e| e.rejected(self))?;
        }
        Ok(TaskStatus::StillRunning)
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Dismount
    }
}

/// Walk (or fly) to a point through the external pathfinder.
#[derive(Debug, Clone)]
pub struct MoveTo {
    request: MoveRequest,
    retry: Retry,
    territory_wait: Timeout,
    issued: bool,
}

impl MoveTo {
    pub fn new(request: MoveRequest, config: &EngineConfig) -> Self {
        Self {
            request,
            retry: Retry::new(config.interaction_attempts, config.retry_delay()),
            territory_wait: Timeout::new(config.teleport_timeout()),
            issued: false,
        }
    }

    pub fn request(&self) -> &MoveRequest {
        &self.request
    }

    fn arrived(&self, territory: TerritoryId, position: &Vec3) -> bool {
        territory == self.request.territory && position.distance(&self.request.destination) <= self.request.stop_distance
    }

    fn issue(&mut self, world: &mut dyn WorldFacade) -> Result<bool, TaskError> {
        let accepted = world.move_to(self.request);
        let now = world.now();
        self.issued |= accepted;
        self.retry.record(accepted, now).map_err(|e| e.rejected(self))?;
        Ok(accepted)
    }
}

impl fmt::Display for MoveTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.request.fly { "fly" } else { "walk" };
        write!(
            f,
            "MoveTo({mode} {} in {}, stop {:.1})",
            self.request.destination, self.request.territory, self.request.stop_distance
        )
    }
}

impl Task for MoveTo {
    fn start(&mut self, world: &mut dyn WorldFacade) -> Result<bool, TaskError> {
        let snapshot = world.snapshot();
        if self.arrived(snapshot.territory, &snapshot.position) {
            debug!("{self}: already at destination");
            return Ok(false);
        }
        if snapshot.territory != self.request.territory {
            self.territory_wait.arm(world.now());
            return Ok(false);
        }
        self.issue(world)
    }

    fn update(&mut self, world: &mut dyn WorldFacade) -> Result<TaskStatus, TaskError> {
        let snapshot = world.snapshot();
        if self.arrived(snapshot.territory, &snapshot.position) {
            if self.issued && !world.movement_state().is_idle() {
                world.stop_movement();
            }
            return Ok(TaskStatus::Complete);
        }

        let now = world.now();
        if snapshot.territory != self.request.territory {
            // the host may still be loading into the destination zone
            self.territory_wait.arm(now);
            self.territory_wait.check(now, self)?;
            return Ok(TaskStatus::StillRunning);
        }
        self.territory_wait.reset();

        match world.movement_state() {
            MovementState::Computing | MovementState::Running => Ok(TaskStatus::StillRunning),
            MovementState::Failed(reason) => Err(TaskError::PathfindingFailed(reason)),
            MovementState::Arrived | MovementState::Idle => {
                // stopped short of the destination, or never started
                if !snapshot.busy && self.retry.due(now) {
                    self.issue(world)?;
                }
                Ok(TaskStatus::StillRunning)
            },
        }
    }

    fn kind(&self) -> TaskKind {
        TaskKind::MoveTo
    }
}

/// Teleport to an aetheryte in the destination territory.
#[derive(Debug, Clone)]
pub struct Teleport {
    aetheryte: AetheryteId,
    destination: TerritoryId,
    retry: Retry,
    timeout: Timeout,
}

impl Teleport {
    pub fn new(aetheryte: AetheryteId, destination: TerritoryId, config: &EngineConfig) -> Self {
        Self {
            aetheryte,
            destination,
            retry: Retry::new(config.interaction_attempts, config.retry_delay()),
            timeout: Timeout::new(config.teleport_timeout()),
        }
    }
}

impl fmt::Display for Teleport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Teleport(aetheryte {} -> territory {})", self.aetheryte, self.destination)
    }
}

impl Task for Teleport {
    fn start(&mut self, world: &mut dyn WorldFacade) -> Result<bool, TaskError> {
        let snapshot = world.snapshot();
        if snapshot.territory == self.destination {
            return Ok(false);
        }
        if !snapshot.is_attuned(self.aetheryte) {
            return Err(TaskError::AetheryteLocked(self.aetheryte));
        }
        let now = world.now();
        self.timeout.arm(now);
        let accepted = world.teleport(self.aetheryte);
        self.retry.record(accepted, now).map_err(|e| e.rejected(self))?;
        if accepted {
            info!("{self}: teleport started");
        }
        Ok(accepted)
    }

    fn update(&mut self, world: &mut dyn WorldFacade) -> Result<TaskStatus, TaskError> {
        let snapshot = world.snapshot();
        if snapshot.territory == self.destination && !snapshot.busy {
            return Ok(TaskStatus::Complete);
        }
        let now = world.now();
        self.timeout.arm(now);
        self.timeout.check(now, self)?;
        if snapshot.territory != self.destination && !snapshot.busy && self.retry.due(now) {
            let accepted = world.teleport(self.aetheryte);
            self.retry.record(accepted, now).map_err(|e| e.rejected(self))?;
        }
        Ok(TaskStatus::StillRunning)
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Teleport
    }
}

/// Hop between two aethernet shards inside a city.
#[derive(Debug, Clone)]
pub struct UseAethernet {
    shortcut: AethernetShortcutDef,
    retry: Retry,
    timeout: Timeout,
}

impl UseAethernet {
    pub fn new(shortcut: AethernetShortcutDef, config: &EngineConfig) -> Self {
        Self {
            shortcut,
            retry: Retry::new(config.interaction_attempts, config.retry_delay()),
            timeout: Timeout::new(config.teleport_timeout()),
        }
    }

    fn arrived(&self, world: &dyn WorldFacade) -> bool {
        let position = world.snapshot().position;
        world
            .find_entity(self.shortcut.to)
            .is_some_and(|shard| shard.position.distance_2d(&position) <= AETHERNET_ARRIVAL_RADIUS)
    }
}

impl fmt::Display for UseAethernet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aethernet({} -> {})", self.shortcut.from, self.shortcut.to)
    }
}

impl Task for UseAethernet {
    fn start(&mut self, world: &mut dyn WorldFacade) -> Result<bool, TaskError> {
        if self.arrived(world) {
            return Ok(false);
        }
        let now = world.now();
        self.timeout.arm(now);
        let accepted = world.use_aethernet(self.shortcut.from, self.shortcut.to);
        self.retry.record(accepted, now).map_err(|e| e.rejected(self))?;
        Ok(accepted)
    }

    fn update(&mut self, world: &mut dyn WorldFacade) -> Result<TaskStatus, TaskError> {
        let busy = world.snapshot().busy;
        if !busy && self.arrived(world) {
            return Ok(TaskStatus::Complete);
        }
        let now = world.now();
        self.timeout.arm(now);
        self.timeout.check(now, self)?;
        if !busy && self.retry.due(now) {
            let accepted = world.use_aethernet(self.shortcut.from, self.shortcut.to);
            self.retry.record(accepted, now).map_err(|e| e.rejected(self))?;
        }
        Ok(TaskStatus::StillRunning)
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Aethernet
    }
}
