//! Tasks that mostly wait: fixed delays, progress made by someone else, and duties.

use std::fmt;
use std::time::Duration;

use log::{debug, info};
use questline_data::{ContentId, QuestId};

use super::{Completion, Deadline, Retry, Task, TaskError, TaskKind, TaskStatus, Timeout};
use crate::config::EngineConfig;
use crate::world::{Aid, QuestWork, WorldFacade};

/// Do nothing for a fixed time.
#[derive(Debug, Clone)]
pub struct WaitDelay {
    delay: Duration,
    until: Deadline,
}

impl WaitDelay {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            until: Deadline::default(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl fmt::Display for WaitDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wait({}ms)", self.delay.as_millis())
    }
}

impl Task for WaitDelay {
    fn start(&mut self, world: &mut dyn WorldFacade) -> Result<bool, TaskError> {
        self.until.defer(world.now(), self.delay);
        Ok(false)
    }

    fn update(&mut self, world: &mut dyn WorldFacade) -> Result<TaskStatus, TaskError> {
        let now = world.now();
        if !self.until.is_set() {
            self.until.defer(now, self.delay);
        }
        if self.until.ready(now) {
            return Ok(TaskStatus::Complete);
        }
        Ok(TaskStatus::StillRunning)
    }

    fn kind(&self) -> TaskKind {
        TaskKind::WaitDelay
    }
}

/// Wait for quest progress that the engine does not cause itself.
///
/// Done once `goal` is reached, the owning quest completes, or the owning
/// quest's work bytes change from what they were when the wait began.
#[derive(Debug, Clone)]
pub struct WaitForProgress {
    quest: QuestId,
    goal: Completion,
    baseline: Option<Option<QuestWork>>,
}

impl WaitForProgress {
    pub fn new(quest: QuestId, goal: Completion) -> Self {
        Self {
            quest,
            goal,
            baseline: None,
        }
    }

    pub fn goal(&self) -> &Completion {
        &self.goal
    }
}

impl fmt::Display for WaitForProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.goal {
            Completion::QuestAccepted(q) => write!(f, "WaitForProgress(accept {q})"),
            Completion::QuestCompleted(q) => write!(f, "WaitForProgress(complete {q})"),
            _ => write!(f, "WaitForProgress({})", self.quest),
        }
    }
}

impl Task for WaitForProgress {
    fn start(&mut self, world: &mut dyn WorldFacade) -> Result<bool, TaskError> {
        self.baseline = Some(world.snapshot().work(self.quest).copied());
        info!("{self}: waiting for manual progress");
        Ok(false)
    }

    fn update(&mut self, world: &mut dyn WorldFacade) -> Result<TaskStatus, TaskError> {
        let snapshot = world.snapshot();
        let current = snapshot.work(self.quest).copied();
        let Some(baseline) = self.baseline else {
            self.baseline = Some(current);
            return Ok(TaskStatus::StillRunning);
        };
        if self.goal.reached(&snapshot, false) || snapshot.is_completed(self.quest) || current != baseline {
            return Ok(TaskStatus::Complete);
        }
        Ok(TaskStatus::StillRunning)
    }

    fn kind(&self) -> TaskKind {
        TaskKind::WaitForProgress
    }
}

/// Queue into a duty and, when an automation aid runs it, wait for it to clear.
#[derive(Debug, Clone)]
pub struct EnterDuty {
    content: ContentId,
    retry: Retry,
    timeout: Timeout,
    entered: bool,
}

impl EnterDuty {
    pub fn new(content: ContentId, config: &EngineConfig) -> Self {
        Self {
            content,
            retry: Retry::new(config.interaction_attempts, config.retry_delay()),
            timeout: Timeout::new(config.duty_timeout()),
            entered: false,
        }
    }

    fn automated(world: &dyn WorldFacade) -> bool {
        world.aid_available(Aid::DutyAutomation) && world.aid_active(Aid::DutyAutomation)
    }
}

impl fmt::Display for EnterDuty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Duty({})", self.content)
    }
}

impl Task for EnterDuty {
    fn start(&mut self, world: &mut dyn WorldFacade) -> Result<bool, TaskError> {
        if world.snapshot().duty == Some(self.content) {
            self.entered = true;
            return Ok(false);
        }
        let now = world.now();
        self.timeout.arm(now);
        let accepted = world.enter_duty(self.content);
        self.retry.record(accepted, now).map_err(|e| e.rejected(self))?;
        Ok(accepted)
    }

    fn update(&mut self, world: &mut dyn WorldFacade) -> Result<TaskStatus, TaskError> {
        let snapshot = world.snapshot();
        let inside = snapshot.duty == Some(self.content);

        if inside {
            if !self.entered {
                info!("{self}: entered");
                self.entered = true;
            }
            if Self::automated(world) {
                return Ok(TaskStatus::StillRunning);
            }
            return Ok(TaskStatus::Complete);
        }
        if self.entered {
            debug!("{self}: left the duty");
            return Ok(TaskStatus::Complete);
        }

        let now = world.now();
        self.timeout.arm(now);
        self.timeout.check(now, self)?;
        if !snapshot.busy && snapshot.duty.is_none() && self.retry.due(now) {
            let accepted = world.enter_duty(self.content);
            self.retry.record(accepted, now).map_err(|e| e.rejected(self))?;
        }
        Ok(TaskStatus::StillRunning)
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Duty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimWorld;
    use questline_data::QuestWorkValue;

    #[test]
    fn delay_elapses_on_facade_clock() {
        let mut world = SimWorld::new();
        let mut task = WaitDelay::new(Duration::from_millis(300));
        assert!(!task.start(&mut world).expect("start"));
        assert_eq!(task.update(&mut world), Ok(TaskStatus::StillRunning));
        world.advance(Duration::from_millis(300));
        assert_eq!(task.update(&mut world), Ok(TaskStatus::Complete));
    }

    #[test]
    fn progress_detected_by_work_change() {
        let quest = QuestId(6);
        let mut world = SimWorld::new();
        world.state.quest_work.insert(quest, [1, 0, 0, 0, 0, 0]);
        let mut task = WaitForProgress::new(quest, Completion::Acknowledged);
        task.start(&mut world).expect("start");
        assert_eq!(task.update(&mut world), Ok(TaskStatus::StillRunning));
        world.state.quest_work.insert(quest, [2, 0, 0, 0, 0, 0]);
        assert_eq!(task.update(&mut world), Ok(TaskStatus::Complete));
    }

    #[test]
    fn progress_detected_by_flags() {
        let quest = QuestId(6);
        let mut world = SimWorld::new();
        world.state.quest_work.insert(quest, [0x21, 0, 0, 0, 0, 0]);
        let goal = Completion::Flags {
            quest,
            pattern: vec![Some(QuestWorkValue::new(Some(2), None))],
        };
        let mut task = WaitForProgress::new(quest, goal);
        task.start(&mut world).expect("start");
        assert_eq!(task.update(&mut world), Ok(TaskStatus::Complete));
    }

    #[test]
    fn manual_duty_completes_once_inside() {
        let mut world = SimWorld::new();
        let mut task = EnterDuty::new(30, &EngineConfig::default());
        assert!(task.start(&mut world).expect("start"));
        assert_eq!(task.update(&mut world), Ok(TaskStatus::Complete));
    }

    #[test]
    fn automated_duty_waits_until_cleared() {
        let mut world = SimWorld::new();
        world.aids.push(Aid::DutyAutomation);
        world.duty_ticks = 2;
        let mut task = EnterDuty::new(30, &EngineConfig::default());
        assert!(task.start(&mut world).expect("start"));
        assert_eq!(task.update(&mut world), Ok(TaskStatus::StillRunning));
        world.tick();
        assert_eq!(task.update(&mut world), Ok(TaskStatus::StillRunning));
        world.tick();
        assert_eq!(task.update(&mut world), Ok(TaskStatus::Complete));
    }

    #[test]
    fn duty_queue_times_out() {
        let config = EngineConfig::default();
        let mut world = SimWorld::new();
        world.reject_next = 1;
        let mut task = EnterDuty::new(30, &config);
        assert!(!task.start(&mut world).expect("start"));
        world.state.busy = true;
        world.advance(config.duty_timeout());
        assert!(matches!(task.update(&mut world), Err(TaskError::TimedOut { .. })));
    }
}
