//! Deadline bookkeeping shared by every task that retries or times out.
//!
//! All reads go through the facade clock (`WorldFacade::now`), so a simulated
//! world fully controls elapsed time.

use std::fmt;
use std::time::{Duration, Instant};

use super::TaskError;

/// A "don't retry before" timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline {
    not_before: Option<Instant>,
}

impl Deadline {
    pub fn ready(&self, now: Instant) -> bool {
        self.not_before.is_none_or(|t| now >= t)
    }

    pub fn defer(&mut self, now: Instant, delay: Duration) {
        self.not_before = Some(now + delay);
    }

    pub fn clear(&mut self) {
        self.not_before = None;
    }

    pub fn is_set(&self) -> bool {
        self.not_before.is_some()
    }
}

/// Upper bound on how long a task may wait for something to happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    started: Option<Instant>,
    limit: Duration,
}

impl Timeout {
    pub fn new(limit: Duration) -> Self {
        Self { started: None, limit }
    }

    /// Start the clock if it is not already running.
    pub fn arm(&mut self, now: Instant) {
        if self.started.is_none() {
            self.started = Some(now);
        }
    }

    pub fn reset(&mut self) {
        self.started = None;
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        self.started.map_or(Duration::ZERO, |s| now.saturating_duration_since(s))
    }

    pub fn expired(&self, now: Instant) -> bool {
        self.started.is_some() && self.elapsed(now) >= self.limit
    }

    /// Fail with `TimedOut` once the limit has passed.
    ///
    /// # Errors
    /// - if the timeout is armed and expired
    pub fn check(&self, now: Instant, task: &dyn fmt::Display) -> Result<(), TaskError> {
        if self.expired(now) {
            return Err(TaskError::TimedOut {
                task: task.to_string(),
                elapsed: self.elapsed(now),
            });
        }
        Ok(())
    }
}

/// Bounded retry budget with back-off between attempts.
///
/// Only rejected attempts count toward the limit; accepted ones still back off
/// so the host has time to show their effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retry {
    rejections: u32,
    limit: u32,
    delay: Duration,
    next: Deadline,
}

impl Retry {
    pub fn new(limit: u32, delay: Duration) -> Self {
        Self {
            rejections: 0,
            limit: limit.max(1),
            delay,
            next: Deadline::default(),
        }
    }

    pub fn due(&self, now: Instant) -> bool {
        self.next.ready(now)
    }

    pub fn rejections(&self) -> u32 {
        self.rejections
    }

    /// Record one attempt and schedule the earliest next one.
    ///
    /// # Errors
    /// - when the number of rejections reaches the limit
    pub fn record(&mut self, accepted: bool, now: Instant) -> Result<(), Exhausted> {
        self.next.defer(now, self.delay);
        if accepted {
            return Ok(());
        }
        self.rejections += 1;
        if self.rejections >= self.limit {
            return Err(Exhausted {
                attempts: self.rejections,
            });
        }
        Ok(())
    }
}

/// A retry budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted {
    pub attempts: u32,
}

impl Exhausted {
    pub fn rejected(self, task: &dyn fmt::Display) -> TaskError {
        TaskError::Rejected {
            task: task.to_string(),
            attempts: self.attempts,
        }
    }
}
