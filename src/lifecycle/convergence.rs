//! Convergence Loops
//!
//! A bounded polling state machine: repeat an attempt until it reports a
//! terminal outcome or the loop's deadline passes. The decision logic lives in
//! [`ConvergenceLoop::tick`], which takes the current instant as an argument
//! and never sleeps, so it can be driven with synthetic time. [`ConvergenceLoop::run`]
//! is the async driver that sleeps between attempts.

use crate::config::ConvergenceSettings;
use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, warn};

/// State of a convergence loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    Completed,
    Error,
}

/// What a single attempt observed
#[derive(Debug)]
pub enum Observation {
    /// Target state not reached yet, try again
    Pending,
    /// Target state reached
    Completed,
    /// Unrecoverable failure
    Failed(Error),
    /// The attempt produced no answer at all
    Unobserved,
}

/// What the loop should do next
#[derive(Debug)]
pub enum Step {
    Done,
    Failed(Error),
    WaitUntil(Instant),
}

/// Bounded polling state machine
#[derive(Debug)]
pub struct ConvergenceLoop {
    operation: String,
    phase: Phase,
    started: Instant,
    deadline: Instant,
    timeout: Duration,
    min_interval: Duration,
    delay: Duration,
    not_found_checks: u32,
    attempts: u32,
    unobserved: u32,
}

impl ConvergenceLoop {
    /// Create a loop that starts at `now`
    pub fn new(operation: impl Into<String>, settings: &ConvergenceSettings, now: Instant) -> Self {
        let timeout = settings.timeout();
        Self {
            operation: operation.into(),
            phase: Phase::Pending,
            started: now,
            deadline: now + timeout,
            timeout,
            min_interval: settings.min_interval(),
            delay: settings.delay(),
            not_found_checks: settings.not_found_checks,
            attempts: 0,
            unobserved: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// When the first attempt is due
    pub fn first_attempt_at(&self) -> Instant {
        (self.started + self.delay).min(self.deadline)
    }

    /// Advance the state machine with the outcome of one attempt
    pub fn tick(&mut self, observation: Observation, now: Instant) -> Step {
        if self.phase != Phase::Pending {
            return Step::Failed(Error::Internal(format!(
                "{} ticked after reaching {:?}",
                self.operation, self.phase
            )));
        }

        self.attempts += 1;
        match observation {
            Observation::Completed => {
                self.phase = Phase::Completed;
                Step::Done
            }
            Observation::Failed(e) => {
                self.phase = Phase::Error;
                Step::Failed(e)
            }
            Observation::Unobserved => {
                self.unobserved += 1;
                if self.unobserved > self.not_found_checks {
                    self.phase = Phase::Error;
                    return Step::Failed(Error::ConvergenceUnobserved {
                        operation: self.operation.clone(),
                        checks: self.unobserved,
                    });
                }
                self.schedule(now)
            }
            Observation::Pending => {
                self.unobserved = 0;
                self.schedule(now)
            }
        }
    }

    fn schedule(&mut self, now: Instant) -> Step {
        if now >= self.deadline {
            return Step::Failed(self.time_out());
        }
        Step::WaitUntil((now + self.min_interval).min(self.deadline))
    }

    /// Move to the error phase because the deadline passed
    pub fn time_out(&mut self) -> Error {
        self.phase = Phase::Error;
        Error::ConvergenceTimeout {
            operation: self.operation.clone(),
            timeout: self.timeout,
            attempts: self.attempts,
        }
    }

    /// Drive the loop until it completes, fails or times out.
    ///
    /// Each attempt is cut off at the loop deadline, so the loop never runs
    /// past its timeout. Returns the number of attempts made.
    pub async fn run<F, Fut>(mut self, mut attempt: F) -> Result<u32>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Observation>,
    {
        sleep_until(self.first_attempt_at()).await;

        loop {
            if Instant::now() >= self.deadline {
                warn!(
                    operation = %self.operation,
                    attempts = self.attempts,
                    "Convergence loop timed out"
                );
                return Err(self.time_out());
            }

            let observation = match timeout_at(self.deadline, attempt()).await {
                Ok(observation) => observation,
                Err(_) => return Err(self.time_out()),
            };

            match self.tick(observation, Instant::now()) {
                Step::Done => {
                    debug!(
                        operation = %self.operation,
                        attempts = self.attempts,
                        "Convergence loop completed"
                    );
                    return Ok(self.attempts);
                }
                Step::Failed(e) => return Err(e),
                Step::WaitUntil(at) => sleep_until(at).await,
            }
        }
    }
}
