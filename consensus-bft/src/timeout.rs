//! Timeout tracking for the consensus phases.
//!
//! The engine itself never reads a clock; the node layer arms this
//! scheduler after each engine call and feeds expirations back in as
//! `on_timeout` events. Phase timers last `round * delta`; the commit wait
//! starts at `commit_time` and re-arms by single `delta` steps while short
//! of quorum.

use {
    std::time::{Duration, Instant},
};

use crate::{config::ConsensusConfig, types::Step};

/// Tracks the single active timeout of a validator.
#[derive(Debug)]
pub struct TimeoutScheduler {
    config: ConsensusConfig,
    started_at: Option<Instant>,
    active_step: Option<Step>,
    current_round: u32,
    duration: Duration,
}

impl TimeoutScheduler {
    pub fn new(config: ConsensusConfig) -> Self {
        Self {
            config,
            started_at: None,
            active_step: None,
            current_round: 0,
            duration: Duration::ZERO,
        }
    }

    /// Arm the timeout for the given step and round.
    pub fn start(&mut self, step: Step, round: u32) {
        self.duration = self.timeout_duration(step, round);
        self.started_at = Some(Instant::now());
        self.active_step = Some(step);
        self.current_round = round;
    }

    /// Re-arm the commit wait by a single delta while gathering laggard
    /// commit votes.
    pub fn start_commit_retry(&mut self) {
        self.duration = Duration::from_millis(self.config.delta_ms);
        self.started_at = Some(Instant::now());
        self.active_step = Some(Step::Commit);
    }

    pub fn cancel(&mut self) {
        self.started_at = None;
        self.active_step = None;
    }

    /// Nominal duration for a step at a round.
    pub fn timeout_duration(&self, step: Step, round: u32) -> Duration {
        let ms = match step {
            Step::Propose | Step::Prevote | Step::Precommit => {
                self.config.phase_timeout_ms(round)
            }
            Step::Commit => self.config.commit_time_ms,
            Step::Finalize => 0,
        };
        Duration::from_millis(ms)
    }

    /// Returns the expired step, if the active timeout has run out.
    pub fn check_expired(&self) -> Option<Step> {
        let started_at = self.started_at?;
        let step = self.active_step?;
        (started_at.elapsed() >= self.duration).then_some(step)
    }

    /// Time remaining before the active timeout expires.
    pub fn remaining(&self) -> Option<Duration> {
        let started_at = self.started_at?;
        self.active_step?;
        Some(self.duration.saturating_sub(started_at.elapsed()))
    }

    pub fn active_step(&self) -> Option<Step> {
        self.active_step
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }
}
