//! Consensus engine configuration.
//!
//! Two timing knobs drive the whole protocol: `delta_ms` is the base phase
//! step, scaled linearly by the round number so that later rounds give the
//! network more time; `commit_time_ms` is the grace window after a commit
//! decision during which laggard commit votes are gathered.

/// Configuration for the BFT consensus engine. All times in milliseconds.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Base phase-step delay. The Propose/Prevote/Precommit timers at round
    /// `r` last `r * delta_ms`.
    /// Default: 300.
    pub delta_ms: u64,

    /// Grace window after the commit decision, before the committed block is
    /// installed. While short of 2/3 commit stake, the wait is re-armed one
    /// `delta_ms` at a time.
    /// Default: 300 (1 x delta).
    pub commit_time_ms: u64,

    /// Advisory cap on rounds per height; crossing it only logs a warning,
    /// the protocol keeps going.
    /// Default: 20.
    pub max_rounds_per_height: u32,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            delta_ms: 300,
            commit_time_ms: 300,
            max_rounds_per_height: 20,
        }
    }
}

impl ConsensusConfig {
    /// Phase timer for the given round: linear backoff in the round number.
    pub fn phase_timeout_ms(&self, round: u32) -> u64 {
        self.delta_ms * round as u64
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delta_ms == 0 {
            return Err(ConfigError::InvalidDelta);
        }
        if self.commit_time_ms == 0 {
            return Err(ConfigError::InvalidCommitTime);
        }
        if self.max_rounds_per_height == 0 {
            return Err(ConfigError::InvalidMaxRounds);
        }
        Ok(())
    }
}

/// Errors in consensus configuration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("delta_ms must be > 0")]
    InvalidDelta,
    #[error("commit_time_ms must be > 0")]
    InvalidCommitTime,
    #[error("max_rounds_per_height must be > 0")]
    InvalidMaxRounds,
}
