//! Aurum Tendermint-style BFT consensus engine.
//!
//! Implements a proof-of-stake three-phase commit protocol over the state
//! types in `aurum-ledger`:
//!
//! 1. **Propose** — the round's proposer, chosen by accumulated-power
//!    weighted round-robin, broadcasts a block built from its parent.
//! 2. **Prevote** — validators broadcast prevotes for the proposal (or nil).
//! 3. **Precommit** — on >2/3 prevote stake for a block, validators lock on
//!    it and broadcast precommits.
//! 4. **Commit** — on >2/3 precommit stake, validators broadcast commit
//!    votes, gather laggards for a grace window, and install the block.
//!
//! # Key properties
//!
//! - **Safety**: the lock / proof-of-lock discipline prevents two blocks
//!   from both gathering >2/3 precommits at one height with <1/3 Byzantine
//!   stake.
//! - **Liveness**: phase timers grow linearly with the round number, so
//!   under eventual synchrony some round completes.
//! - **Accountability**: conflicting signed messages become on-chain
//!   evidence transactions that slash the equivocator's full bond.
//!
//! The engine is a deterministic state machine: messages and timer events go
//! in, messages/evidence/commits come out. All I/O, clocks, and threading
//! live in the node layer (`aurum-node`); tests drive the engine directly.

pub mod config;
pub mod engine;
pub mod error;
pub mod proposal;
pub mod proposer;
pub mod tally;
pub mod timeout;
pub mod types;
pub mod vote;
pub mod vote_box;

// Re-exports for convenience
pub use config::ConsensusConfig;
pub use engine::ConsensusEngine;
pub use error::ConsensusError;
pub use proposal::Proposal;
pub use proposer::{select_proposer, strongest};
pub use tally::{count_votes, TallyOutcome};
pub use timeout::TimeoutScheduler;
pub use types::{CommittedBlock, ConsensusMessage, EngineOutput, Step};
pub use vote::{Vote, VotePhase};
pub use vote_box::{Recorded, VoteBox};
