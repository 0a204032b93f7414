//! Property-based and end-to-end scenario tests for the Aurum consensus
//! core.
//!
//! The harness drives real [`aurum_consensus_bft::ConsensusEngine`]s in
//! lockstep with explicit timer events and hand-controlled message
//! delivery, so every scenario is deterministic and wall-clock free.

pub mod harness;

#[cfg(test)]
mod consensus_invariants;
#[cfg(test)]
mod staking_invariants;
