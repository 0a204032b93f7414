//! Error types for ledger state transitions.

use solana_pubkey::Pubkey;

/// Errors raised while mutating or validating on-chain state.
///
/// A transaction that fails with any of these makes the containing block
/// invalid; proposers filter failing transactions out at build time, so a
/// well-formed proposal never trips them during replay.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("amount must be positive")]
    NonPositiveAmount,

    #[error("insufficient liquid gold for {addr}: need {needed}, available {available}")]
    InsufficientFunds {
        addr: Pubkey,
        needed: u64,
        available: u64,
    },

    #[error(
        "unstake would underflow bonded stake for {addr}: \
         bonded {bonded}, already unbonding {scheduled}, requested {requested}"
    )]
    StakeUnderflow {
        addr: Pubkey,
        bonded: u64,
        scheduled: u64,
        requested: u64,
    },

    #[error("invalid transaction signature from {0}")]
    InvalidSignature(Pubkey),

    #[error("invalid equivocation evidence: {0}")]
    InvalidEvidence(&'static str),

    #[error("block height mismatch: expected {expected}, got {got}")]
    HeightMismatch { expected: u64, got: u64 },

    #[error("block does not extend the given parent")]
    ParentMismatch,

    #[error("block id does not match replayed state")]
    ReplayMismatch,
}
