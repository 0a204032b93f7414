//! Node-level errors, surfaced synchronously to clients.

/// Errors raised at the node layer, before anything reaches consensus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    #[error("amount must be positive")]
    NonPositiveAmount,

    #[error("insufficient available gold: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error(
        "insufficient bonded stake: bonded {bonded}, already unbonding {scheduled}, \
         requested {requested}"
    )]
    InsufficientStake {
        bonded: u64,
        scheduled: u64,
        requested: u64,
    },

    #[error("transaction pool is full (capacity {0})")]
    PoolFull(usize),

    #[error("transaction already seen")]
    DuplicateTransaction,

    #[error("transaction signature does not verify")]
    InvalidSignature,
}
