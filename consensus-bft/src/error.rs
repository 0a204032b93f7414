//! Error types for consensus message validation.

use solana_pubkey::Pubkey;

/// Why an inbound consensus message was rejected.
///
/// None of these are fatal: the engine drops the offending message, logs,
/// and carries on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsensusError {
    #[error("message is below the current (height, round)")]
    StaleMessage,

    #[error("invalid signature from {0}")]
    InvalidSignature(Pubkey),

    #[error("proposal block id does not match the block's content hash")]
    BlockIdMismatch,

    #[error("proposal height {proposal} does not match block height {block}")]
    ProposalHeightMismatch { proposal: u64, block: u64 },

    #[error("proposal from {got}, expected round proposer {expected}")]
    WrongProposer { expected: Pubkey, got: Pubkey },

    #[error("proposal references an unknown parent")]
    UnknownParent,

    #[error("proof of lock does not justify the re-proposal: {0}")]
    BadProofOfLock(&'static str),
}
