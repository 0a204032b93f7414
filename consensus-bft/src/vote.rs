//! Signed ballots.
//!
//! A vote binds a validator to one block id (or nil) at a specific
//! (height, round, phase). Its identity is the sha256 of its signing
//! preimage, and two valid votes from one validator at the same position
//! with different ids are equivocation.

use {
    aurum_ledger::evidence::{message_id, message_sign_bytes, MsgKind},
    solana_hash::Hash,
    solana_keypair::Keypair,
    solana_pubkey::Pubkey,
    solana_signature::Signature,
    solana_signer::Signer,
};

/// The voting phase a ballot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VotePhase {
    Prevote,
    Precommit,
    Commit,
}

impl VotePhase {
    pub fn kind(&self) -> MsgKind {
        match self {
            VotePhase::Prevote => MsgKind::Prevote,
            VotePhase::Precommit => MsgKind::Precommit,
            VotePhase::Commit => MsgKind::Commit,
        }
    }
}

impl std::fmt::Display for VotePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VotePhase::Prevote => write!(f, "Prevote"),
            VotePhase::Precommit => write!(f, "Precommit"),
            VotePhase::Commit => write!(f, "Commit"),
        }
    }
}

/// A signed vote for a specific (height, round, phase, block id).
/// `block_id == None` is a nil vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub from: Pubkey,
    pub height: u64,
    pub round: u32,
    pub phase: VotePhase,
    pub block_id: Option<Hash>,
    pub signature: Signature,
}

impl Vote {
    /// Build and sign a vote with the given keypair.
    pub fn new(
        keypair: &Keypair,
        height: u64,
        round: u32,
        phase: VotePhase,
        block_id: Option<Hash>,
    ) -> Self {
        let from = keypair.pubkey();
        let preimage =
            message_sign_bytes(phase.kind(), height, round, block_id.as_ref(), &from);
        Self {
            from,
            height,
            round,
            phase,
            block_id,
            signature: keypair.sign_message(&preimage),
        }
    }

    /// Canonical signing preimage (everything but the signature).
    pub fn sign_bytes(&self) -> Vec<u8> {
        message_sign_bytes(
            self.phase.kind(),
            self.height,
            self.round,
            self.block_id.as_ref(),
            &self.from,
        )
    }

    /// Vote identity: sha256 over the signing preimage.
    pub fn id(&self) -> Hash {
        message_id(
            self.phase.kind(),
            self.height,
            self.round,
            self.block_id.as_ref(),
            &self.from,
        )
    }

    pub fn verify_signature(&self) -> bool {
        self.signature.verify(self.from.as_ref(), &self.sign_bytes())
    }

    /// Lexicographic comparison on (height, round).
    pub fn fresher_than(&self, other: &Vote) -> bool {
        (self.height, self.round) > (other.height, other.round)
    }

    /// A vote is stale relative to the engine's position when its height is
    /// behind, or its round is behind and it is not a commit — commit votes
    /// stay valid across later rounds of the same height.
    pub fn is_stale(&self, height: u64, round: u32) -> bool {
        if self.height < height {
            return true;
        }
        self.height == height && self.round < round && self.phase != VotePhase::Commit
    }
}
