//! Signed block proposals.
//!
//! The signing preimage covers (from, height, round, block id); the block
//! itself is committed to through `block_id = block.id()`, which `is_valid`
//! enforces. A locked block re-proposed in a later round carries the
//! prevotes of the locking round as its proof of lock.

use {
    aurum_ledger::{
        evidence::{message_id, message_sign_bytes, MsgKind},
        Block,
    },
    solana_hash::Hash,
    solana_keypair::Keypair,
    solana_pubkey::Pubkey,
    solana_signature::Signature,
    solana_signer::Signer,
};

use crate::{error::ConsensusError, vote::Vote};

/// A signed proposal for (height, round).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub from: Pubkey,
    pub block_id: Hash,
    pub block: Block,
    pub height: u64,
    pub round: u32,
    /// Prevotes from the locking round, present when a locked block is
    /// re-proposed. Empty for fresh proposals.
    pub proof_of_lock: Vec<Vote>,
    pub signature: Signature,
}

impl Proposal {
    /// Build and sign a proposal for `block` at the given round.
    pub fn new(keypair: &Keypair, block: Block, round: u32, proof_of_lock: Vec<Vote>) -> Self {
        let from = keypair.pubkey();
        let block_id = block.id();
        let height = block.height;
        let preimage =
            message_sign_bytes(MsgKind::Proposal, height, round, Some(&block_id), &from);
        Self {
            from,
            block_id,
            block,
            height,
            round,
            proof_of_lock,
            signature: keypair.sign_message(&preimage),
        }
    }

    pub fn sign_bytes(&self) -> Vec<u8> {
        message_sign_bytes(
            MsgKind::Proposal,
            self.height,
            self.round,
            Some(&self.block_id),
            &self.from,
        )
    }

    /// Proposal identity: sha256 over the signing preimage.
    pub fn id(&self) -> Hash {
        message_id(
            MsgKind::Proposal,
            self.height,
            self.round,
            Some(&self.block_id),
            &self.from,
        )
    }

    pub fn verify_signature(&self) -> bool {
        self.signature.verify(self.from.as_ref(), &self.sign_bytes())
    }

    /// Structural validity: correct signature, the block id matches the
    /// block's content hash, and the heights agree. Replay validation
    /// against the parent happens separately in the engine.
    pub fn is_valid(&self) -> Result<(), ConsensusError> {
        if !self.verify_signature() {
            return Err(ConsensusError::InvalidSignature(self.from));
        }
        if self.block_id != self.block.id() {
            return Err(ConsensusError::BlockIdMismatch);
        }
        if self.height != self.block.height {
            return Err(ConsensusError::ProposalHeightMismatch {
                proposal: self.height,
                block: self.block.height,
            });
        }
        Ok(())
    }
}
