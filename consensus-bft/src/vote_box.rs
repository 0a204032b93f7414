//! Per-phase vote collection and equivocation detection.
//!
//! A box holds at most one current vote per validator for its phase. A
//! fresher vote (later height or round) replaces an older one, a staler
//! vote is dropped, an exact duplicate is dropped, and two different votes
//! at the same (height, round) are equivocation — the box hands back
//! self-contained evidence built from the two signatures.

use {
    aurum_ledger::evidence::{ConflictingMsg, EquivocationEvidence},
    log::*,
    solana_pubkey::Pubkey,
    std::collections::HashMap,
};

use crate::vote::{Vote, VotePhase};

/// Outcome of recording a vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    /// First vote from this validator.
    Stored,
    /// Replaced an older vote from the same validator.
    Replaced,
    /// The incoming vote was older than the stored one.
    StaleDropped,
    /// Exact re-delivery of the stored vote.
    Duplicate,
    /// Conflicting vote at the same (height, round): evidence.
    Equivocation(EquivocationEvidence),
}

/// Collects votes for a single phase.
#[derive(Debug)]
pub struct VoteBox {
    phase: VotePhase,
    votes: HashMap<Pubkey, Vote>,
}

impl VoteBox {
    pub fn new(phase: VotePhase) -> Self {
        Self {
            phase,
            votes: HashMap::new(),
        }
    }

    /// Record a vote per the freshness and equivocation rules.
    ///
    /// The caller is responsible for signature and staleness checks against
    /// the engine position; the box only compares against what it holds.
    pub fn record(&mut self, vote: Vote) -> Recorded {
        debug_assert_eq!(vote.phase, self.phase);
        let Some(existing) = self.votes.get(&vote.from) else {
            self.votes.insert(vote.from, vote);
            return Recorded::Stored;
        };

        if vote.fresher_than(existing) {
            self.votes.insert(vote.from, vote);
            return Recorded::Replaced;
        }
        if existing.fresher_than(&vote) {
            return Recorded::StaleDropped;
        }

        // Same (height, round). Same id means re-delivery; a different id
        // means the validator signed two conflicting votes.
        if existing.id() == vote.id() {
            return Recorded::Duplicate;
        }
        warn!(
            "equivocation: {} cast two {}s at h={} r={}",
            vote.from, self.phase, vote.height, vote.round
        );
        let evidence = EquivocationEvidence {
            culprit: vote.from,
            height: vote.height,
            round: vote.round,
            kind: vote.phase.kind(),
            first: ConflictingMsg {
                block_id: existing.block_id,
                signature: existing.signature,
            },
            second: ConflictingMsg {
                block_id: vote.block_id,
                signature: vote.signature,
            },
        };
        Recorded::Equivocation(evidence)
    }

    pub fn get(&self, addr: &Pubkey) -> Option<&Vote> {
        self.votes.get(addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vote> {
        self.votes.values()
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn phase(&self) -> VotePhase {
        self.phase
    }

    pub fn clear(&mut self) {
        self.votes.clear();
    }
}
