//! Stake-weighted vote tallying.
//!
//! A candidate (a block id, or nil) wins only with strictly more than
//! `floor(2 * total_stake / 3)` of the bonded stake behind it. At most one
//! candidate can cross that line, so iteration order never matters.

use {
    solana_hash::Hash,
    solana_pubkey::Pubkey,
    std::collections::{BTreeMap, HashMap},
};

use crate::vote_box::VoteBox;

/// Result of a tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TallyOutcome {
    /// A block gathered >2/3 of the bonded stake.
    Block(Hash),
    /// Nil gathered >2/3 of the bonded stake.
    Nil,
    /// No candidate crossed the threshold.
    NoQuorum,
}

/// Count the votes in `primary`, weighted by `weights` (the bonded stake
/// map of the block the votes decide on).
///
/// `primary_round`, when set, restricts primary votes to that round —
/// commit votes passed via `carry` are exempt, implementing the rule that
/// prior commits count as prevotes and precommits in every later round of
/// the height. A validator with votes in both contributes once: the commit
/// wins.
pub fn count_votes(
    primary: &VoteBox,
    carry: Option<&VoteBox>,
    weights: &BTreeMap<Pubkey, u64>,
    primary_round: Option<u32>,
) -> TallyOutcome {
    let total: u128 = weights.values().map(|w| *w as u128).sum();
    if total == 0 {
        return TallyOutcome::NoQuorum;
    }
    let threshold = total * 2 / 3;

    let mut totals: HashMap<Option<Hash>, u128> = HashMap::new();
    for (addr, weight) in weights {
        let carried = carry.and_then(|c| c.get(addr));
        let vote = carried.or_else(|| {
            primary
                .get(addr)
                .filter(|v| primary_round.map_or(true, |r| v.round == r))
        });
        if let Some(vote) = vote {
            *totals.entry(vote.block_id).or_insert(0) += *weight as u128;
        }
    }

    for (block_id, stake) in &totals {
        if *stake > threshold {
            return match block_id {
                Some(id) => TallyOutcome::Block(*id),
                None => TallyOutcome::Nil,
            };
        }
    }
    TallyOutcome::NoQuorum
}
