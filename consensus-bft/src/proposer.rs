//! Proposer selection by accumulated power.
//!
//! Tendermint's weighted round-robin: every round, each bonded validator's
//! priority grows by its stake, and whoever holds the strictly greatest
//! priority proposes and pays the whole bonded total back. Over k rounds a
//! validator with fraction f of the stake proposes ~f*k times, and with
//! equal stakes the rotation is an exact round-robin.
//!
//! Every validator must agree on the proposer for any (height, round), so
//! ties on priority break by address order — `BTreeMap` iteration yields
//! ascending addresses and the first maximum wins.

use {
    solana_pubkey::Pubkey,
    std::collections::BTreeMap,
};

/// The address holding the strictly greatest accumulated power, ties broken
/// by lexicographic address order. Pure; does not advance the rotation.
pub fn strongest(accum: &BTreeMap<Pubkey, i64>) -> Option<Pubkey> {
    let mut best: Option<(Pubkey, i64)> = None;
    for (addr, power) in accum {
        match best {
            Some((_, best_power)) if *power <= best_power => {}
            _ => best = Some((*addr, *power)),
        }
    }
    best.map(|(addr, _)| addr)
}

/// Pick the proposer for a round and advance the rotation in place: every
/// staked validator gains its stake in priority, the winner pays back the
/// bonded total. The net change is zero.
pub fn select_proposer(
    accum: &mut BTreeMap<Pubkey, i64>,
    stakes: &BTreeMap<Pubkey, u64>,
) -> Option<Pubkey> {
    let winner = strongest(accum)?;
    let total: i64 = stakes.values().map(|s| *s as i64).sum();
    for (addr, stake) in stakes {
        *accum.entry(*addr).or_insert(0) += *stake as i64;
    }
    *accum.entry(winner).or_insert(0) -= total;
    Some(winner)
}
