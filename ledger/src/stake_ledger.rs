//! The staking ledger embedded in every block.
//!
//! Each block carries its own full copy of the staking state, cloned from
//! its parent and advanced to the new height before transactions apply.
//! The ledger tracks three maps:
//!
//! - `stake_balances` — bonded gold per validator (a lien on the liquid
//!   balance, not a separate pool),
//! - `unstaking_events` — pending releases keyed by maturity height,
//! - `accum_power` — accumulated proposer priority for the weighted
//!   round-robin rotation.
//!
//! All maps are ordered so that iteration, hashing, and tie-breaking are
//! identical on every peer.

use {
    borsh::{BorshDeserialize, BorshSerialize},
    log::*,
    solana_hash::Hash,
    solana_pubkey::Pubkey,
    solana_sha256_hasher::hash,
    std::collections::{BTreeMap, BTreeSet},
};

use crate::error::LedgerError;

/// Number of heights between scheduling an unbond and its release.
/// The funds stay bonded (voting, slashable) for the whole window.
pub const UNSTAKE_DELAY: u64 = 35;

/// A single pending release: `amount` returns to `addr`'s liquid gold when
/// the queue entry's height is reached.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct UnstakingEvent {
    pub addr: Pubkey,
    pub amount: u64,
}

/// The result of slashing a validator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlashOutcome {
    /// Bonded gold seized from the cheater.
    pub seized: u64,
    /// Exact share credited to each remaining bonded validator.
    pub redistributed: BTreeMap<Pubkey, u64>,
    /// Floor-truncation residue, permanently destroyed.
    pub burned: u64,
}

/// Per-block staking state. See the module docs for the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct StakeLedger {
    /// Bonded gold per validator. An entry is removed when it reaches zero;
    /// addresses present here are exactly the current validator set.
    stake_balances: BTreeMap<Pubkey, u64>,
    /// Pending releases keyed by the height at which they mature.
    unstaking_events: BTreeMap<u64, Vec<UnstakingEvent>>,
    /// Accumulated proposer priority. Entries track `stake_balances`.
    accum_power: BTreeMap<Pubkey, i64>,
    /// Sorted message-pair ids of evidence already applied, so the same
    /// equivocation cannot be slashed twice.
    applied_evidence: BTreeSet<(Hash, Hash)>,
}

impl StakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Genesis ledger: every listed validator starts with
    /// `stake_balances[a] = accum_power[a] = amount`.
    pub fn with_genesis_stakes(stakes: &BTreeMap<Pubkey, u64>) -> Self {
        let mut ledger = Self::new();
        for (addr, amount) in stakes {
            if *amount == 0 {
                continue;
            }
            ledger.stake_balances.insert(*addr, *amount);
            ledger.accum_power.insert(*addr, *amount as i64);
        }
        ledger
    }

    /// Copy-on-write clone for a child block: duplicates the parent's state
    /// and drains the unbonds maturing at `new_height`.
    pub fn child_for(&self, new_height: u64) -> Self {
        let mut child = self.clone();
        child.advance(new_height);
        child
    }

    /// Drain the unstaking queue entry for `new_height`, releasing each
    /// scheduled amount from the bonded balance. An address that is no
    /// longer bonded (slashed after scheduling) is silently skipped.
    pub fn advance(&mut self, new_height: u64) {
        let Some(events) = self.unstaking_events.remove(&new_height) else {
            return;
        };
        for ev in events {
            let Some(bonded) = self.stake_balances.get_mut(&ev.addr) else {
                debug!("skipping matured unstake for unbonded {}", ev.addr);
                continue;
            };
            *bonded = bonded.saturating_sub(ev.amount);
            if *bonded == 0 {
                // Fully unbonded: the validator leaves the set and forfeits
                // its accumulated priority.
                self.stake_balances.remove(&ev.addr);
                self.accum_power.remove(&ev.addr);
            }
        }
    }

    /// Bond `amount` for `addr`. The caller is responsible for checking the
    /// liquid balance covers the new lien.
    pub fn stake(&mut self, addr: &Pubkey, amount: u64) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::NonPositiveAmount);
        }
        *self.stake_balances.entry(*addr).or_insert(0) += amount;
        Ok(())
    }

    /// Schedule `amount` for release at `current_height + UNSTAKE_DELAY`.
    ///
    /// The total scheduled across all maturities may never exceed the bonded
    /// balance; a release can therefore never underflow.
    pub fn unstake(
        &mut self,
        addr: &Pubkey,
        amount: u64,
        current_height: u64,
    ) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::NonPositiveAmount);
        }
        let bonded = self.stake_of(addr);
        let scheduled = self.scheduled_unbond(addr);
        if scheduled + amount > bonded {
            return Err(LedgerError::StakeUnderflow {
                addr: *addr,
                bonded,
                scheduled,
                requested: amount,
            });
        }
        self.unstaking_events
            .entry(current_height + UNSTAKE_DELAY)
            .or_default()
            .push(UnstakingEvent {
                addr: *addr,
                amount,
            });
        Ok(())
    }

    /// Seize all of `cheater`'s bonded stake and redistribute it among the
    /// remaining bonded validators in proportion to their stake.
    ///
    /// Each share is `floor(seized * stake_i / total_remaining)`; the
    /// truncation residue is burned. The cheater is ejected from the bonded
    /// set, the rotation, and every pending unstaking entry.
    pub fn slash(&mut self, cheater: &Pubkey) -> SlashOutcome {
        let seized = self.stake_balances.remove(cheater).unwrap_or(0);
        self.accum_power.remove(cheater);
        for events in self.unstaking_events.values_mut() {
            events.retain(|ev| ev.addr != *cheater);
        }
        self.unstaking_events.retain(|_, events| !events.is_empty());

        if seized == 0 {
            return SlashOutcome::default();
        }

        let total_remaining = self.total_bonded();
        let mut outcome = SlashOutcome {
            seized,
            ..SlashOutcome::default()
        };
        if total_remaining == 0 {
            warn!("no bonded validators remain after slashing {cheater}; burning {seized}");
            outcome.burned = seized;
            return outcome;
        }

        let mut distributed = 0u64;
        let shares: Vec<(Pubkey, u64)> = self
            .stake_balances
            .iter()
            .map(|(addr, stake)| {
                let share =
                    (seized as u128 * *stake as u128 / total_remaining as u128) as u64;
                (*addr, share)
            })
            .collect();
        for (addr, share) in shares {
            if share == 0 {
                continue;
            }
            *self.stake_balances.get_mut(&addr).expect("addr is bonded") += share;
            outcome.redistributed.insert(addr, share);
            distributed += share;
        }
        outcome.burned = seized - distributed;
        info!(
            "slashed {seized} from {cheater}: redistributed {distributed}, burned {}",
            outcome.burned
        );
        outcome
    }

    /// Advance the proposer rotation: every bonded validator gains its stake
    /// in priority, then the chosen proposer pays back the whole bonded
    /// total. Net change is zero, so over time each validator is chosen in
    /// proportion to its stake.
    pub fn update_accum_power(&mut self, proposer: &Pubkey) {
        let total = self.total_bonded() as i64;
        let gains: Vec<(Pubkey, i64)> = self
            .stake_balances
            .iter()
            .map(|(addr, stake)| (*addr, *stake as i64))
            .collect();
        for (addr, stake) in gains {
            *self.accum_power.entry(addr).or_insert(0) += stake;
        }
        *self.accum_power.entry(*proposer).or_insert(0) -= total;
    }

    // -- Evidence dedup --

    /// True when the given message pair has already been slashed.
    pub fn has_applied_evidence(&self, pair: &(Hash, Hash)) -> bool {
        self.applied_evidence.contains(pair)
    }

    pub fn record_evidence(&mut self, pair: (Hash, Hash)) {
        self.applied_evidence.insert(pair);
    }

    // -- Accessors --

    /// Bonded stake of `addr`, or 0 when not a validator.
    pub fn stake_of(&self, addr: &Pubkey) -> u64 {
        self.stake_balances.get(addr).copied().unwrap_or(0)
    }

    pub fn is_bonded(&self, addr: &Pubkey) -> bool {
        self.stake_balances.contains_key(addr)
    }

    pub fn total_bonded(&self) -> u64 {
        self.stake_balances.values().sum()
    }

    /// Sum of all pending unbonds for `addr` across every maturity height.
    pub fn scheduled_unbond(&self, addr: &Pubkey) -> u64 {
        self.unstaking_events
            .values()
            .flatten()
            .filter(|ev| ev.addr == *addr)
            .map(|ev| ev.amount)
            .sum()
    }

    pub fn stake_balances(&self) -> &BTreeMap<Pubkey, u64> {
        &self.stake_balances
    }

    pub fn accum_power(&self) -> &BTreeMap<Pubkey, i64> {
        &self.accum_power
    }

    pub fn unstaking_events(&self) -> &BTreeMap<u64, Vec<UnstakingEvent>> {
        &self.unstaking_events
    }

    /// Deterministic digest of the full ledger state, folded into the
    /// containing block's id.
    pub fn digest(&self) -> Hash {
        let bytes =
            borsh::to_vec(self).expect("ledger state serialization is infallible");
        hash(&bytes)
    }
}
