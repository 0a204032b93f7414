//! The consensus-relevant block.
//!
//! A block is built by its round's proposer from the committed parent: the
//! staking ledger is cloned copy-on-write, advanced to the new height (which
//! drains matured unbonds), mutated by each transaction in order, and finally
//! advanced one proposer-rotation step. Validators never trust a proposed
//! block's state: they replay it from the parent and compare ids.

use {
    log::*,
    solana_hash::Hash,
    solana_pubkey::Pubkey,
    solana_sha256_hasher::hashv,
    std::collections::BTreeMap,
};

use crate::{
    error::LedgerError,
    stake_ledger::StakeLedger,
    transaction::{Transaction, TxData},
};

/// A block in the Aurum chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Chain length at this block; genesis is height 0.
    pub height: u64,
    /// Id of the parent block.
    pub prev_hash: Hash,
    /// The validator that built this block.
    pub proposer: Pubkey,
    /// Transactions applied, in order.
    pub transactions: Vec<Transaction>,
    /// All liquid gold per address. Bonded gold is a lien inside this
    /// balance, not a separate pool.
    pub balances: BTreeMap<Pubkey, u64>,
    /// The staking state as of this block.
    pub stake_ledger: StakeLedger,
}

impl Block {
    /// The genesis block. It has no parent and no proposer.
    pub fn genesis(balances: BTreeMap<Pubkey, u64>, stake_ledger: StakeLedger) -> Self {
        Self {
            height: 0,
            prev_hash: Hash::default(),
            proposer: Pubkey::default(),
            transactions: Vec::new(),
            balances,
            stake_ledger,
        }
    }

    /// Start a child block of `parent`, built by `proposer`. The ledger is
    /// cloned and advanced to the new height before any transaction applies.
    pub fn child_of(parent: &Block, proposer: Pubkey) -> Self {
        let height = parent.height + 1;
        Self {
            height,
            prev_hash: parent.id(),
            proposer,
            transactions: Vec::new(),
            balances: parent.balances.clone(),
            stake_ledger: parent.stake_ledger.child_for(height),
        }
    }

    /// Content hash of the block. Covers every field, including the full
    /// ledger state, so replay divergence is always visible in the id.
    pub fn id(&self) -> Hash {
        let tx_ids: Vec<Hash> = self.transactions.iter().map(|tx| tx.id()).collect();
        let tx_slices: Vec<&[u8]> = tx_ids.iter().map(|id| id.as_ref()).collect();
        let txs_digest = hashv(&tx_slices);

        let mut balance_bytes = Vec::with_capacity(self.balances.len() * 40);
        for (addr, amount) in &self.balances {
            balance_bytes.extend_from_slice(addr.as_ref());
            balance_bytes.extend_from_slice(&amount.to_le_bytes());
        }
        let balances_digest = hashv(&[&balance_bytes]);

        hashv(&[
            &self.height.to_le_bytes(),
            self.prev_hash.as_ref(),
            self.proposer.as_ref(),
            txs_digest.as_ref(),
            balances_digest.as_ref(),
            self.stake_ledger.digest().as_ref(),
        ])
    }

    /// Liquid gold not under a bonding lien.
    pub fn available_gold(&self, addr: &Pubkey) -> u64 {
        self.balance_of(addr)
            .saturating_sub(self.stake_ledger.stake_of(addr))
    }

    pub fn balance_of(&self, addr: &Pubkey) -> u64 {
        self.balances.get(addr).copied().unwrap_or(0)
    }

    /// Validate and apply a transaction, recording it in the block.
    ///
    /// Each arm validates fully before mutating, so a failed application
    /// leaves the block unchanged.
    pub fn apply_transaction(&mut self, tx: Transaction) -> Result<(), LedgerError> {
        if !tx.verify_signature() {
            return Err(LedgerError::InvalidSignature(tx.from));
        }
        match &tx.data {
            TxData::Stake { amount } => {
                if *amount == 0 {
                    return Err(LedgerError::NonPositiveAmount);
                }
                let available = self.available_gold(&tx.from);
                if *amount > available {
                    return Err(LedgerError::InsufficientFunds {
                        addr: tx.from,
                        needed: *amount,
                        available,
                    });
                }
                self.stake_ledger.stake(&tx.from, *amount)?;
            }
            TxData::Unstake { amount } => {
                self.stake_ledger.unstake(&tx.from, *amount, self.height)?;
            }
            TxData::Evidence { evidence } => {
                evidence.verify()?;
                let pair = evidence.pair_id();
                if self.stake_ledger.has_applied_evidence(&pair) {
                    // The same equivocation reported again (possibly by a
                    // different validator) is a recorded no-op, never a
                    // second slash.
                    debug!("duplicate evidence against {}", evidence.culprit);
                } else {
                    let outcome = self.stake_ledger.slash(&evidence.culprit);
                    if outcome.seized > 0 {
                        let balance =
                            self.balances.entry(evidence.culprit).or_insert(0);
                        *balance = balance.saturating_sub(outcome.seized);
                        for (addr, share) in &outcome.redistributed {
                            *self.balances.entry(*addr).or_insert(0) += share;
                        }
                    }
                    self.stake_ledger.record_evidence(pair);
                }
            }
        }
        self.transactions.push(tx);
        Ok(())
    }

    /// Validate this block against its parent by rebuilding it: clone and
    /// advance the parent's ledger, replay every transaction, apply the
    /// proposer-rotation update, and compare ids.
    pub fn rerun(&self, parent: &Block) -> Result<(), LedgerError> {
        if self.height != parent.height + 1 {
            return Err(LedgerError::HeightMismatch {
                expected: parent.height + 1,
                got: self.height,
            });
        }
        if self.prev_hash != parent.id() {
            return Err(LedgerError::ParentMismatch);
        }
        let mut replay = Block::child_of(parent, self.proposer);
        for tx in &self.transactions {
            replay.apply_transaction(tx.clone())?;
        }
        replay.stake_ledger.update_accum_power(&self.proposer);
        if replay.id() != self.id() {
            return Err(LedgerError::ReplayMismatch);
        }
        Ok(())
    }
}
