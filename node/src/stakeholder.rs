//! The client-facing staking capability.
//!
//! Anything that holds gold and a key — a plain client or a validator — can
//! bond and unbond through the same [`Stakeholder`] interface. [`Wallet`]
//! is the single implementation; roles compose it rather than inheriting a
//! grab-bag of methods.

use {
    aurum_ledger::{Block, Transaction, TxData},
    solana_keypair::Keypair,
    solana_pubkey::Pubkey,
    solana_signer::Signer,
    std::sync::Arc,
};

use crate::{
    error::NodeError,
    network::{Network, WireMessage, POST_TRANSACTION},
};

/// Staking operations available to any gold holder.
pub trait Stakeholder {
    fn address(&self) -> Pubkey;

    /// Liquid gold not under a bonding lien.
    fn available_gold(&self) -> u64;

    /// Gold currently bonded (including amounts pending unbond).
    fn amount_gold_staked(&self) -> u64;

    /// Bond `amount`. Fails synchronously when the available balance does
    /// not cover it.
    fn post_staking_transaction(&mut self, amount: u64) -> Result<Transaction, NodeError>;

    /// Schedule `amount` for unbonding. Fails synchronously when the bonded
    /// balance (net of already-scheduled unbonds) does not cover it.
    fn post_unstaking_transaction(&mut self, amount: u64) -> Result<Transaction, NodeError>;
}

/// A keypair plus a view of the chain head, posting transactions over the
/// network.
pub struct Wallet {
    keypair: Arc<Keypair>,
    address: Pubkey,
    /// Latest committed block this wallet knows about; balances and stake
    /// are read from here.
    head: Block,
    nonce: u64,
    network: Arc<dyn Network>,
}

impl Wallet {
    pub fn new(keypair: Arc<Keypair>, head: Block, network: Arc<dyn Network>) -> Self {
        let address = keypair.pubkey();
        Self {
            keypair,
            address,
            head,
            nonce: 0,
            network,
        }
    }

    /// Update the wallet's view of the chain after a commit.
    pub fn set_head(&mut self, head: Block) {
        self.head = head;
    }

    pub fn head(&self) -> &Block {
        &self.head
    }

    fn post(&mut self, data: TxData) -> Transaction {
        let tx = Transaction::new(&self.keypair, self.nonce, data);
        self.nonce += 1;
        self.network
            .broadcast(POST_TRANSACTION, WireMessage::Transaction(tx.clone()));
        tx
    }
}

impl Stakeholder for Wallet {
    fn address(&self) -> Pubkey {
        self.address
    }

    fn available_gold(&self) -> u64 {
        self.head.available_gold(&self.address)
    }

    fn amount_gold_staked(&self) -> u64 {
        self.head.stake_ledger.stake_of(&self.address)
    }

    fn post_staking_transaction(&mut self, amount: u64) -> Result<Transaction, NodeError> {
        if amount == 0 {
            return Err(NodeError::NonPositiveAmount);
        }
        let available = self.available_gold();
        if amount > available {
            return Err(NodeError::InsufficientFunds {
                needed: amount,
                available,
            });
        }
        Ok(self.post(TxData::Stake { amount }))
    }

    fn post_unstaking_transaction(&mut self, amount: u64) -> Result<Transaction, NodeError> {
        if amount == 0 {
            return Err(NodeError::NonPositiveAmount);
        }
        let bonded = self.amount_gold_staked();
        let scheduled = self.head.stake_ledger.scheduled_unbond(&self.address);
        if scheduled + amount > bonded {
            return Err(NodeError::InsufficientStake {
                bonded,
                scheduled,
                requested: amount,
            });
        }
        Ok(self.post(TxData::Unstake { amount }))
    }
}
