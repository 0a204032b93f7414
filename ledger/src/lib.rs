//! State types for the Aurum proof-of-stake chain.
//!
//! This crate holds everything that lives *on chain*: blocks, the staking
//! ledger embedded in every block, the transaction forms that mutate it, and
//! the genesis configuration that bootstraps it.
//!
//! The consensus engine (`aurum-consensus-bft`) sits on top of this crate:
//! it consults a block's [`StakeLedger`] for voting weights and proposer
//! rotation, and installs committed blocks as the new chain head.
//!
//! # Ledger model
//!
//! A validator's gold is tracked in two places. `Block::balances` holds all
//! liquid gold an address owns; `StakeLedger::stake_balances` records how
//! much of that gold is bonded. Bonding is a lien: staking does not move
//! gold, it locks it. `available gold = balances[a] - stake_balances[a]`.
//! Unbonding is delayed by [`UNSTAKE_DELAY`] heights, during which the funds
//! remain bonded, keep voting weight, and remain slashable.

pub mod block;
pub mod error;
pub mod evidence;
pub mod genesis;
pub mod stake_ledger;
pub mod transaction;

pub use block::Block;
pub use error::LedgerError;
pub use evidence::{ConflictingMsg, EquivocationEvidence, MsgKind};
pub use genesis::{GenesisConfig, GenesisError};
pub use stake_ledger::{SlashOutcome, StakeLedger, UnstakingEvent, UNSTAKE_DELAY};
pub use transaction::{Transaction, TxData};
