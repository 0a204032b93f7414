//! Genesis configuration.
//!
//! The initial validator set is declared either directly by address
//! (`starting_stake`) or by client handle (`starting_stake_map`, resolved
//! against a roster of named keys). Exactly one of the two must be present.

use {
    solana_pubkey::Pubkey,
    std::collections::BTreeMap,
};

use crate::{block::Block, stake_ledger::StakeLedger};

/// Errors in genesis configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenesisError {
    #[error("both starting_stake and starting_stake_map are set; exactly one is required")]
    AmbiguousStake,

    #[error("neither starting_stake nor starting_stake_map is set")]
    MissingStake,

    #[error("starting_stake_map names unknown client handle {0:?}")]
    UnknownHandle(String),

    #[error("starting stake for {0} must be positive")]
    ZeroStake(Pubkey),
}

/// Declarative genesis state.
#[derive(Debug, Clone, Default)]
pub struct GenesisConfig {
    /// Initial bonded stake keyed by validator address.
    pub starting_stake: Option<BTreeMap<Pubkey, u64>>,
    /// Initial bonded stake keyed by client handle; requires a roster to
    /// resolve handles to addresses.
    pub starting_stake_map: Option<BTreeMap<String, u64>>,
    /// Extra liquid gold per address, on top of the bonded amounts.
    pub starting_balances: BTreeMap<Pubkey, u64>,
}

impl GenesisConfig {
    /// Resolve the configured stakes to an address-keyed map, enforcing the
    /// exactly-one-source rule.
    pub fn resolve_stakes(
        &self,
        roster: &BTreeMap<String, Pubkey>,
    ) -> Result<BTreeMap<Pubkey, u64>, GenesisError> {
        let stakes = match (&self.starting_stake, &self.starting_stake_map) {
            (Some(_), Some(_)) => return Err(GenesisError::AmbiguousStake),
            (None, None) => return Err(GenesisError::MissingStake),
            (Some(by_addr), None) => by_addr.clone(),
            (None, Some(by_handle)) => {
                let mut by_addr = BTreeMap::new();
                for (handle, amount) in by_handle {
                    let addr = roster
                        .get(handle)
                        .ok_or_else(|| GenesisError::UnknownHandle(handle.clone()))?;
                    by_addr.insert(*addr, *amount);
                }
                by_addr
            }
        };
        for (addr, amount) in &stakes {
            if *amount == 0 {
                return Err(GenesisError::ZeroStake(*addr));
            }
        }
        Ok(stakes)
    }

    /// Build the genesis block. Every validator's liquid balance covers its
    /// bond plus any extra from `starting_balances`.
    pub fn build(&self, roster: &BTreeMap<String, Pubkey>) -> Result<Block, GenesisError> {
        let stakes = self.resolve_stakes(roster)?;
        let mut balances = self.starting_balances.clone();
        for (addr, stake) in &stakes {
            *balances.entry(*addr).or_insert(0) += stake;
        }
        Ok(Block::genesis(
            balances,
            StakeLedger::with_genesis_stakes(&stakes),
        ))
    }
}
