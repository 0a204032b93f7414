//! Staking-ledger invariants and the staking lifecycle scenario.
//!
//! Covered here:
//! - stake conservation under arbitrary stake/unstake/advance sequences,
//! - slashing redistribution bounds (floor shares, burned residue),
//! - accumulated-power conservation under rotation updates,
//! - the exact unbonding window, at the ledger and across committed blocks.

use {
    crate::harness::TestCluster,
    aurum_ledger::{StakeLedger, Transaction, TxData, UNSTAKE_DELAY},
    proptest::prelude::*,
    solana_pubkey::Pubkey,
    std::collections::BTreeMap,
};

fn addr(seed: u8) -> Pubkey {
    Pubkey::new_from_array([seed; 32])
}

fn ledger_of(stakes: &[u64]) -> StakeLedger {
    let map: BTreeMap<Pubkey, u64> = stakes
        .iter()
        .enumerate()
        .map(|(i, s)| (addr(i as u8 + 1), *s))
        .collect();
    StakeLedger::with_genesis_stakes(&map)
}

// ── Scenarios ──

/// Stake at height 5, unstake at height 10, release at height 45: the full
/// lifecycle across committed blocks.
#[test]
fn test_stake_then_unstake_lifecycle() {
    let mut cluster = TestCluster::with_spare_gold(&[100, 100, 100, 100], 50);
    let staker = std::sync::Arc::clone(&cluster.validators[0].keypair);
    let staker_addr = cluster.validators[0].address();

    for _ in 1..5 {
        cluster.run_height(3);
    }
    assert_eq!(cluster.head().height, 4);

    // Stake 50 in the block at height 5.
    cluster.submit(&Transaction::new(&staker, 0, TxData::Stake { amount: 50 }));
    let committed = cluster.run_height(3);
    assert_eq!(committed.block.height, 5);
    assert_eq!(cluster.head().stake_ledger.stake_of(&staker_addr), 150);
    assert_eq!(cluster.head().available_gold(&staker_addr), 0);

    for _ in 6..10 {
        cluster.run_height(3);
    }

    // Unstake 50 in the block at height 10: scheduled for height 45.
    cluster.submit(&Transaction::new(&staker, 1, TxData::Unstake { amount: 50 }));
    let committed = cluster.run_height(3);
    assert_eq!(committed.block.height, 10);
    let release_height = 10 + UNSTAKE_DELAY;
    {
        let ledger = &cluster.head().stake_ledger;
        // Still bonded during the whole window.
        assert_eq!(ledger.stake_of(&staker_addr), 150);
        let events = &ledger.unstaking_events()[&release_height];
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].amount, 50);
    }

    // The stake stays put through height release-1...
    while cluster.head().height < release_height - 1 {
        cluster.run_height(3);
        assert_eq!(cluster.head().stake_ledger.stake_of(&staker_addr), 150);
    }

    // ...and drains on entry to the release height.
    let committed = cluster.run_height(3);
    assert_eq!(committed.block.height, release_height);
    let head = cluster.head();
    assert_eq!(head.stake_ledger.stake_of(&staker_addr), 100);
    assert!(head.stake_ledger.unstaking_events().is_empty());
    // The released gold is liquid again; no balance ever moved.
    assert_eq!(head.balance_of(&staker_addr), 150);
    assert_eq!(head.available_gold(&staker_addr), 50);
}

/// The unbonding window at the ledger level: present for exactly
/// UNSTAKE_DELAY - 1 intervening heights, gone on entry to h + delay.
#[test]
fn test_unbond_window_is_exact() {
    let mut ledger = ledger_of(&[100, 100]);
    ledger.unstake(&addr(1), 40, 7).unwrap();
    for height in 8..7 + UNSTAKE_DELAY {
        ledger.advance(height);
        assert_eq!(ledger.stake_of(&addr(1)), 100, "still bonded at {height}");
    }
    ledger.advance(7 + UNSTAKE_DELAY);
    assert_eq!(ledger.stake_of(&addr(1)), 60);
}

// ── Properties ──

proptest! {
    /// Total bonded stake is exactly initial + staked - matured unbonds,
    /// for any interleaving of operations.
    #[test]
    fn prop_stake_conservation(
        initial in proptest::collection::vec(1u64..=1_000, 1..=5),
        ops in proptest::collection::vec((0usize..5, 1u64..=200, any::<bool>()), 0..20),
    ) {
        let mut ledger = ledger_of(&initial);
        let initial_total = ledger.total_bonded();
        let mut staked = 0u64;
        let mut unstaked = 0u64;

        let mut height = 0u64;
        for (idx, amount, is_stake) in ops {
            height += 1;
            ledger.advance(height);
            let who = addr((idx % initial.len()) as u8 + 1);
            if is_stake {
                ledger.stake(&who, amount).unwrap();
                staked += amount;
            } else if ledger.unstake(&who, amount, height).is_ok() {
                unstaked += amount;
            }
        }
        // Run out the clock on every pending unbond.
        for h in height + 1..=height + UNSTAKE_DELAY {
            ledger.advance(h);
        }
        prop_assert!(ledger.unstaking_events().is_empty());
        prop_assert_eq!(ledger.total_bonded(), initial_total + staked - unstaked);
    }

    /// Slashing redistributes floor(S * stake_i / remaining) to each
    /// survivor; the sum never exceeds the seized amount and the burned
    /// residue makes up the difference exactly.
    #[test]
    fn prop_slash_redistribution_exact(
        stakes in proptest::collection::vec(1u64..=1_000_000, 2..=8),
        victim in 0usize..8,
    ) {
        let victim = victim % stakes.len();
        let mut ledger = ledger_of(&stakes);
        let victim_addr = addr(victim as u8 + 1);
        let seized_expected = ledger.stake_of(&victim_addr);
        let before = ledger.total_bonded();
        let remaining: u64 = before - seized_expected;

        let outcome = ledger.slash(&victim_addr);
        prop_assert_eq!(outcome.seized, seized_expected);

        let distributed: u64 = outcome.redistributed.values().sum();
        prop_assert!(distributed <= outcome.seized);
        prop_assert_eq!(distributed + outcome.burned, outcome.seized);
        for (i, stake) in stakes.iter().enumerate() {
            if i == victim {
                continue;
            }
            let share = (seized_expected as u128 * *stake as u128 / remaining as u128) as u64;
            prop_assert_eq!(
                outcome.redistributed.get(&addr(i as u8 + 1)).copied().unwrap_or(0),
                share
            );
        }
        // Everything except the burned residue stays bonded.
        prop_assert_eq!(ledger.total_bonded(), before - outcome.seized + distributed);
    }

    /// update_accum_power never changes the total accumulated power, for
    /// any sequence of proposers.
    #[test]
    fn prop_accum_power_conservation(
        stakes in proptest::collection::vec(1u64..=10_000, 1..=6),
        proposers in proptest::collection::vec(0usize..6, 1..=30),
    ) {
        let mut ledger = ledger_of(&stakes);
        let expected: i64 = ledger.accum_power().values().sum();
        for p in proposers {
            let who = addr((p % stakes.len()) as u8 + 1);
            ledger.update_accum_power(&who);
            let total: i64 = ledger.accum_power().values().sum();
            prop_assert_eq!(total, expected);
        }
    }
}
