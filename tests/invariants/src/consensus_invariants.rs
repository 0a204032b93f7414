//! Consensus-level invariants and end-to-end scenarios.
//!
//! Covered here:
//! - round-robin rotation and stake-proportional proposer frequency across
//!   committed heights,
//! - agreement: one block per height on every engine,
//! - equivocation detection → evidence transaction → on-chain slashing with
//!   proportional redistribution,
//! - chain linkage across heights.

use {
    crate::harness::TestCluster,
    aurum_consensus_bft::{proposer, Vote, VotePhase},
    aurum_ledger::TxData,
    proptest::prelude::*,
    solana_pubkey::Pubkey,
    solana_sha256_hasher::hashv,
    std::collections::{BTreeMap, HashSet},
};

// ── Scenarios ──

#[test]
fn test_equal_stake_round_robin_heights() {
    let mut cluster = TestCluster::new(&[100, 100, 100, 100]);
    let mut proposers = Vec::new();
    for height in 1..=4u64 {
        cluster.start_height();
        proposers.push(cluster.current_proposer());
        let committed = cluster.run_round();
        assert_eq!(committed.len(), 4, "height {height} commits in round 1");
        assert_eq!(committed[0].round, 1);
    }
    // Four heights, four distinct proposers: a full rotation.
    let distinct: HashSet<Pubkey> = proposers.iter().copied().collect();
    assert_eq!(distinct.len(), 4);

    // Stake is untouched by empty blocks.
    let ledger = &cluster.head().stake_ledger;
    assert_eq!(ledger.total_bonded(), 400);
    for validator in &cluster.validators {
        assert_eq!(ledger.stake_of(&validator.address()), 100);
    }
}

#[test]
fn test_skewed_stake_proposer_frequency() {
    // Stakes 400/100/100/100: over 7 committed heights the whale proposes
    // exactly 4 times and each minnow once.
    let mut cluster = TestCluster::new(&[400, 100, 100, 100]);
    let whale = cluster.validators[0].address();
    let mut counts: BTreeMap<Pubkey, u32> = BTreeMap::new();
    for _ in 0..7 {
        cluster.start_height();
        *counts.entry(cluster.current_proposer()).or_insert(0) += 1;
        let committed = cluster.run_round();
        assert!(!committed.is_empty());
    }
    assert_eq!(counts[&whale], 4);
    for validator in &cluster.validators[1..] {
        assert_eq!(counts[&validator.address()], 1);
    }
}

#[test]
fn test_chain_links_across_heights() {
    let mut cluster = TestCluster::new(&[100, 100, 100, 100]);
    let genesis_id = cluster.head().id();
    let first = cluster.run_height(3);
    assert_eq!(first.block.prev_hash, genesis_id);
    let second = cluster.run_height(3);
    assert_eq!(second.block.prev_hash, first.block.id());
    assert_eq!(second.block.height, 2);
}

#[test]
fn test_equivocation_slashing_end_to_end() {
    let mut cluster = TestCluster::new(&[100, 100, 100, 100]);
    cluster.start_height();

    // Validator 1 double-prevotes; only validator 0 sees both votes.
    let cheater = cluster.validators[1].address();
    let cheater_keypair = std::sync::Arc::clone(&cluster.validators[1].keypair);
    let vote_a = Vote::new(&cheater_keypair, 1, 1, VotePhase::Prevote, Some(hashv(&[b"x"])));
    let vote_b = Vote::new(&cheater_keypair, 1, 1, VotePhase::Prevote, Some(hashv(&[b"y"])));
    cluster.engines[0].on_vote(vote_a);
    let output = cluster.engines[0].on_vote(vote_b);
    assert_eq!(output.transactions.len(), 1, "detector emits evidence");
    let evidence_tx = output.transactions[0].clone();
    let TxData::Evidence { evidence } = &evidence_tx.data else {
        panic!("expected evidence payload");
    };
    assert_eq!(evidence.culprit, cheater);

    // The evidence transaction is broadcast; every engine pools it.
    cluster.submit(&evidence_tx);

    // Height 1 commits (the proposal predates the evidence), then height 2
    // carries the evidence on chain.
    assert!(!cluster.run_round().is_empty());
    let committed = cluster.run_height(3);
    assert!(committed
        .block
        .transactions
        .iter()
        .any(|tx| matches!(tx.data, TxData::Evidence { .. })));

    let head = cluster.head();
    assert!(!head.stake_ledger.is_bonded(&cheater), "cheater ejected");
    assert_eq!(head.balance_of(&cheater), 0, "seized stake left the balance");
    // floor(100 * 100 / 300) = 33 to each remaining validator, bonded and
    // liquid alike; the residue of 1 is burned.
    for validator in [&cluster.validators[0], &cluster.validators[2], &cluster.validators[3]] {
        assert_eq!(head.stake_ledger.stake_of(&validator.address()), 133);
        assert_eq!(head.balance_of(&validator.address()), 133);
    }
    assert_eq!(head.stake_ledger.total_bonded(), 399);
}

#[test]
fn test_slashed_validator_loses_vote_weight() {
    let mut cluster = TestCluster::new(&[100, 100, 100, 100]);
    cluster.start_height();
    let cheater_keypair = std::sync::Arc::clone(&cluster.validators[3].keypair);
    let vote_a = Vote::new(&cheater_keypair, 1, 1, VotePhase::Prevote, Some(hashv(&[b"x"])));
    let vote_b = Vote::new(&cheater_keypair, 1, 1, VotePhase::Prevote, Some(hashv(&[b"y"])));
    cluster.engines[0].on_vote(vote_a);
    let output = cluster.engines[0].on_vote(vote_b);
    cluster.submit(&output.transactions[0]);

    assert!(!cluster.run_round().is_empty());
    cluster.run_height(3);
    // With the cheater gone, the remaining three still clear 2/3 of the new
    // bonded total and the chain keeps committing.
    let committed = cluster.run_height(3);
    assert_eq!(committed.block.height, 3);
}

// ── Properties ──

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Over m full rotation periods (total-stake rounds), every validator
    /// is selected exactly m * stake times: proportional within the period.
    #[test]
    fn prop_rotation_exactly_proportional(
        stakes in proptest::collection::vec(1u64..=10, 2..=5),
        periods in 1u32..=3,
    ) {
        let stake_map: BTreeMap<Pubkey, u64> = stakes
            .iter()
            .enumerate()
            .map(|(i, s)| (Pubkey::new_from_array([i as u8 + 1; 32]), *s))
            .collect();
        let mut accum: BTreeMap<Pubkey, i64> =
            stake_map.iter().map(|(k, v)| (*k, *v as i64)).collect();
        let total: u64 = stake_map.values().sum();

        let mut counts: BTreeMap<Pubkey, u64> = BTreeMap::new();
        for _ in 0..(periods as u64 * total) {
            let winner = proposer::select_proposer(&mut accum, &stake_map).unwrap();
            *counts.entry(winner).or_insert(0) += 1;
        }
        for (addr, stake) in &stake_map {
            prop_assert_eq!(
                counts.get(addr).copied().unwrap_or(0),
                periods as u64 * stake
            );
        }
    }

    /// The rotation's total accumulated power is conserved by every
    /// selection step.
    #[test]
    fn prop_rotation_conserves_power(
        stakes in proptest::collection::vec(1u64..=1_000, 2..=6),
        rounds in 1u32..=50,
    ) {
        let stake_map: BTreeMap<Pubkey, u64> = stakes
            .iter()
            .enumerate()
            .map(|(i, s)| (Pubkey::new_from_array([i as u8 + 1; 32]), *s))
            .collect();
        let mut accum: BTreeMap<Pubkey, i64> =
            stake_map.iter().map(|(k, v)| (*k, *v as i64)).collect();
        let expected: i64 = accum.values().sum();
        for _ in 0..rounds {
            proposer::select_proposer(&mut accum, &stake_map);
            let sum: i64 = accum.values().sum();
            prop_assert_eq!(sum, expected);
        }
    }

    /// Agreement: with every message delivered, any stake distribution
    /// commits exactly one block per height on every engine.
    #[test]
    fn prop_agreement_across_stake_distributions(
        stakes in proptest::collection::vec(50u64..=500, 3..=4),
    ) {
        let mut cluster = TestCluster::new(&stakes);
        let first = cluster.run_height(3);
        prop_assert_eq!(first.block.height, 1);
        let second = cluster.run_height(3);
        prop_assert_eq!(second.block.prev_hash, first.block.id());
    }
}
