//! A deterministic multi-validator test harness.
//!
//! Runs one engine per validator, delivers every broadcast to every engine,
//! and advances phases by firing the timer events by hand. Genesis goes
//! through [`GenesisConfig`] so the bootstrap path is exercised too.

use {
    aurum_consensus_bft::{
        CommittedBlock, ConsensusConfig, ConsensusEngine, ConsensusMessage, EngineOutput,
        Step,
    },
    aurum_ledger::{Block, GenesisConfig, Transaction},
    solana_keypair::Keypair,
    solana_pubkey::Pubkey,
    solana_signer::Signer,
    std::{collections::BTreeMap, sync::Arc},
};

/// A validator identity in the test cluster.
pub struct TestValidator {
    pub keypair: Arc<Keypair>,
    pub stake: u64,
}

impl TestValidator {
    pub fn address(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}

/// An in-process cluster of consensus engines sharing one genesis.
pub struct TestCluster {
    pub validators: Vec<TestValidator>,
    pub engines: Vec<ConsensusEngine>,
}

impl TestCluster {
    /// Equal treatment of all validators: stake as given, no spare gold.
    pub fn new(stakes: &[u64]) -> Self {
        Self::with_spare_gold(stakes, 0)
    }

    /// Every validator additionally holds `spare` liquid (unbonded) gold.
    pub fn with_spare_gold(stakes: &[u64], spare: u64) -> Self {
        let validators: Vec<TestValidator> = stakes
            .iter()
            .map(|stake| TestValidator {
                keypair: Arc::new(Keypair::new()),
                stake: *stake,
            })
            .collect();

        let starting_stake: BTreeMap<Pubkey, u64> = validators
            .iter()
            .map(|v| (v.address(), v.stake))
            .collect();
        let starting_balances: BTreeMap<Pubkey, u64> = if spare > 0 {
            validators.iter().map(|v| (v.address(), spare)).collect()
        } else {
            BTreeMap::new()
        };
        let config = GenesisConfig {
            starting_stake: Some(starting_stake),
            starting_balances,
            ..GenesisConfig::default()
        };
        let genesis = config
            .build(&BTreeMap::new())
            .expect("genesis config is well-formed");

        let engines = validators
            .iter()
            .map(|v| {
                ConsensusEngine::new(
                    ConsensusConfig::default(),
                    Arc::clone(&v.keypair),
                    genesis.clone(),
                )
            })
            .collect();
        Self {
            validators,
            engines,
        }
    }

    /// The committed chain head (identical on every engine after a height
    /// completes).
    pub fn head(&self) -> &Block {
        self.engines[0].head()
    }

    /// The proposer every engine expects for the current round.
    pub fn current_proposer(&self) -> Pubkey {
        let proposers: Vec<Pubkey> = self
            .engines
            .iter()
            .map(|e| *e.expected_proposer().expect("round in progress"))
            .collect();
        assert!(
            proposers.windows(2).all(|w| w[0] == w[1]),
            "engines disagree on the proposer"
        );
        proposers[0]
    }

    /// Submit a transaction to every engine's pending pool.
    pub fn submit(&mut self, tx: &Transaction) {
        for engine in &mut self.engines {
            engine.on_transaction(tx.clone());
        }
    }

    /// Begin the next height on every engine and deliver the proposal.
    pub fn start_height(&mut self) {
        let outputs: Vec<EngineOutput> = self
            .engines
            .iter_mut()
            .map(|e| e.start_height())
            .collect();
        self.flush(outputs);
    }

    /// Fire one timer step on every engine and deliver all resulting
    /// messages; returns any committed blocks.
    pub fn timeout(&mut self, step: Step) -> Vec<CommittedBlock> {
        let outputs: Vec<EngineOutput> = self
            .engines
            .iter_mut()
            .map(|e| e.on_timeout(step))
            .collect();
        let committed = outputs.iter().filter_map(|o| o.committed.clone()).collect();
        self.flush(outputs);
        committed
    }

    /// One full round of timer steps; returns the blocks committed by each
    /// engine (empty when the round failed).
    pub fn run_round(&mut self) -> Vec<CommittedBlock> {
        self.timeout(Step::Propose);
        self.timeout(Step::Prevote);
        self.timeout(Step::Precommit);
        self.timeout(Step::Commit)
    }

    /// Drive the current height to commitment, bounded by `max_rounds`.
    /// Returns the committed block and asserts every engine installed it.
    pub fn run_height(&mut self, max_rounds: u32) -> CommittedBlock {
        self.start_height();
        for _ in 0..max_rounds {
            let committed = self.run_round();
            if committed.is_empty() {
                continue;
            }
            assert_eq!(
                committed.len(),
                self.engines.len(),
                "all engines commit together under full delivery"
            );
            let head = committed[0].block.id();
            for engine in &self.engines {
                assert_eq!(engine.head().id(), head);
            }
            return committed.into_iter().next().expect("non-empty");
        }
        panic!("height failed to commit within {max_rounds} rounds");
    }

    /// Deliver messages (and evidence transactions) until the cluster is
    /// quiet.
    fn flush(&mut self, mut outputs: Vec<EngineOutput>) {
        while outputs
            .iter()
            .any(|o| !o.messages.is_empty() || !o.transactions.is_empty())
        {
            let mut next = Vec::new();
            for output in outputs {
                for msg in output.messages {
                    for engine in &mut self.engines {
                        next.push(match &msg {
                            ConsensusMessage::Proposal(p) => engine.on_proposal(p.clone()),
                            ConsensusMessage::Vote(v) => engine.on_vote(v.clone()),
                        });
                    }
                }
                for tx in output.transactions {
                    for engine in &mut self.engines {
                        next.push(engine.on_transaction(tx.clone()));
                    }
                }
            }
            outputs = next;
        }
    }
}
