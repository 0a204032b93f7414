//! The core BFT consensus state machine.
//!
//! Drives a validator through propose → prevote → precommit → commit for
//! each round of each height. The engine is deterministic: given the same
//! sequence of messages and timer events it always produces the same state
//! transitions and output messages. All I/O, clocks, and threading are
//! handled externally by the node layer; this module is pure state-machine
//! logic, which is also how the tests drive it.
//!
//! # Round flow
//!
//! On round entry the proposer (chosen by accumulated power on a
//! round-local rotation copy) broadcasts a proposal — a freshly built block,
//! or its locked block with a proof of lock. The propose timer ends the
//! collection window and triggers the prevote; the prevote timer triggers
//! the prevote tally and possibly a precommit (with locking); the precommit
//! timer triggers the commit decision; and the commit timer tallies commit
//! votes until the block can be installed. Commit votes are retained across
//! rounds of the height and count as prevotes and precommits in every later
//! round, so validators that already committed pull the rest forward.

use {
    aurum_ledger::{
        Block, ConflictingMsg, EquivocationEvidence, LedgerError, MsgKind, Transaction,
        TxData,
    },
    log::*,
    solana_hash::Hash,
    solana_keypair::Keypair,
    solana_pubkey::Pubkey,
    solana_signer::Signer,
    std::{
        collections::{BTreeMap, HashSet},
        sync::Arc,
    },
};

use crate::{
    config::ConsensusConfig,
    proposal::Proposal,
    proposer,
    tally::{count_votes, TallyOutcome},
    types::{CommittedBlock, ConsensusMessage, EngineOutput, Step},
    vote::{Vote, VotePhase},
    vote_box::{Recorded, VoteBox},
};

/// Cap on transactions drained from the pending pool into one block.
const MAX_TRANSACTIONS_PER_BLOCK: usize = 2048;

/// A lock acquired on >2/3 prevote stake for a block.
#[derive(Debug, Clone)]
struct LockState {
    block: Block,
    /// Round in which the lock was acquired.
    round: u32,
    /// The prevotes that justified the lock; attached as proof when the
    /// locked block is re-proposed.
    proof: Vec<Vote>,
}

/// The BFT consensus engine for a single validator.
pub struct ConsensusEngine {
    config: ConsensusConfig,
    keypair: Arc<Keypair>,
    identity: Pubkey,
    /// Committed chain head. The engine is always deciding `head.height + 1`.
    head: Block,
    round: u32,
    step: Step,
    /// Round-local proposer rotation, seeded from the head's accumulated
    /// power at height start and advanced once per round. Only the rotation
    /// map inside the committed block persists.
    round_power: BTreeMap<Pubkey, i64>,
    expected_proposer: Option<Pubkey>,
    /// Valid proposals received this round (normally one; two or more
    /// distinct ids from the proposer are equivocation).
    proposals: Vec<Proposal>,
    /// The unique valid proposal block of this round, kept past the prevote
    /// so a prevote quorum can lock on it.
    candidate: Option<Block>,
    locked: Option<LockState>,
    prevotes: VoteBox,
    precommits: VoteBox,
    /// Commit votes for the current height; preserved across rounds.
    commits: VoteBox,
    /// Block that won the commit decision, awaiting the commit-vote quorum.
    next_block: Option<Block>,
    /// Pending transactions, drained into blocks we propose.
    mempool: Vec<Transaction>,
    mempool_ids: HashSet<Hash>,
    /// Nonce for transactions the engine itself signs (evidence reports).
    tx_nonce: u64,
}

impl ConsensusEngine {
    /// Create an engine resting on a committed chain head (usually genesis).
    /// Call [`start_height`](Self::start_height) to begin consensus.
    pub fn new(config: ConsensusConfig, keypair: Arc<Keypair>, head: Block) -> Self {
        let identity = keypair.pubkey();
        Self {
            config,
            keypair,
            identity,
            head,
            round: 0,
            step: Step::Finalize,
            round_power: BTreeMap::new(),
            expected_proposer: None,
            proposals: Vec::new(),
            candidate: None,
            locked: None,
            prevotes: VoteBox::new(VotePhase::Prevote),
            precommits: VoteBox::new(VotePhase::Precommit),
            commits: VoteBox::new(VotePhase::Commit),
            next_block: None,
            mempool: Vec::new(),
            mempool_ids: HashSet::new(),
            tx_nonce: 0,
        }
    }

    // -- Public API --

    /// Begin consensus for the height above the current head: reset all
    /// per-height state, seed the round-local rotation from the head, and
    /// start round 1.
    pub fn start_height(&mut self) -> EngineOutput {
        info!("starting consensus for height {}", self.height());
        self.round_power = self.head.stake_ledger.accum_power().clone();
        self.commits.clear();
        self.locked = None;
        self.next_block = None;
        self.start_round(1)
    }

    /// Process an incoming proposal.
    pub fn on_proposal(&mut self, proposal: Proposal) -> EngineOutput {
        if proposal.height != self.height() || proposal.round != self.round {
            debug!(
                "dropping proposal for h={} r={} (at h={} r={})",
                proposal.height,
                proposal.round,
                self.height(),
                self.round
            );
            return EngineOutput::empty();
        }
        if self.step != Step::Propose {
            debug!("dropping proposal received after the propose window");
            return EngineOutput::empty();
        }
        if Some(proposal.from) != self.expected_proposer {
            warn!(
                "dropping proposal from {}, expected proposer {:?}",
                proposal.from, self.expected_proposer
            );
            return EngineOutput::empty();
        }
        if let Err(e) = proposal.is_valid() {
            warn!("dropping invalid proposal from {}: {e}", proposal.from);
            return EngineOutput::empty();
        }
        if proposal.block.prev_hash != self.head.id() {
            // Peer sync is out of scope; a proposal on an unknown parent is
            // simply ignored.
            debug!("dropping proposal with unknown parent");
            return EngineOutput::empty();
        }
        if proposal.proof_of_lock.is_empty() && proposal.block.proposer != proposal.from {
            warn!("dropping fresh proposal built by a different validator");
            return EngineOutput::empty();
        }
        if !proposal.proof_of_lock.is_empty() && !self.proof_of_lock_valid(&proposal) {
            warn!("dropping re-proposal with invalid proof of lock");
            return EngineOutput::empty();
        }
        if let Err(e) = proposal.block.rerun(&self.head) {
            warn!("dropping proposal that fails replay: {e}");
            return EngineOutput::empty();
        }
        if self.proposals.iter().any(|p| p.id() == proposal.id()) {
            return EngineOutput::empty();
        }
        self.proposals.push(proposal);
        EngineOutput::empty()
    }

    /// Process an incoming vote (any phase).
    pub fn on_vote(&mut self, vote: Vote) -> EngineOutput {
        if vote.height != self.height() {
            debug!(
                "dropping {} for h={} (at h={})",
                vote.phase,
                vote.height,
                self.height()
            );
            return EngineOutput::empty();
        }
        if !vote.verify_signature() {
            warn!("dropping {} with bad signature from {}", vote.phase, vote.from);
            return EngineOutput::empty();
        }
        if vote.is_stale(self.height(), self.round) {
            debug!("dropping stale {} from {}", vote.phase, vote.from);
            return EngineOutput::empty();
        }
        if !self.head.stake_ledger.is_bonded(&vote.from) {
            debug!("dropping {} from unbonded {}", vote.phase, vote.from);
            return EngineOutput::empty();
        }
        let votebox = match vote.phase {
            VotePhase::Prevote => &mut self.prevotes,
            VotePhase::Precommit => &mut self.precommits,
            VotePhase::Commit => &mut self.commits,
        };
        match votebox.record(vote) {
            Recorded::Stored | Recorded::Replaced => EngineOutput::empty(),
            Recorded::Duplicate | Recorded::StaleDropped => EngineOutput::empty(),
            Recorded::Equivocation(evidence) => {
                let mut output = EngineOutput::empty();
                self.report_equivocation(evidence, &mut output);
                output
            }
        }
    }

    /// Accept a transaction into the pending pool.
    pub fn on_transaction(&mut self, tx: Transaction) -> EngineOutput {
        if !tx.verify_signature() {
            warn!("dropping transaction with bad signature from {}", tx.from);
            return EngineOutput::empty();
        }
        if let TxData::Evidence { evidence } = &tx.data {
            if evidence.verify().is_err() {
                warn!("dropping transaction with invalid evidence from {}", tx.from);
                return EngineOutput::empty();
            }
            if self.head.stake_ledger.has_applied_evidence(&evidence.pair_id()) {
                debug!("dropping evidence already applied on chain");
                return EngineOutput::empty();
            }
        }
        let id = tx.id();
        if self.mempool_ids.insert(id) {
            self.mempool.push(tx);
        }
        EngineOutput::empty()
    }

    /// Handle a timer expiration for the given step. A timer that no longer
    /// matches the engine's step (the state moved on) is ignored.
    pub fn on_timeout(&mut self, step: Step) -> EngineOutput {
        if step != self.step {
            debug!("ignoring late {step} timer (at {})", self.step);
            return EngineOutput::empty();
        }
        match step {
            Step::Propose => self.do_prevote(),
            Step::Prevote => self.do_precommit(),
            Step::Precommit => self.do_commit_decision(),
            Step::Commit => self.do_commit_tally(),
            Step::Finalize => EngineOutput::empty(),
        }
    }

    // -- Accessors --

    /// The height currently being decided.
    pub fn height(&self) -> u64 {
        self.head.height + 1
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn identity(&self) -> &Pubkey {
        &self.identity
    }

    /// The committed chain head.
    pub fn head(&self) -> &Block {
        &self.head
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// The proposer chosen for the current round.
    pub fn expected_proposer(&self) -> Option<&Pubkey> {
        self.expected_proposer.as_ref()
    }

    /// Id of the block this validator is locked on, if any.
    pub fn locked_block_id(&self) -> Option<Hash> {
        self.locked.as_ref().map(|lock| lock.block.id())
    }

    pub fn pending_transactions(&self) -> usize {
        self.mempool.len()
    }

    // -- Round state machine --

    fn start_round(&mut self, round: u32) -> EngineOutput {
        if round > self.config.max_rounds_per_height {
            warn!(
                "height {} is at round {round}, past the advisory cap of {}",
                self.height(),
                self.config.max_rounds_per_height
            );
        }
        info!("starting round {round} at height {}", self.height());
        self.round = round;
        self.step = Step::Propose;
        self.proposals.clear();
        self.prevotes.clear();
        self.precommits.clear();
        self.candidate = None;

        let stakes = self.head.stake_ledger.stake_balances().clone();
        self.expected_proposer = proposer::select_proposer(&mut self.round_power, &stakes);

        let mut output = EngineOutput::empty();
        output.round_started = Some(round);

        if self.expected_proposer == Some(self.identity) {
            match self.make_proposal() {
                Ok(proposal) => {
                    // Our own proposal enters our buffer like anyone else's.
                    self.proposals.push(proposal.clone());
                    output.messages.push(ConsensusMessage::Proposal(proposal));
                }
                Err(e) => warn!("failed to build a proposal: {e}"),
            }
        }
        output
    }

    /// Propose timer fired: cast our prevote and close the proposal window.
    fn do_prevote(&mut self) -> EngineOutput {
        self.step = Step::Prevote;
        let mut output = EngineOutput::empty();

        // Index of the first proposal, and of the first one conflicting
        // with it (a second distinct block id from the same proposer).
        let first = if self.proposals.is_empty() { None } else { Some(0) };
        let conflicting = first.and_then(|f| {
            let first_id = self.proposals[f].block_id;
            self.proposals.iter().position(|p| p.block_id != first_id)
        });

        let block_id = if let Some(lock) = &self.locked {
            // Locked: prevote the lock, whatever was proposed.
            Some(lock.block.id())
        } else {
            match (first, conflicting) {
                (None, _) => None,
                (Some(f), None) => {
                    self.candidate = Some(self.proposals[f].block.clone());
                    Some(self.proposals[f].block_id)
                }
                (Some(f), Some(s)) => {
                    // Two conflicting proposals from the round's proposer.
                    let evidence = EquivocationEvidence {
                        culprit: self.proposals[f].from,
                        height: self.proposals[f].height,
                        round: self.proposals[f].round,
                        kind: MsgKind::Proposal,
                        first: ConflictingMsg {
                            block_id: Some(self.proposals[f].block_id),
                            signature: self.proposals[f].signature,
                        },
                        second: ConflictingMsg {
                            block_id: Some(self.proposals[s].block_id),
                            signature: self.proposals[s].signature,
                        },
                    };
                    self.report_equivocation(evidence, &mut output);
                    None
                }
            }
        };

        let vote = Vote::new(&self.keypair, self.height(), self.round, VotePhase::Prevote, block_id);
        self.prevotes.record(vote.clone());
        output.messages.push(ConsensusMessage::Vote(vote));
        self.proposals.clear();
        output
    }

    /// Prevote timer fired: tally prevotes, lock and precommit on a block
    /// quorum, release the lock on a nil quorum.
    fn do_precommit(&mut self) -> EngineOutput {
        self.step = Step::Precommit;
        let mut output = EngineOutput::empty();

        let outcome = count_votes(
            &self.prevotes,
            Some(&self.commits),
            self.head.stake_ledger.stake_balances(),
            Some(self.round),
        );
        match outcome {
            TallyOutcome::Block(block_id) => {
                if let Some(block) = self.known_block(block_id) {
                    let proof: Vec<Vote> = self
                        .prevotes
                        .iter()
                        .filter(|v| v.round == self.round && v.block_id == Some(block_id))
                        .cloned()
                        .collect();
                    info!(
                        "locking on {block_id} at h={} r={} ({} prevotes)",
                        self.height(),
                        self.round,
                        proof.len()
                    );
                    self.locked = Some(LockState {
                        block,
                        round: self.round,
                        proof,
                    });
                    let vote = Vote::new(
                        &self.keypair,
                        self.height(),
                        self.round,
                        VotePhase::Precommit,
                        Some(block_id),
                    );
                    self.precommits.record(vote.clone());
                    output.messages.push(ConsensusMessage::Vote(vote));
                } else {
                    warn!(
                        "prevote quorum for {block_id} at h={} r={}, but the block is unknown",
                        self.height(),
                        self.round
                    );
                }
            }
            TallyOutcome::Nil => {
                if self.locked.take().is_some() {
                    info!(
                        "nil prevote quorum at h={} r={}: releasing lock",
                        self.height(),
                        self.round
                    );
                }
                // Nil precommits are not broadcast.
            }
            TallyOutcome::NoQuorum => {}
        }
        self.prevotes.clear();
        output
    }

    /// Precommit timer fired: the commit decision. A block quorum moves to
    /// the commit wait; anything else starts the next round.
    fn do_commit_decision(&mut self) -> EngineOutput {
        let outcome = count_votes(
            &self.precommits,
            Some(&self.commits),
            self.head.stake_ledger.stake_balances(),
            Some(self.round),
        );
        if let TallyOutcome::Block(block_id) = outcome {
            if let Some(block) = self.known_block(block_id) {
                info!(
                    "precommit quorum for {block_id} at h={} r={}: committing",
                    self.height(),
                    self.round
                );
                self.next_block = Some(block);
                self.step = Step::Commit;
                let vote = Vote::new(
                    &self.keypair,
                    self.height(),
                    self.round,
                    VotePhase::Commit,
                    Some(block_id),
                );
                self.commits.record(vote.clone());
                let mut output = EngineOutput::empty();
                output.messages.push(ConsensusMessage::Vote(vote));
                return output;
            }
            warn!(
                "precommit quorum for {block_id} at h={} r={}, but the block is unknown",
                self.height(),
                self.round
            );
        }
        self.start_round(self.round + 1)
    }

    /// Commit timer fired: tally commit votes and install the block once
    /// >2/3 of the stake has committed. Short of that the node re-arms the
    /// wait one delta at a time.
    fn do_commit_tally(&mut self) -> EngineOutput {
        let outcome = count_votes(
            &self.commits,
            None,
            self.head.stake_ledger.stake_balances(),
            None,
        );
        let TallyOutcome::Block(block_id) = outcome else {
            return EngineOutput::empty();
        };
        let Some(block) = self.next_block.clone() else {
            warn!("commit quorum for {block_id} but no decided block");
            return EngineOutput::empty();
        };
        if block.id() != block_id {
            warn!("commit quorum for {block_id} does not match the decided block");
            return EngineOutput::empty();
        }
        self.next_block = None;

        info!(
            "height {} committed in round {} ({block_id})",
            self.height(),
            self.round
        );
        let included: HashSet<Hash> = block.transactions.iter().map(|tx| tx.id()).collect();
        self.mempool.retain(|tx| !included.contains(&tx.id()));
        self.mempool_ids.retain(|id| !included.contains(id));

        self.head = block.clone();
        self.step = Step::Finalize;
        let mut output = EngineOutput::empty();
        output.committed = Some(CommittedBlock {
            block,
            round: self.round,
        });
        output
    }

    // -- Internal helpers --

    /// Build a fresh proposal: a child block of the head filled from the
    /// pending pool, or a re-proposal of our locked block with its proof.
    fn make_proposal(&mut self) -> Result<Proposal, LedgerError> {
        if let Some(lock) = &self.locked {
            info!(
                "re-proposing locked block from round {} at h={} r={}",
                lock.round,
                self.height(),
                self.round
            );
            return Ok(Proposal::new(
                &self.keypair,
                lock.block.clone(),
                self.round,
                lock.proof.clone(),
            ));
        }

        let mut block = Block::child_of(&self.head, self.identity);
        let mut included = 0usize;
        for tx in &self.mempool {
            if included >= MAX_TRANSACTIONS_PER_BLOCK {
                break;
            }
            match block.apply_transaction(tx.clone()) {
                Ok(()) => included += 1,
                // Left in the pool; it may become valid at a later height.
                Err(e) => debug!("skipping transaction {}: {e}", tx.id()),
            }
        }
        block.stake_ledger.update_accum_power(&self.identity);
        Ok(Proposal::new(&self.keypair, block, self.round, Vec::new()))
    }

    /// Find a block with the given id among the blocks this engine holds.
    fn known_block(&self, block_id: Hash) -> Option<Block> {
        if let Some(lock) = &self.locked {
            if lock.block.id() == block_id {
                return Some(lock.block.clone());
            }
        }
        if let Some(candidate) = &self.candidate {
            if candidate.id() == block_id {
                return Some(candidate.clone());
            }
        }
        if let Some(next) = &self.next_block {
            if next.id() == block_id {
                return Some(next.clone());
            }
        }
        None
    }

    /// Turn detected equivocation into an evidence transaction: queue it for
    /// our next block and hand it to the node layer for broadcast.
    fn report_equivocation(
        &mut self,
        evidence: EquivocationEvidence,
        output: &mut EngineOutput,
    ) {
        if self.head.stake_ledger.has_applied_evidence(&evidence.pair_id()) {
            return;
        }
        warn!(
            "reporting equivocation by {} ({} at h={} r={})",
            evidence.culprit, evidence.kind, evidence.height, evidence.round
        );
        let tx = Transaction::new(
            &self.keypair,
            self.tx_nonce,
            TxData::Evidence { evidence },
        );
        self.tx_nonce += 1;
        if self.mempool_ids.insert(tx.id()) {
            self.mempool.push(tx.clone());
        }
        output.transactions.push(tx);
    }

    /// Check a re-proposal's proof of lock: prevotes for this block from a
    /// single earlier round of this height, each valid and distinct, jointly
    /// exceeding 2/3 of the bonded stake.
    fn proof_of_lock_valid(&self, proposal: &Proposal) -> bool {
        let weights = self.head.stake_ledger.stake_balances();
        let mut lock_round: Option<u32> = None;
        let mut seen: HashSet<Pubkey> = HashSet::new();
        let mut weight: u128 = 0;
        for vote in &proposal.proof_of_lock {
            if vote.phase != VotePhase::Prevote
                || vote.height != self.height()
                || vote.round >= proposal.round
                || vote.block_id != Some(proposal.block_id)
            {
                return false;
            }
            match lock_round {
                None => lock_round = Some(vote.round),
                Some(round) if round != vote.round => return false,
                Some(_) => {}
            }
            if !vote.verify_signature() || !seen.insert(vote.from) {
                return false;
            }
            weight += weights.get(&vote.from).copied().unwrap_or(0) as u128;
        }
        let total: u128 = weights.values().map(|w| *w as u128).sum();
        weight > total * 2 / 3
    }
}
