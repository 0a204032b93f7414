//! The per-validator consensus event loop.
//!
//! One dedicated thread owns the consensus engine and serializes everything
//! against it: inbound network messages, ingress transactions, and timer
//! expirations. Network sends are fire-and-forget, so the only suspension
//! point is the timed receive on the inbox.
//!
//! ```text
//!  ┌───────────────────────────────────────────────┐
//!  │              ValidatorService                 │
//!  │                                               │
//!  │  inbox ──▶ TxPool ──▶ ConsensusEngine ──▶ Network
//!  │                ▲            │                 │
//!  │                └── TimeoutScheduler ◀─────────┘
//!  └───────────────────────────────────────────────┘
//! ```

use {
    aurum_consensus_bft::{
        ConsensusConfig, ConsensusEngine, ConsensusMessage, EngineOutput, Step,
        TimeoutScheduler,
    },
    aurum_ledger::Block,
    crossbeam_channel::{Receiver, RecvTimeoutError},
    log::*,
    solana_keypair::Keypair,
    std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread::{self, Builder, JoinHandle},
        time::Duration,
    },
};

use crate::{
    error::NodeError,
    network::{Network, WireMessage, NEW_ROUND},
    tx_pool::TxPool,
};

/// Upper bound on how long the loop sleeps between exit-flag checks.
const POLL_INTERVAL_MS: u64 = 50;

/// How many pooled transactions are forwarded to the engine per event.
const FORWARD_BATCH: usize = 256;

/// A long-running service driving one validator's consensus loop.
pub struct ValidatorService {
    thread: JoinHandle<()>,
}

impl ValidatorService {
    /// Spawn the consensus thread for a validator resting on `genesis`.
    ///
    /// `inbox` carries everything from the network; outputs are broadcast
    /// through `network`. Raising `exit` shuts the loop down.
    pub fn new(
        config: ConsensusConfig,
        keypair: Arc<Keypair>,
        genesis: Block,
        network: Arc<dyn Network>,
        inbox: Receiver<WireMessage>,
        exit: Arc<AtomicBool>,
    ) -> Self {
        let scheduler = TimeoutScheduler::new(config.clone());
        let engine = ConsensusEngine::new(config, keypair, genesis);
        let thread = Builder::new()
            .name("aurumConsensus".to_string())
            .spawn(move || Self::run(engine, scheduler, network, inbox, exit))
            .expect("failed to spawn consensus thread");
        Self { thread }
    }

    /// Join the consensus thread.
    pub fn join(self) -> thread::Result<()> {
        self.thread.join()
    }

    fn run(
        mut engine: ConsensusEngine,
        mut scheduler: TimeoutScheduler,
        network: Arc<dyn Network>,
        inbox: Receiver<WireMessage>,
        exit: Arc<AtomicBool>,
    ) {
        info!(
            "validator {} starting at height {}",
            engine.identity(),
            engine.height()
        );
        let mut pool = TxPool::new();
        let mut armed = (0u64, 0u32, Step::Finalize);

        let output = engine.start_height();
        Self::dispatch(&mut engine, &network, output);
        Self::rearm(&mut scheduler, &engine, &mut armed, false);

        loop {
            if exit.load(Ordering::Relaxed) {
                info!("exit signal received, shutting down");
                break;
            }

            let wait = scheduler
                .remaining()
                .unwrap_or(Duration::from_millis(POLL_INTERVAL_MS))
                .min(Duration::from_millis(POLL_INTERVAL_MS));

            match inbox.recv_timeout(wait) {
                Ok(message) => {
                    let output = Self::handle_message(&mut engine, &mut pool, message);
                    Self::dispatch(&mut engine, &network, output);
                    Self::rearm(&mut scheduler, &engine, &mut armed, false);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(step) = scheduler.check_expired() {
                        scheduler.cancel();
                        trace!("{step} timer expired at h={} r={}", engine.height(), engine.round());
                        let output = engine.on_timeout(step);
                        Self::dispatch(&mut engine, &network, output);
                        let commit_wait = step == Step::Commit;
                        Self::rearm(&mut scheduler, &engine, &mut armed, commit_wait);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    info!("inbox disconnected, shutting down");
                    break;
                }
            }
        }
    }

    /// Route one inbound message into the engine.
    fn handle_message(
        engine: &mut ConsensusEngine,
        pool: &mut TxPool,
        message: WireMessage,
    ) -> EngineOutput {
        match message {
            WireMessage::Consensus(ConsensusMessage::Proposal(proposal)) => {
                engine.on_proposal(proposal)
            }
            WireMessage::Consensus(ConsensusMessage::Vote(vote)) => engine.on_vote(vote),
            WireMessage::Transaction(tx) => {
                match pool.submit(tx) {
                    Ok(()) => {}
                    Err(NodeError::DuplicateTransaction) => {}
                    Err(e) => debug!("rejecting transaction: {e}"),
                }
                let mut output = EngineOutput::empty();
                for tx in pool.drain(FORWARD_BATCH) {
                    output.merge(engine.on_transaction(tx));
                }
                output
            }
            WireMessage::NewRound { .. } => EngineOutput::empty(),
        }
    }

    /// Broadcast an engine output and advance to the next height after a
    /// commit.
    fn dispatch(engine: &mut ConsensusEngine, network: &Arc<dyn Network>, output: EngineOutput) {
        let mut output = output;
        loop {
            for message in output.messages.drain(..) {
                let wire = WireMessage::Consensus(message);
                network.broadcast(wire.channel(), wire);
            }
            for tx in output.transactions.drain(..) {
                let wire = WireMessage::Transaction(tx);
                network.broadcast(wire.channel(), wire);
            }
            if let Some(round) = output.round_started.take() {
                network.broadcast(
                    NEW_ROUND,
                    WireMessage::NewRound {
                        height: engine.height(),
                        round,
                    },
                );
            }
            let Some(committed) = output.committed.take() else {
                break;
            };
            info!(
                "installed block {} at height {} (round {})",
                committed.block.id(),
                committed.block.height,
                committed.round
            );
            output = engine.start_height();
        }
    }

    /// Keep the single armed timer in sync with the engine state. Re-arms
    /// only when (height, round, step) moved, so inbound chatter does not
    /// stretch a running phase timer. An unchanged Commit step after a
    /// commit-wait expiry re-arms the laggard wait by one delta.
    fn rearm(
        scheduler: &mut TimeoutScheduler,
        engine: &ConsensusEngine,
        armed: &mut (u64, u32, Step),
        commit_wait_expired: bool,
    ) {
        let state = (engine.height(), engine.round(), engine.step());
        if *armed == state {
            if commit_wait_expired && engine.step() == Step::Commit {
                scheduler.start_commit_retry();
            }
            return;
        }
        *armed = state;
        match engine.step() {
            Step::Finalize => scheduler.cancel(),
            step => scheduler.start(step, engine.round()),
        }
    }
}
