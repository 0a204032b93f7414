//! The broadcast seam between validators.
//!
//! The consensus protocol only needs best-effort fan-out: no ordering, no
//! delivery guarantee, no acknowledgement. The [`Network`] trait captures
//! exactly that, keyed by bit-stable channel names so independent
//! implementations interoperate. [`ChannelNetwork`] is the in-process
//! implementation used by tests and local clusters; a real transport plugs
//! in behind the same trait.

use {
    aurum_consensus_bft::{ConsensusMessage, VotePhase},
    aurum_ledger::Transaction,
    crossbeam_channel::{unbounded, Receiver, Sender},
    log::*,
    std::sync::Mutex,
};

/// Channel names, bit-stable across peers.
pub const POST_TRANSACTION: &str = "POST_TRANSACTION";
pub const BLOCK_PROPOSAL: &str = "BLOCK_PROPOSAL";
pub const PREVOTE: &str = "PREVOTE";
pub const PRECOMMIT: &str = "PRECOMMIT";
pub const COMMIT: &str = "COMMIT";
/// Local-only: a validator announcing its own round changes.
pub const NEW_ROUND: &str = "NEW_ROUND";

/// Everything that crosses the network seam.
#[derive(Debug, Clone)]
pub enum WireMessage {
    Consensus(ConsensusMessage),
    Transaction(Transaction),
    NewRound { height: u64, round: u32 },
}

impl WireMessage {
    /// The channel this message travels on.
    pub fn channel(&self) -> &'static str {
        match self {
            WireMessage::Consensus(ConsensusMessage::Proposal(_)) => BLOCK_PROPOSAL,
            WireMessage::Consensus(ConsensusMessage::Vote(vote)) => match vote.phase {
                VotePhase::Prevote => PREVOTE,
                VotePhase::Precommit => PRECOMMIT,
                VotePhase::Commit => COMMIT,
            },
            WireMessage::Transaction(_) => POST_TRANSACTION,
            WireMessage::NewRound { .. } => NEW_ROUND,
        }
    }
}

/// Best-effort broadcast. Implementations must not block the caller.
pub trait Network: Send + Sync {
    fn broadcast(&self, channel: &'static str, message: WireMessage);
}

/// In-process fan-out over crossbeam channels.
///
/// Every registered peer receives every broadcast, including messages the
/// sender itself originated — engines tolerate their own echoes.
#[derive(Default)]
pub struct ChannelNetwork {
    peers: Mutex<Vec<Sender<WireMessage>>>,
}

impl ChannelNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer; returns the receiving end of its inbox.
    pub fn register(&self) -> Receiver<WireMessage> {
        let (sender, receiver) = unbounded();
        self.peers.lock().unwrap().push(sender);
        receiver
    }
}

impl Network for ChannelNetwork {
    fn broadcast(&self, channel: &'static str, message: WireMessage) {
        // The local NEW_ROUND announcements never leave the node.
        if channel == NEW_ROUND {
            return;
        }
        let peers = self.peers.lock().unwrap();
        for peer in peers.iter() {
            if peer.send(message.clone()).is_err() {
                // A gone peer is a lost delivery, which the protocol
                // tolerates.
                trace!("dropping {channel} delivery to disconnected peer");
            }
        }
    }
}
