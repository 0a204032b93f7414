//! Ingress transaction pool.
//!
//! Accepts transactions off the wire, rejects duplicates and bad
//! signatures, and forwards the survivors to the consensus engine. The
//! seen-id set outlives forwarding, so a transaction that was already
//! drained (or committed) is never accepted a second time.

use {
    aurum_ledger::Transaction,
    solana_hash::Hash,
    std::collections::{HashSet, VecDeque},
};

use crate::error::NodeError;

const DEFAULT_CAPACITY: usize = 10_000;

/// Bounded FIFO of pending transactions with replay protection.
pub struct TxPool {
    queue: VecDeque<Transaction>,
    seen: HashSet<Hash>,
    capacity: usize,
}

impl Default for TxPool {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl TxPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            seen: HashSet::new(),
            capacity,
        }
    }

    /// Accept a transaction. Fails synchronously on a bad signature, a
    /// duplicate (including one already forwarded), or a full queue.
    pub fn submit(&mut self, tx: Transaction) -> Result<(), NodeError> {
        if !tx.verify_signature() {
            return Err(NodeError::InvalidSignature);
        }
        if self.queue.len() >= self.capacity {
            return Err(NodeError::PoolFull(self.capacity));
        }
        if !self.seen.insert(tx.id()) {
            return Err(NodeError::DuplicateTransaction);
        }
        self.queue.push_back(tx);
        Ok(())
    }

    /// Drain up to `max` transactions in arrival order.
    pub fn drain(&mut self, max: usize) -> Vec<Transaction> {
        let take = max.min(self.queue.len());
        self.queue.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        aurum_ledger::TxData,
        solana_keypair::Keypair,
    };

    fn tx(keypair: &Keypair, nonce: u64) -> Transaction {
        Transaction::new(keypair, nonce, TxData::Stake { amount: 10 })
    }

    #[test]
    fn test_submit_and_drain_in_order() {
        let keypair = Keypair::new();
        let mut pool = TxPool::new();
        pool.submit(tx(&keypair, 0)).unwrap();
        pool.submit(tx(&keypair, 1)).unwrap();
        let drained = pool.drain(10);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].nonce, 0);
        assert_eq!(drained[1].nonce, 1);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_duplicate_rejected() {
        let keypair = Keypair::new();
        let mut pool = TxPool::new();
        let t = tx(&keypair, 0);
        pool.submit(t.clone()).unwrap();
        assert_eq!(pool.submit(t), Err(NodeError::DuplicateTransaction));
    }

    #[test]
    fn test_drained_transaction_stays_seen() {
        let keypair = Keypair::new();
        let mut pool = TxPool::new();
        let t = tx(&keypair, 0);
        pool.submit(t.clone()).unwrap();
        pool.drain(1);
        // Replays of an already-forwarded transaction are refused.
        assert_eq!(pool.submit(t), Err(NodeError::DuplicateTransaction));
    }

    #[test]
    fn test_bad_signature_rejected() {
        let keypair = Keypair::new();
        let mut pool = TxPool::new();
        let mut t = tx(&keypair, 0);
        t.nonce = 7;
        assert_eq!(pool.submit(t), Err(NodeError::InvalidSignature));
    }

    #[test]
    fn test_capacity_enforced() {
        let keypair = Keypair::new();
        let mut pool = TxPool::with_capacity(2);
        pool.submit(tx(&keypair, 0)).unwrap();
        pool.submit(tx(&keypair, 1)).unwrap();
        assert_eq!(pool.submit(tx(&keypair, 2)), Err(NodeError::PoolFull(2)));
    }

    #[test]
    fn test_drain_respects_max() {
        let keypair = Keypair::new();
        let mut pool = TxPool::new();
        for nonce in 0..5 {
            pool.submit(tx(&keypair, nonce)).unwrap();
        }
        assert_eq!(pool.drain(3).len(), 3);
        assert_eq!(pool.len(), 2);
    }
}
