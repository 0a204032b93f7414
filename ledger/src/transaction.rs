//! Signed transactions and their payload forms.
//!
//! Three payloads exist: bonding stake, scheduling an unbond, and submitting
//! equivocation evidence. The discriminator is a real enum, so an unknown
//! transaction type is unrepresentable and matching is exhaustive.

use {
    solana_hash::Hash,
    solana_keypair::Keypair,
    solana_pubkey::Pubkey,
    solana_sha256_hasher::hash,
    solana_signature::Signature,
    solana_signer::Signer,
};

use crate::evidence::EquivocationEvidence;

/// Payload of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxData {
    /// Bond `amount` of the sender's liquid gold.
    Stake { amount: u64 },
    /// Schedule `amount` of the sender's bonded gold for delayed release.
    Unstake { amount: u64 },
    /// Report an equivocation; applying this slashes the culprit.
    Evidence { evidence: EquivocationEvidence },
}

impl TxData {
    fn tag(&self) -> u8 {
        match self {
            TxData::Stake { .. } => 0x10,
            TxData::Unstake { .. } => 0x11,
            TxData::Evidence { .. } => 0x12,
        }
    }
}

impl std::fmt::Display for TxData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxData::Stake { amount } => write!(f, "Stake({amount})"),
            TxData::Unstake { amount } => write!(f, "Unstake({amount})"),
            TxData::Evidence { evidence } => {
                write!(f, "Evidence(culprit={})", evidence.culprit)
            }
        }
    }
}

/// A signed transaction. `from` is the sender's address (its public key);
/// the signature covers everything but itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub from: Pubkey,
    /// Sender-local counter making otherwise-identical transactions distinct.
    pub nonce: u64,
    pub data: TxData,
    pub signature: Signature,
}

impl Transaction {
    /// Build and sign a transaction with the given keypair.
    pub fn new(keypair: &Keypair, nonce: u64, data: TxData) -> Self {
        let mut tx = Self {
            from: keypair.pubkey(),
            nonce,
            data,
            signature: Signature::default(),
        };
        tx.signature = keypair.sign_message(&tx.sign_bytes());
        tx
    }

    /// Canonical signing preimage: sender, nonce, and the encoded payload.
    pub fn sign_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 + 8 + 1 + 8);
        buf.extend_from_slice(self.from.as_ref());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.push(self.data.tag());
        match &self.data {
            TxData::Stake { amount } | TxData::Unstake { amount } => {
                buf.extend_from_slice(&amount.to_le_bytes());
            }
            TxData::Evidence { evidence } => {
                buf.extend_from_slice(&evidence.encode());
            }
        }
        buf
    }

    /// Transaction identity: sha256 over the signing preimage.
    pub fn id(&self) -> Hash {
        hash(&self.sign_bytes())
    }

    pub fn verify_signature(&self) -> bool {
        self.signature.verify(self.from.as_ref(), &self.sign_bytes())
    }
}
