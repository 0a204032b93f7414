//! Equivocation evidence and the canonical consensus-message preimage.
//!
//! Every consensus message a validator signs (prevote, precommit, commit,
//! proposal) has a canonical byte preimage built here. A message's identity
//! is the sha256 of that preimage, and equivocation evidence carries just the
//! two conflicting `(block id, signature)` pairs: anyone can rebuild both
//! preimages from the named fields and check the signatures independently,
//! without ever shipping a full block.

use {
    solana_hash::Hash,
    solana_pubkey::Pubkey,
    solana_sha256_hasher::hash,
    solana_signature::Signature,
};

use crate::error::LedgerError;

/// The kind of signed consensus message, used as a signing domain tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MsgKind {
    Prevote,
    Precommit,
    Commit,
    Proposal,
}

impl MsgKind {
    /// Domain-separation tag mixed into the signing preimage.
    pub fn tag(&self) -> u8 {
        match self {
            MsgKind::Prevote => 1,
            MsgKind::Precommit => 2,
            MsgKind::Commit => 3,
            MsgKind::Proposal => 4,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(MsgKind::Prevote),
            2 => Some(MsgKind::Precommit),
            3 => Some(MsgKind::Commit),
            4 => Some(MsgKind::Proposal),
            _ => None,
        }
    }
}

impl std::fmt::Display for MsgKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MsgKind::Prevote => write!(f, "Prevote"),
            MsgKind::Precommit => write!(f, "Precommit"),
            MsgKind::Commit => write!(f, "Commit"),
            MsgKind::Proposal => write!(f, "Proposal"),
        }
    }
}

/// Canonical signing preimage for a consensus message.
///
/// `block_id == None` encodes a nil vote. Proposals always carry a block id.
pub fn message_sign_bytes(
    kind: MsgKind,
    height: u64,
    round: u32,
    block_id: Option<&Hash>,
    from: &Pubkey,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + 8 + 4 + 1 + 32 + 32);
    buf.push(kind.tag());
    buf.extend_from_slice(&height.to_le_bytes());
    buf.extend_from_slice(&round.to_le_bytes());
    match block_id {
        Some(id) => {
            buf.push(1);
            buf.extend_from_slice(id.as_ref());
        }
        None => buf.push(0),
    }
    buf.extend_from_slice(from.as_ref());
    buf
}

/// Identity of a consensus message: sha256 over its signing preimage.
pub fn message_id(
    kind: MsgKind,
    height: u64,
    round: u32,
    block_id: Option<&Hash>,
    from: &Pubkey,
) -> Hash {
    hash(&message_sign_bytes(kind, height, round, block_id, from))
}

/// One of the two conflicting messages inside an evidence record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictingMsg {
    /// Block id the message was cast for (`None` = nil vote).
    pub block_id: Option<Hash>,
    /// The culprit's signature over the reconstructed preimage.
    pub signature: Signature,
}

/// Proof that a validator signed two conflicting consensus messages at the
/// same (height, round, kind).
///
/// Self-contained and independently verifiable: the preimages of both
/// messages are reconstructed from the fields here, so any node can check
/// the evidence without extra context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquivocationEvidence {
    /// The equivocating validator.
    pub culprit: Pubkey,
    pub height: u64,
    pub round: u32,
    pub kind: MsgKind,
    pub first: ConflictingMsg,
    pub second: ConflictingMsg,
}

impl EquivocationEvidence {
    /// Verify the evidence stands on its own: two messages from `culprit` at
    /// the same (height, round, kind), different block ids, both correctly
    /// signed.
    pub fn verify(&self) -> Result<(), LedgerError> {
        if self.first.block_id == self.second.block_id {
            return Err(LedgerError::InvalidEvidence(
                "messages vote for the same block id",
            ));
        }
        for msg in [&self.first, &self.second] {
            let preimage = message_sign_bytes(
                self.kind,
                self.height,
                self.round,
                msg.block_id.as_ref(),
                &self.culprit,
            );
            if !msg.signature.verify(self.culprit.as_ref(), &preimage) {
                return Err(LedgerError::InvalidEvidence("signature does not verify"));
            }
        }
        Ok(())
    }

    /// Identity of the underlying message pair, order-independent.
    ///
    /// The same equivocation reported by two different validators yields the
    /// same pair id, which is what the ledger dedupes slashes on.
    pub fn pair_id(&self) -> (Hash, Hash) {
        let a = message_id(
            self.kind,
            self.height,
            self.round,
            self.first.block_id.as_ref(),
            &self.culprit,
        );
        let b = message_id(
            self.kind,
            self.height,
            self.round,
            self.second.block_id.as_ref(),
            &self.culprit,
        );
        if a.as_ref() <= b.as_ref() {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Canonical byte encoding, used inside transaction signing preimages.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 + 8 + 4 + 1 + 2 * (1 + 32 + 64));
        buf.extend_from_slice(self.culprit.as_ref());
        buf.extend_from_slice(&self.height.to_le_bytes());
        buf.extend_from_slice(&self.round.to_le_bytes());
        buf.push(self.kind.tag());
        for msg in [&self.first, &self.second] {
            match &msg.block_id {
                Some(id) => {
                    buf.push(1);
                    buf.extend_from_slice(id.as_ref());
                }
                None => buf.push(0),
            }
            buf.extend_from_slice(msg.signature.as_ref());
        }
        buf
    }
}
