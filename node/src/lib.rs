//! The validator node layer.
//!
//! Everything around the pure consensus engine: the broadcast seam and its
//! channel names, the ingress transaction pool, the client-facing staking
//! API, and the single-threaded event loop that owns one validator's engine
//! and serializes every message and timer against it.

pub mod error;
pub mod network;
pub mod service;
pub mod stakeholder;
pub mod tx_pool;

pub use error::NodeError;
pub use network::{ChannelNetwork, Network, WireMessage};
pub use service::ValidatorService;
pub use stakeholder::{Stakeholder, Wallet};
pub use tx_pool::TxPool;
