//! # Strata Contracts
//!
//! Composition layers built on the core ledger. Each contract keeps its
//! own settings in a namespaced partition of the shared
//! [`State`](strata_protocol::State) and mutates balances only through the
//! ledger's staged transactions, so the core invariants hold no matter
//! which layer made the call.
//!
//! - **Bridge Minter** — deposits, departures to other chains, and
//!   withdrawal of bonded child tokens back into the base token.

pub mod bridge_minter;

pub use bridge_minter::{apply_fee, BridgeConfig, BridgeError, BridgeMinter, BridgeOutRecord, BridgeResult};
