//! Explorer integration
//!
//! The explorer's REST API serves an address's confirmed transaction history (used for
//! backfill) and transaction details (used to resolve the sender of a transaction).

/// REST client for the explorer API
mod client;
/// Type definitions for explorer data structures
mod types;

pub use client::{ExplorerApi, KaspaExplorerClient};
pub use types::*;
