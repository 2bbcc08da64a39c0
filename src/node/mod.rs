//! Chain node integration: JSON wRPC transport and the wallet's UTXO context.

/// wRPC client and the collaborator traits it implements
mod client;
/// Type definitions for node RPC data structures
mod types;
/// UTXO tracking and balances
pub mod utxo;

pub use client::{BlockStream, BlockSubscriber, KaspaNodeClient, TransactionSubmitter, UtxoSource};
pub use types::*;
pub use utxo::{Balance, RpcUtxoContext, UtxoContext};
