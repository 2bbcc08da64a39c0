//! Wallet-facing layer: the unlocked session and message ingestion.

/// Unlock lifecycle and messaging entry points
pub mod session;
/// Message ingestion
pub mod sync;
pub mod types;

pub use session::{SessionServices, UnlockedWallet, WalletSession, WalletUnlocker};
pub use types::*;
