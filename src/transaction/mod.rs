/// Unsigned transaction generation
pub mod builder;
/// Build, sign and submit wallet transactions
pub mod engine;
/// Mass and fee model
pub mod fees;
/// Signing collaborator
pub mod signer;
pub mod types;

pub use builder::{PendingKind, TransactionError, TransactionGenerator};
pub use engine::{
	EngineConfig, FeeSummary, SelfMessagePolicy, SendKind, SendRequest, SentTransaction,
	TransactionEngine, TransactionShape,
};
pub use fees::PriorityFee;
pub use signer::TransactionSigner;

/// Sompi per KAS.
pub const SOMPI_PER_KAS: u64 = 100_000_000;

/// Number of decimal places for KAS.
pub const KAS_DECIMALS: u32 = 8;

/// Smallest amount a handshake payment may carry (0.2 KAS).
pub const MIN_HANDSHAKE_AMOUNT: u64 = SOMPI_PER_KAS / 5;
