use crate::crypto::PrivateKey;
use crate::transaction::builder::TransactionError;
use crate::transaction::types::{PendingTransaction, Transaction};

/// Signs every input of a pending transaction with the wallet's receive key.
///
/// Signature hashing and Schnorr signing live outside the engine.
pub trait TransactionSigner: Send + Sync {
	fn sign(
		&self,
		pending: &PendingTransaction,
		key: &PrivateKey,
	) -> Result<Transaction, TransactionError>;
}
