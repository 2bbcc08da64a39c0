use crate::explorer::ExplorerError;
use crate::messaging::{ConversationError, StoreError};
use crate::node::NodeError;
use crate::transaction::builder::TransactionError;

/// Sequencing errors: the wallet is used before it is ready. Always fatal to the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
	#[error("wallet locked")]
	WalletLocked,

	#[error("password not set")]
	MissingPassword,

	#[error("ingestion service not started")]
	ServiceNotStarted,

	#[error("receive address not initialized")]
	ReceiveAddressUninitialized,

	#[error("unlock failed: {0}")]
	UnlockFailed(String),
}

/// Errors raised while ingesting transactions or driving the wallet session
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum WalletSyncError {
	#[error("Node error: {0}")]
	NodeError(#[from] NodeError),

	#[error("Explorer error: {0}")]
	ExplorerError(#[from] ExplorerError),

	#[error("Storage error: {0}")]
	StoreError(#[from] StoreError),

	#[error("Conversation error: {0}")]
	ConversationError(#[from] ConversationError),

	#[error("Transaction error: {0}")]
	TransactionError(#[from] TransactionError),

	#[error("{0}")]
	StateError(#[from] StateError),

	#[error("Sync error: {0}")]
	SyncError(String),
}
