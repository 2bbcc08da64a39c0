use crate::messaging::types::Message;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

/// Message persistence, scoped per wallet address.
///
/// `store` is idempotent on the transaction id: it returns `false` and leaves the stored
/// message untouched when the id is already present.
#[async_trait::async_trait]
pub trait MessageSink: Send + Sync {
	async fn contains(&self, wallet: &str, transaction_id: &str) -> Result<bool, StoreError>;

	async fn store(&self, wallet: &str, message: Message) -> Result<bool, StoreError>;

	/// Messages in insertion order.
	async fn messages(&self, wallet: &str) -> Result<Vec<Message>, StoreError>;

	async fn conversation_messages(
		&self,
		wallet: &str,
		counterparty: &str,
	) -> Result<Vec<Message>, StoreError> {
		Ok(self
			.messages(wallet)
			.await?
			.into_iter()
			.filter(|m| m.sender_address == counterparty || m.recipient_address == counterparty)
			.collect())
	}
}

#[derive(Default)]
pub struct MemoryMessageStore {
	wallets: Mutex<HashMap<String, Vec<Message>>>,
}

impl MemoryMessageStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait::async_trait]
impl MessageSink for MemoryMessageStore {
	async fn contains(&self, wallet: &str, transaction_id: &str) -> Result<bool, StoreError> {
		Ok(self
			.wallets
			.lock()
			.get(wallet)
			.is_some_and(|messages| messages.iter().any(|m| m.transaction_id == transaction_id)))
	}

	async fn store(&self, wallet: &str, message: Message) -> Result<bool, StoreError> {
		let mut wallets = self.wallets.lock();
		let messages = wallets.entry(wallet.to_string()).or_default();
		if messages
			.iter()
			.any(|m| m.transaction_id == message.transaction_id)
		{
			return Ok(false);
		}
		messages.push(message);
		Ok(true)
	}

	async fn messages(&self, wallet: &str) -> Result<Vec<Message>, StoreError> {
		Ok(self.wallets.lock().get(wallet).cloned().unwrap_or_default())
	}
}
