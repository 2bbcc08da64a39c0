use crate::messaging::{CacheStore, ConversationSnapshot, Message, MessageSink, StoreError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Maps an address or cache key onto a safe file stem.
fn file_stem(key: &str) -> String {
	key.chars()
		.map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
		.collect()
}

async fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
	match tokio::fs::read_to_string(path).await {
		Ok(content) => Ok(Some(content)),
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
		Err(e) => Err(e.into()),
	}
}

/// Writes through a temporary file so a crash never leaves a truncated document behind.
async fn write_atomic(path: &Path, content: &str) -> Result<(), StoreError> {
	if let Some(parent) = path.parent() {
		tokio::fs::create_dir_all(parent).await?;
	}
	let tmp = path.with_extension("json.tmp");
	tokio::fs::write(&tmp, content).await?;
	tokio::fs::rename(&tmp, path).await?;
	Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
	match read_optional(path).await? {
		Some(content) => Ok(Some(serde_json::from_str(&content)?)),
		None => Ok(None),
	}
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
	let content = serde_json::to_string_pretty(value)?;
	write_atomic(path, &content).await
}

/// File-based implementation of CacheStore: one JSON file per key
pub struct FileCacheStore {
	data_dir: PathBuf,
}

impl FileCacheStore {
	pub fn new(data_dir: PathBuf) -> Self {
		Self { data_dir }
	}

	fn path(&self, key: &str) -> PathBuf {
		self.data_dir.join(format!("{}.json", file_stem(key)))
	}
}

#[async_trait::async_trait]
impl CacheStore for FileCacheStore {
	async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		read_optional(&self.path(key)).await
	}

	async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
		write_atomic(&self.path(key), value).await
	}
}

/// File-based implementation of MessageSink: one JSON array per wallet
///
/// Each wallet's messages are loaded on first access and kept in memory; every new message
/// rewrites that wallet's file.
pub struct FileMessageRepository {
	data_dir: PathBuf,
	wallets: Mutex<HashMap<String, Vec<Message>>>,
}

impl FileMessageRepository {
	pub fn new(data_dir: PathBuf) -> Self {
		Self {
			data_dir,
			wallets: Mutex::new(HashMap::new()),
		}
	}

	fn path(&self, wallet: &str) -> PathBuf {
		self.data_dir
			.join(format!("messages_{}.json", file_stem(wallet)))
	}

	async fn loaded<'a>(
		&self,
		wallets: &'a mut HashMap<String, Vec<Message>>,
		wallet: &str,
	) -> Result<&'a mut Vec<Message>, StoreError> {
		if !wallets.contains_key(wallet) {
			let messages: Vec<Message> = read_json(&self.path(wallet)).await?.unwrap_or_default();
			debug!("Loaded {} messages for {}", messages.len(), wallet);
			wallets.insert(wallet.to_string(), messages);
		}
		Ok(wallets.entry(wallet.to_string()).or_default())
	}
}

#[async_trait::async_trait]
impl MessageSink for FileMessageRepository {
	async fn contains(&self, wallet: &str, transaction_id: &str) -> Result<bool, StoreError> {
		let mut wallets = self.wallets.lock().await;
		let messages = self.loaded(&mut wallets, wallet).await?;
		Ok(messages.iter().any(|m| m.transaction_id == transaction_id))
	}

	async fn store(&self, wallet: &str, message: Message) -> Result<bool, StoreError> {
		let mut wallets = self.wallets.lock().await;
		let messages = self.loaded(&mut wallets, wallet).await?;
		if messages
			.iter()
			.any(|m| m.transaction_id == message.transaction_id)
		{
			return Ok(false);
		}
		messages.push(message);
		write_json(&self.path(wallet), messages).await?;
		Ok(true)
	}

	async fn messages(&self, wallet: &str) -> Result<Vec<Message>, StoreError> {
		let mut wallets = self.wallets.lock().await;
		Ok(self.loaded(&mut wallets, wallet).await?.clone())
	}
}

/// Persists a wallet's conversations between sessions
pub struct FileConversationRepository {
	data_dir: PathBuf,
}

impl FileConversationRepository {
	pub fn new(data_dir: PathBuf) -> Self {
		Self { data_dir }
	}

	fn path(&self, wallet: &str) -> PathBuf {
		self.data_dir
			.join(format!("conversations_{}.json", file_stem(wallet)))
	}

	pub async fn save(&self, wallet: &str, snapshot: &ConversationSnapshot) -> Result<(), StoreError> {
		write_json(&self.path(wallet), snapshot).await?;
		info!(
			"Saved {} conversations for {}",
			snapshot.conversations.len(),
			wallet
		);
		Ok(())
	}

	pub async fn load(&self, wallet: &str) -> Result<Option<ConversationSnapshot>, StoreError> {
		read_json(&self.path(wallet)).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::messaging::store::tests::message;
	use crate::messaging::{
		Conversation, ConversationStatus, DecryptionCache, MemoryCacheStore,
	};
	use std::sync::Arc;

	fn scratch_dir() -> PathBuf {
		std::env::temp_dir().join(format!(
			"ciph-msg-test-{}",
			hex::encode(rand::random::<[u8; 8]>())
		))
	}

	#[test]
	fn addresses_become_safe_file_stems() {
		assert_eq!(file_stem("kaspa:qq1-x_y"), "kaspa_qq1-x_y");
		assert_eq!(file_stem("../etc"), "___etc");
	}

	#[tokio::test]
	async fn messages_survive_a_new_repository() {
		let dir = scratch_dir();
		let repository = FileMessageRepository::new(dir.clone());
		assert!(repository.store("kaspa:me", message("tx1", "a", "b", "hi")).await.unwrap());
		assert!(!repository.store("kaspa:me", message("tx1", "a", "b", "again")).await.unwrap());
		assert!(repository.store("kaspa:me", message("tx2", "b", "a", "yo")).await.unwrap());

		let reopened = FileMessageRepository::new(dir.clone());
		assert!(reopened.contains("kaspa:me", "tx1").await.unwrap());
		assert!(!reopened.contains("kaspa:other", "tx1").await.unwrap());
		let messages = reopened.conversation_messages("kaspa:me", "a").await.unwrap();
		assert_eq!(messages.len(), 2);
		assert_eq!(messages[0].decrypted_content, "hi");

		tokio::fs::remove_dir_all(dir).await.unwrap();
	}

	#[tokio::test]
	async fn decryption_cache_persists_through_files() {
		let dir = scratch_dir();
		let store = Arc::new(FileCacheStore::new(dir.clone()));
		let mut cache = DecryptionCache::new(store.clone());
		cache.mark_failed("kaspa:me", "tx9").await.unwrap();

		let mut reloaded = DecryptionCache::new(store);
		assert!(reloaded.has_failed("kaspa:me", "tx9").await);
		assert_eq!(reloaded.failed_count("kaspa:other").await, 0);

		// same document shape as the in-memory store
		let memory = Arc::new(MemoryCacheStore::new());
		let raw = FileCacheStore::new(dir.clone())
			.get("decryption_cache_kaspa:me")
			.await
			.unwrap()
			.unwrap();
		memory.set("decryption_cache_kaspa:me", &raw).await.unwrap();
		assert!(DecryptionCache::new(memory).has_failed("kaspa:me", "tx9").await);

		tokio::fs::remove_dir_all(dir).await.unwrap();
	}

	#[tokio::test]
	async fn conversations_round_trip() {
		let dir = scratch_dir();
		let repository = FileConversationRepository::new(dir.clone());
		assert!(repository.load("kaspa:me").await.unwrap().is_none());

		let snapshot = ConversationSnapshot {
			conversations: vec![Conversation {
				conversation_id: "c1".to_string(),
				counterparty_address: "kaspa:bob".to_string(),
				my_alias: "a1a1a1a1a1a1".to_string(),
				their_alias: None,
				status: ConversationStatus::Pending,
				initiated_by_me: true,
				created_at_ms: 1,
				last_activity_ms: 2,
			}],
		};
		repository.save("kaspa:me", &snapshot).await.unwrap();

		let loaded = repository.load("kaspa:me").await.unwrap().unwrap();
		assert_eq!(loaded.conversations, snapshot.conversations);

		tokio::fs::remove_dir_all(dir).await.unwrap();
	}
}
