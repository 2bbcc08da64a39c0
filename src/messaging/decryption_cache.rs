//! Permanent record of transactions that no wallet key could decrypt.
//!
//! A transaction's ciphertext never changes, so once every candidate key has failed there is
//! no point in trying again. Entries are scoped per wallet address, never expire, and are
//! removed only when a later attempt succeeds.

use crate::messaging::store::StoreError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Document version; documents with any other version are discarded on load.
pub const CACHE_VERSION: u32 = 1;

/// Key-value persistence consumed by the cache.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
	async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
	async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Process-local [`CacheStore`].
#[derive(Default)]
pub struct MemoryCacheStore {
	entries: Mutex<HashMap<String, String>>,
}

impl MemoryCacheStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait::async_trait]
impl CacheStore for MemoryCacheStore {
	async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.entries.lock().get(key).cloned())
	}

	async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
		self.entries.lock().insert(key.to_string(), value.to_string());
		Ok(())
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
	pub tx_id: String,
	/// Unix milliseconds of the failed attempt.
	pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
	entries: Vec<CacheEntry>,
	version: u32,
}

/// Failed-decryption set, loaded lazily per wallet and written through on every change.
pub struct DecryptionCache {
	store: Arc<dyn CacheStore>,
	wallets: HashMap<String, HashMap<String, i64>>,
}

impl DecryptionCache {
	pub fn new(store: Arc<dyn CacheStore>) -> Self {
		Self {
			store,
			wallets: HashMap::new(),
		}
	}

	fn storage_key(wallet: &str) -> String {
		format!("decryption_cache_{}", wallet)
	}

	async fn ensure_loaded(&mut self, wallet: &str) {
		if self.wallets.contains_key(wallet) {
			return;
		}

		let entries = match self.store.get(&Self::storage_key(wallet)).await {
			Ok(Some(raw)) => match serde_json::from_str::<CacheDocument>(&raw) {
				Ok(doc) if doc.version == CACHE_VERSION => doc
					.entries
					.into_iter()
					.map(|entry| (entry.tx_id, entry.timestamp))
					.collect(),
				Ok(doc) => {
					warn!(
						"Discarding decryption cache for {} with version {} (expected {})",
						wallet, doc.version, CACHE_VERSION
					);
					HashMap::new()
				}
				Err(e) => {
					warn!("Discarding unreadable decryption cache for {}: {}", wallet, e);
					HashMap::new()
				}
			},
			Ok(None) => HashMap::new(),
			Err(e) => {
				warn!("Failed to load decryption cache for {}: {}", wallet, e);
				HashMap::new()
			}
		};

		debug!("Loaded {} failed decryptions for {}", entries.len(), wallet);
		self.wallets.insert(wallet.to_string(), entries);
	}

	async fn persist(&self, wallet: &str) -> Result<(), StoreError> {
		let mut entries: Vec<CacheEntry> = self
			.wallets
			.get(wallet)
			.map(|entries| {
				entries
					.iter()
					.map(|(tx_id, timestamp)| CacheEntry {
						tx_id: tx_id.clone(),
						timestamp: *timestamp,
					})
					.collect()
			})
			.unwrap_or_default();
		entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.tx_id.cmp(&b.tx_id)));

		let doc = CacheDocument {
			entries,
			version: CACHE_VERSION,
		};
		self.store
			.set(&Self::storage_key(wallet), &serde_json::to_string(&doc)?)
			.await
	}

	pub async fn has_failed(&mut self, wallet: &str, tx_id: &str) -> bool {
		self.ensure_loaded(wallet).await;
		self.wallets
			.get(wallet)
			.is_some_and(|entries| entries.contains_key(tx_id))
	}

	pub async fn mark_failed(&mut self, wallet: &str, tx_id: &str) -> Result<(), StoreError> {
		self.ensure_loaded(wallet).await;
		let entries = self.wallets.entry(wallet.to_string()).or_default();
		if entries.contains_key(tx_id) {
			return Ok(());
		}
		entries.insert(tx_id.to_string(), crate::utils::now_millis());
		self.persist(wallet).await
	}

	/// Clears a failure record. Without a prior failure this is a no-op and nothing is written.
	pub async fn mark_success(&mut self, wallet: &str, tx_id: &str) -> Result<(), StoreError> {
		self.ensure_loaded(wallet).await;
		let removed = self
			.wallets
			.get_mut(wallet)
			.is_some_and(|entries| entries.remove(tx_id).is_some());
		if !removed {
			return Ok(());
		}
		debug!("Cleared cached decryption failure for {}", tx_id);
		self.persist(wallet).await
	}

	pub async fn failed_count(&mut self, wallet: &str) -> usize {
		self.ensure_loaded(wallet).await;
		self.wallets.get(wallet).map_or(0, HashMap::len)
	}

	pub async fn clear(&mut self, wallet: &str) -> Result<(), StoreError> {
		self.wallets.insert(wallet.to_string(), HashMap::new());
		self.persist(wallet).await
	}
}
