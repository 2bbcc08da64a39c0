use crate::crypto::{Cipher, KeyKind, KeySource};
use crate::messaging::decryption_cache::DecryptionCache;
use crate::messaging::types::UNDECRYPTABLE_CONTENT;
use std::sync::Arc;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
pub struct DecryptionConfig {
	/// Number of receive and change indices tried per branch.
	pub max_keys: u32,
}

impl Default for DecryptionConfig {
	fn default() -> Self {
		Self { max_keys: 20 }
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptionOutcome {
	Decrypted {
		plaintext: String,
		kind: KeyKind,
		index: u32,
	},
	Undecryptable,
}

impl DecryptionOutcome {
	pub fn plaintext(&self) -> Option<&str> {
		match self {
			Self::Decrypted { plaintext, .. } => Some(plaintext),
			Self::Undecryptable => None,
		}
	}

	/// Plaintext, or the sentinel stored for undecryptable messages.
	pub fn content(&self) -> &str {
		self.plaintext().unwrap_or(UNDECRYPTABLE_CONTENT)
	}
}

/// Tries every candidate wallet key against a ciphertext, remembering permanent failures.
pub struct DecryptionEngine {
	cipher: Arc<dyn Cipher>,
	keys: Arc<dyn KeySource>,
	cache: DecryptionCache,
	config: DecryptionConfig,
}

impl DecryptionEngine {
	pub fn new(
		cipher: Arc<dyn Cipher>,
		keys: Arc<dyn KeySource>,
		cache: DecryptionCache,
		config: DecryptionConfig,
	) -> Self {
		Self {
			cipher,
			keys,
			cache,
			config,
		}
	}

	pub fn config(&self) -> &DecryptionConfig {
		&self.config
	}

	pub fn cache_mut(&mut self) -> &mut DecryptionCache {
		&mut self.cache
	}

	/// Receive keys `0..max_keys` first, then change keys `0..max_keys`. Stops at the first
	/// key that decrypts. Indices the key source cannot provide are skipped.
	pub fn try_keys(&self, ciphertext_hex: &str) -> Option<(String, KeyKind, u32)> {
		for kind in [KeyKind::Receive, KeyKind::Change] {
			for index in 0..self.config.max_keys {
				let Some(key) = self.keys.private_key(kind, index) else {
					continue;
				};
				match self.cipher.decrypt(ciphertext_hex, key.as_bytes()) {
					Ok(plaintext) => return Some((plaintext, kind, index)),
					Err(e) => trace!("{:?} key {} failed: {}", kind, index, e),
				}
			}
		}
		None
	}

	/// Decrypts a transaction's ciphertext for `wallet`. Transactions already known to be
	/// undecryptable are not retried.
	pub async fn decrypt(
		&mut self,
		wallet: &str,
		tx_id: &str,
		ciphertext_hex: &str,
	) -> DecryptionOutcome {
		if self.cache.has_failed(wallet, tx_id).await {
			debug!("Skipping {}: cached as undecryptable", tx_id);
			return DecryptionOutcome::Undecryptable;
		}
		self.attempt(wallet, tx_id, ciphertext_hex).await
	}

	/// Like [`decrypt`](Self::decrypt) but ignores a cached failure, e.g. after more keys
	/// became available. A success clears the cached failure.
	pub async fn redecrypt(
		&mut self,
		wallet: &str,
		tx_id: &str,
		ciphertext_hex: &str,
	) -> DecryptionOutcome {
		self.attempt(wallet, tx_id, ciphertext_hex).await
	}

	async fn attempt(&mut self, wallet: &str, tx_id: &str, ciphertext_hex: &str) -> DecryptionOutcome {
		match self.try_keys(ciphertext_hex) {
			Some((plaintext, kind, index)) => {
				debug!("Decrypted {} with {:?} key {}", tx_id, kind, index);
				if let Err(e) = self.cache.mark_success(wallet, tx_id).await {
					warn!("Failed to update decryption cache for {}: {}", tx_id, e);
				}
				DecryptionOutcome::Decrypted {
					plaintext,
					kind,
					index,
				}
			}
			None => {
				debug!(
					"No key among {} receive/change indices decrypts {}",
					self.config.max_keys, tx_id
				);
				if let Err(e) = self.cache.mark_failed(wallet, tx_id).await {
					warn!("Failed to update decryption cache for {}: {}", tx_id, e);
				}
				DecryptionOutcome::Undecryptable
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::crypto::{Address, CipherError, PrivateKey, StaticKeySource};
	use crate::messaging::decryption_cache::MemoryCacheStore;
	use parking_lot::Mutex;

	const WALLET: &str = "kaspatest:wallet";

	/// Decrypts only with `accepted`, recording every key it is handed.
	struct RecordingCipher {
		accepted: Option<[u8; 32]>,
		attempts: Mutex<Vec<u8>>,
	}

	impl RecordingCipher {
		fn new(accepted: Option<[u8; 32]>) -> Self {
			Self {
				accepted,
				attempts: Mutex::new(Vec::new()),
			}
		}
	}

	impl Cipher for RecordingCipher {
		fn encrypt(&self, _recipient: &Address, plaintext: &str) -> Result<String, CipherError> {
			Ok(hex::encode(plaintext))
		}

		fn decrypt(&self, _ciphertext_hex: &str, private_key: &[u8]) -> Result<String, CipherError> {
			self.attempts.lock().push(private_key[0]);
			match self.accepted {
				Some(accepted) if accepted.as_slice() == private_key => Ok("hello".to_string()),
				_ => Err(CipherError::Decryption),
			}
		}
	}

	fn key_source() -> StaticKeySource {
		// Receive keys are filled with their index, change keys with 100 + index.
		let receive = (0..20u8).map(|i| PrivateKey::from_bytes([i; 32])).collect();
		let change = (0..20u8).map(|i| PrivateKey::from_bytes([100 + i; 32])).collect();
		StaticKeySource::new(receive, change)
	}

	fn engine(cipher: Arc<RecordingCipher>) -> DecryptionEngine {
		let cache = DecryptionCache::new(Arc::new(MemoryCacheStore::new()));
		DecryptionEngine::new(
			cipher,
			Arc::new(key_source()),
			cache,
			DecryptionConfig::default(),
		)
	}

	#[tokio::test]
	async fn stops_at_first_matching_receive_key() {
		let cipher = Arc::new(RecordingCipher::new(Some([3; 32])));
		let mut engine = engine(cipher.clone());

		let outcome = engine.decrypt(WALLET, "tx1", "00").await;
		assert_eq!(
			outcome,
			DecryptionOutcome::Decrypted {
				plaintext: "hello".to_string(),
				kind: KeyKind::Receive,
				index: 3,
			}
		);
		assert_eq!(*cipher.attempts.lock(), vec![0, 1, 2, 3]);
	}

	#[tokio::test]
	async fn change_keys_follow_all_receive_keys() {
		let cipher = Arc::new(RecordingCipher::new(Some([101; 32])));
		let mut engine = engine(cipher.clone());

		let outcome = engine.decrypt(WALLET, "tx1", "00").await;
		assert!(matches!(
			outcome,
			DecryptionOutcome::Decrypted {
				kind: KeyKind::Change,
				index: 1,
				..
			}
		));
		let attempts = cipher.attempts.lock();
		assert_eq!(attempts.len(), 22);
		assert_eq!(&attempts[..20], (0..20u8).collect::<Vec<_>>().as_slice());
	}

	#[tokio::test]
	async fn exhaustion_is_cached_and_not_retried() {
		let cipher = Arc::new(RecordingCipher::new(None));
		let mut engine = engine(cipher.clone());

		let outcome = engine.decrypt(WALLET, "tx1", "00").await;
		assert_eq!(outcome, DecryptionOutcome::Undecryptable);
		assert_eq!(outcome.content(), UNDECRYPTABLE_CONTENT);
		assert_eq!(cipher.attempts.lock().len(), 40);

		let again = engine.decrypt(WALLET, "tx1", "00").await;
		assert_eq!(again, DecryptionOutcome::Undecryptable);
		assert_eq!(cipher.attempts.lock().len(), 40);
		assert!(engine.cache_mut().has_failed(WALLET, "tx1").await);
	}

	#[tokio::test]
	async fn successful_redecrypt_clears_cached_failure() {
		let cipher = Arc::new(RecordingCipher::new(Some([0; 32])));
		let mut engine = engine(cipher);
		engine.cache_mut().mark_failed(WALLET, "tx1").await.unwrap();

		assert_eq!(
			engine.decrypt(WALLET, "tx1", "00").await,
			DecryptionOutcome::Undecryptable
		);
		let outcome = engine.redecrypt(WALLET, "tx1", "00").await;
		assert_eq!(outcome.plaintext(), Some("hello"));
		assert!(!engine.cache_mut().has_failed(WALLET, "tx1").await);
	}
}
