//! The unlocked wallet and everything bound to it.
//!
//! A [`WalletSession`] owns exactly one transaction engine and one conversation manager per
//! unlock. Ingestion is started from the session, which hands the pipeline the same
//! conversation state and message sink the engine uses. Locking drops all of it.

use crate::crypto::{Address, Cipher, KeySource};
use crate::explorer::ExplorerApi;
use crate::messaging::{
	CacheStore, Conversation, ConversationManager, ConversationSnapshot, DecryptionCache,
	DecryptionConfig, DecryptionEngine, Message, MessageSink,
};
use crate::node::{Balance, TransactionSubmitter, UtxoContext};
use crate::protocol::{FileAttachment, HandshakeEnvelope, MessageType};
use crate::transaction::{
	EngineConfig, SentTransaction, TransactionEngine, TransactionSigner,
};
use crate::utils::{RetryPolicy, now_millis, retry_bounded};
use crate::wallet::sync::{BlockIngestionPipeline, EventDispatcher, TransactionProcessor};
use crate::wallet::{StateError, WalletSyncError};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// Key material of an unlocked wallet.
pub struct UnlockedWallet {
	pub receive_address: Address,
	pub keys: Arc<dyn KeySource>,
}

/// Opens the wallet with its password. Seed storage and key derivation live behind this.
pub trait WalletUnlocker: Send + Sync {
	fn unlock(&self, password: &str) -> Result<UnlockedWallet, StateError>;
}

/// Collaborators that outlive any single unlock.
#[derive(Clone)]
pub struct SessionServices {
	pub cipher: Arc<dyn Cipher>,
	pub utxo: Arc<dyn UtxoContext>,
	pub submitter: Arc<dyn TransactionSubmitter>,
	pub signer: Arc<dyn TransactionSigner>,
	pub sink: Arc<dyn MessageSink>,
	pub engine_config: EngineConfig,
}

struct ActiveWallet {
	receive_address: Address,
	keys: Arc<dyn KeySource>,
	conversations: Arc<Mutex<ConversationManager>>,
	engine: TransactionEngine,
	ingestion_started: bool,
}

pub struct WalletSession {
	services: SessionServices,
	active: Option<ActiveWallet>,
}

impl WalletSession {
	pub fn new(services: SessionServices) -> Self {
		Self {
			services,
			active: None,
		}
	}

	pub fn is_unlocked(&self) -> bool {
		self.active.is_some()
	}

	/// Unlocks the wallet, starts tracking its receive address and restores `snapshot`.
	pub async fn unlock(
		&mut self,
		unlocker: &dyn WalletUnlocker,
		password: Option<&str>,
		snapshot: Option<ConversationSnapshot>,
	) -> Result<Address, WalletSyncError> {
		let password = password
			.filter(|password| !password.is_empty())
			.ok_or(StateError::MissingPassword)?;
		let UnlockedWallet {
			receive_address,
			keys,
		} = unlocker.unlock(password)?;

		let utxo = self.services.utxo.clone();
		let tracked = vec![receive_address.to_string()];
		retry_bounded(RetryPolicy::UTXO_RESUBSCRIBE, "address tracking", || {
			let utxo = utxo.clone();
			let tracked = tracked.clone();
			async move {
				utxo.track_addresses(&tracked)
					.await
					.map_err(backoff::Error::transient)
			}
		})
		.await?;

		let mut manager = ConversationManager::new(receive_address.to_string());
		if let Some(snapshot) = snapshot {
			manager.restore(snapshot);
		}
		let conversations = Arc::new(Mutex::new(manager));

		let engine = TransactionEngine::new(
			receive_address.clone(),
			keys.clone(),
			self.services.cipher.clone(),
			self.services.utxo.clone(),
			self.services.submitter.clone(),
			self.services.signer.clone(),
			conversations.clone(),
			self.services.engine_config.clone(),
		);

		info!("Wallet {} unlocked", receive_address);
		self.active = Some(ActiveWallet {
			receive_address: receive_address.clone(),
			keys,
			conversations,
			engine,
			ingestion_started: false,
		});
		Ok(receive_address)
	}

	/// Drops the engine and the keys. Returns the conversations so they can be persisted.
	pub fn lock(&mut self) -> Option<ConversationSnapshot> {
		let active = self.active.take()?;
		self.services.utxo.clear();
		info!("Wallet {} locked", active.receive_address);
		Some(active.conversations.lock().snapshot())
	}

	fn active(&self) -> Result<&ActiveWallet, StateError> {
		self.active.as_ref().ok_or(StateError::WalletLocked)
	}

	/// Messaging needs the conversation state that ingestion maintains.
	fn started(&self) -> Result<&ActiveWallet, StateError> {
		let active = self.active()?;
		if !active.ingestion_started {
			return Err(StateError::ServiceNotStarted);
		}
		Ok(active)
	}

	pub fn receive_address(&self) -> Result<&Address, StateError> {
		self.active
			.as_ref()
			.map(|active| &active.receive_address)
			.ok_or(StateError::ReceiveAddressUninitialized)
	}

	pub fn engine(&self) -> Result<&TransactionEngine, StateError> {
		Ok(&self.active()?.engine)
	}

	pub fn conversations(&self) -> Result<Arc<Mutex<ConversationManager>>, StateError> {
		Ok(self.active()?.conversations.clone())
	}

	/// Builds the ingestion pipeline for this wallet and marks the service started.
	pub fn start_ingestion(
		&mut self,
		explorer: Arc<dyn ExplorerApi>,
		cache_store: Arc<dyn CacheStore>,
		decryption: DecryptionConfig,
		dispatcher: EventDispatcher,
	) -> Result<BlockIngestionPipeline, StateError> {
		let active = self.active.as_mut().ok_or(StateError::WalletLocked)?;
		let engine = DecryptionEngine::new(
			self.services.cipher.clone(),
			active.keys.clone(),
			DecryptionCache::new(cache_store),
			decryption,
		);
		active.ingestion_started = true;
		Ok(BlockIngestionPipeline::new(
			active.receive_address.to_string(),
			TransactionProcessor::new(explorer),
			engine,
			active.conversations.clone(),
			self.services.sink.clone(),
			dispatcher,
		))
	}

	pub async fn balance(&self) -> Result<Balance, WalletSyncError> {
		self.active()?;
		Ok(self.services.utxo.balance().await?)
	}

	pub async fn messages(&self) -> Result<Vec<Message>, WalletSyncError> {
		let wallet = self.receive_address()?.to_string();
		Ok(self.services.sink.messages(&wallet).await?)
	}

	pub async fn send_message(
		&self,
		counterparty: &Address,
		text: &str,
	) -> Result<SentTransaction, WalletSyncError> {
		let active = self.started()?;
		let sent = active.engine.send_comm_message(counterparty, text).await?;
		self.record_outgoing(active, &sent, counterparty, MessageType::Comm, text)
			.await;
		Ok(sent)
	}

	pub async fn send_payment(
		&self,
		counterparty: &Address,
		amount: u64,
		note: Option<&str>,
	) -> Result<SentTransaction, WalletSyncError> {
		let active = self.active()?;
		match note {
			Some(note) => {
				let sent = active
					.engine
					.send_payment_message(counterparty, amount, note)
					.await?;
				self.record_outgoing(active, &sent, counterparty, MessageType::Payment, note)
					.await;
				Ok(sent)
			}
			None => Ok(active.engine.send_payment(counterparty, amount, None).await?),
		}
	}

	pub async fn withdraw(
		&self,
		destination: &Address,
		amount: u64,
	) -> Result<SentTransaction, WalletSyncError> {
		Ok(self.active()?.engine.send_withdrawal(destination, amount).await?)
	}

	pub async fn start_conversation(
		&self,
		counterparty: &Address,
		amount: u64,
	) -> Result<Conversation, WalletSyncError> {
		let active = self.started()?;
		let (sent, conversation) = active.engine.send_handshake(counterparty, amount).await?;
		let envelope = HandshakeEnvelope::new(
			conversation.my_alias.clone(),
			conversation.conversation_id.clone(),
			counterparty.to_string(),
			false,
		);
		self.record_outgoing(
			active,
			&sent,
			counterparty,
			MessageType::Handshake,
			&envelope.to_json(),
		)
		.await;
		Ok(conversation)
	}

	pub async fn accept_conversation(
		&self,
		conversation_id: &str,
	) -> Result<Conversation, WalletSyncError> {
		let active = self.started()?;
		let (sent, conversation) = active.engine.send_handshake_response(conversation_id).await?;
		let counterparty: Address = conversation
			.counterparty_address
			.parse()
			.map_err(crate::transaction::TransactionError::from)?;
		let envelope = HandshakeEnvelope::new(
			conversation.my_alias.clone(),
			conversation.conversation_id.clone(),
			conversation.counterparty_address.clone(),
			true,
		);
		self.record_outgoing(
			active,
			&sent,
			&counterparty,
			MessageType::Handshake,
			&envelope.to_json(),
		)
		.await;
		Ok(conversation)
	}

	/// Our own ciphertext is sealed for the counterparty, so ingestion could never recover
	/// the plaintext. Stored here instead; ingestion then finds the id and skips it.
	async fn record_outgoing(
		&self,
		active: &ActiveWallet,
		sent: &SentTransaction,
		counterparty: &Address,
		message_type: MessageType,
		content: &str,
	) {
		let wallet = active.receive_address.to_string();
		let message = Message {
			transaction_id: sent.transaction_id.clone(),
			sender_address: wallet.clone(),
			recipient_address: counterparty.to_string(),
			timestamp_ms: now_millis(),
			payload_hex: sent.payload_hex.clone(),
			message_type,
			decrypted_content: content.to_string(),
			amount_sompi: sent.amount,
			fee_sompi: Some(sent.fee),
			file_data: if message_type == MessageType::Comm {
				FileAttachment::from_json(content)
			} else {
				None
			},
		};
		// The transaction is already submitted; a storage failure must not turn it into an error.
		if let Err(e) = self.services.sink.store(&wallet, message).await {
			warn!("Failed to store outgoing message {}: {}", sent.transaction_id, e);
		}
		active
			.conversations
			.lock()
			.touch(&counterparty.to_string(), now_millis());
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::crypto::{PrivateKey, StaticKeySource};
	use crate::messaging::{ConversationStatus, MemoryCacheStore, MemoryMessageStore};
	use crate::transaction::SOMPI_PER_KAS;
	use crate::transaction::builder::tests::{address, utxo};
	use crate::transaction::engine::tests::{
		FakeUtxoContext, HexCipher, RecordingSubmitter, StubSigner,
	};
	use crate::wallet::sync::transaction_processor::tests::FakeExplorer;

	struct PasswordUnlocker;

	impl WalletUnlocker for PasswordUnlocker {
		fn unlock(&self, password: &str) -> Result<UnlockedWallet, StateError> {
			if password != "hunter2" {
				return Err(StateError::UnlockFailed("wrong password".to_string()));
			}
			Ok(UnlockedWallet {
				receive_address: address(1),
				keys: Arc::new(StaticKeySource::single(PrivateKey::from_bytes([7; 32]))),
			})
		}
	}

	struct Fixture {
		session: WalletSession,
		utxo: Arc<FakeUtxoContext>,
		sink: Arc<MemoryMessageStore>,
	}

	fn fixture() -> Fixture {
		let utxo = Arc::new(FakeUtxoContext::default());
		*utxo.utxos.lock() = vec![utxo_entry()];
		let sink = Arc::new(MemoryMessageStore::new());
		let session = WalletSession::new(SessionServices {
			cipher: Arc::new(HexCipher),
			utxo: utxo.clone(),
			submitter: Arc::new(RecordingSubmitter::default()),
			signer: Arc::new(StubSigner),
			sink: sink.clone(),
			engine_config: EngineConfig::default(),
		});
		Fixture {
			session,
			utxo,
			sink,
		}
	}

	fn utxo_entry() -> crate::transaction::types::UtxoEntry {
		utxo(&address(1), 1, 10 * SOMPI_PER_KAS)
	}

	fn start(session: &mut WalletSession) {
		session
			.start_ingestion(
				Arc::new(FakeExplorer::default()),
				Arc::new(MemoryCacheStore::new()),
				DecryptionConfig::default(),
				EventDispatcher::new(),
			)
			.unwrap();
	}

	#[tokio::test]
	async fn locked_session_refuses_everything() {
		let f = fixture();
		assert!(matches!(f.session.engine(), Err(StateError::WalletLocked)));
		assert!(matches!(
			f.session.receive_address(),
			Err(StateError::ReceiveAddressUninitialized)
		));
		assert!(matches!(
			f.session.balance().await,
			Err(WalletSyncError::StateError(StateError::WalletLocked))
		));
	}

	#[tokio::test]
	async fn unlock_requires_a_password() {
		let mut f = fixture();
		for password in [None, Some("")] {
			let result = f.session.unlock(&PasswordUnlocker, password, None).await;
			assert!(matches!(
				result,
				Err(WalletSyncError::StateError(StateError::MissingPassword))
			));
		}
		let result = f.session.unlock(&PasswordUnlocker, Some("nope"), None).await;
		assert!(matches!(
			result,
			Err(WalletSyncError::StateError(StateError::UnlockFailed(_)))
		));
		assert!(!f.session.is_unlocked());
	}

	#[tokio::test]
	async fn unlock_tracks_address_and_lock_clears_it() {
		let mut f = fixture();
		let me = f
			.session
			.unlock(&PasswordUnlocker, Some("hunter2"), None)
			.await
			.unwrap();
		assert_eq!(*f.utxo.tracked.lock(), vec![me.to_string()]);
		assert_eq!(f.session.balance().await.unwrap().mature, 10 * SOMPI_PER_KAS);

		let snapshot = f.session.lock().unwrap();
		assert!(snapshot.conversations.is_empty());
		assert!(f.utxo.tracked.lock().is_empty());
		assert!(f.session.lock().is_none());
	}

	#[tokio::test]
	async fn messaging_needs_started_ingestion() {
		let mut f = fixture();
		f.session
			.unlock(&PasswordUnlocker, Some("hunter2"), None)
			.await
			.unwrap();
		let result = f.session.start_conversation(&address(2), SOMPI_PER_KAS).await;
		assert!(matches!(
			result,
			Err(WalletSyncError::StateError(StateError::ServiceNotStarted))
		));

		// plain payments do not
		assert!(f.session.send_payment(&address(2), SOMPI_PER_KAS, None).await.is_ok());
	}

	#[tokio::test]
	async fn outgoing_messages_are_stored_with_plaintext() {
		let mut f = fixture();
		let me = f
			.session
			.unlock(&PasswordUnlocker, Some("hunter2"), None)
			.await
			.unwrap();
		start(&mut f.session);

		let bob = address(2);
		let conversation = f
			.session
			.start_conversation(&bob, SOMPI_PER_KAS / 2)
			.await
			.unwrap();
		assert_eq!(conversation.status, ConversationStatus::Pending);

		let sent = f.session.send_message(&bob, "hello bob").await.unwrap();
		let stored = f.sink.messages(&me.to_string()).await.unwrap();
		assert_eq!(stored.len(), 2);
		assert_eq!(stored[0].message_type, MessageType::Handshake);
		assert_eq!(stored[1].transaction_id, sent.transaction_id);
		assert_eq!(stored[1].decrypted_content, "hello bob");
		assert_eq!(stored[1].recipient_address, bob.to_string());
		assert_eq!(stored[1].fee_sompi, Some(sent.fee));
		assert_eq!(f.session.messages().await.unwrap().len(), 2);
	}

	#[tokio::test]
	async fn restored_conversations_survive_unlock() {
		let mut f = fixture();
		let bob = address(2);
		let snapshot = ConversationSnapshot {
			conversations: vec![Conversation {
				conversation_id: "c1".to_string(),
				counterparty_address: bob.to_string(),
				my_alias: "a1a1a1a1a1a1".to_string(),
				their_alias: Some("b2b2b2b2b2b2".to_string()),
				status: ConversationStatus::Active,
				initiated_by_me: true,
				created_at_ms: 1,
				last_activity_ms: 1,
			}],
		};
		f.session
			.unlock(&PasswordUnlocker, Some("hunter2"), Some(snapshot))
			.await
			.unwrap();

		let conversations = f.session.conversations().unwrap();
		assert_eq!(
			conversations
				.lock()
				.monitored()
				.address_for_alias("b2b2b2b2b2b2"),
			Some(bob.to_string().as_str())
		);
	}
}
