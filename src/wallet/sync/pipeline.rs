//! Single ingestion path shared by the live block feed and the historical backfill.
//!
//! Every transaction goes through the same steps: payload prefix filter, processed-set and
//! storage dedup, payload decode, sender attribution, decryption, routing, storage and
//! finally a [`IngestionEvent::MessageReceived`]. Running both feeds over the same
//! transactions stores each message once.

use crate::messaging::{
	ConversationManager, DecryptionEngine, HandshakeOutcome, Message, MessageSink,
};
use crate::node::RpcBlock;
use crate::protocol::{
	DecodedPayload, FileAttachment, HandshakeEnvelope, MessageType, PaymentEnvelope,
	decode_payload,
};
use crate::wallet::WalletSyncError;
use crate::wallet::sync::events::{EventDispatcher, IngestionEvent};
use crate::wallet::sync::progress_tracker::{IngestionStats, ProcessedSet};
use crate::wallet::sync::transaction_processor::{
	CanonicalTransaction, SourceTransaction, TransactionProcessor,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct BlockIngestionPipeline {
	/// Primary receive address; messages are stored under it.
	wallet: String,
	processor: TransactionProcessor,
	decryption: DecryptionEngine,
	conversations: Arc<Mutex<ConversationManager>>,
	sink: Arc<dyn MessageSink>,
	dispatcher: EventDispatcher,
	processed: ProcessedSet,
	stats: IngestionStats,
}

impl BlockIngestionPipeline {
	pub fn new(
		wallet: String,
		processor: TransactionProcessor,
		decryption: DecryptionEngine,
		conversations: Arc<Mutex<ConversationManager>>,
		sink: Arc<dyn MessageSink>,
		dispatcher: EventDispatcher,
	) -> Self {
		Self {
			wallet,
			processor,
			decryption,
			conversations,
			sink,
			dispatcher,
			processed: ProcessedSet::default(),
			stats: IngestionStats::default(),
		}
	}

	pub fn wallet(&self) -> &str {
		&self.wallet
	}

	pub fn stats(&self) -> &IngestionStats {
		&self.stats
	}

	/// Returns the counters gathered so far and starts over.
	pub fn take_stats(&mut self) -> IngestionStats {
		std::mem::take(&mut self.stats)
	}

	pub fn dispatcher_mut(&mut self) -> &mut EventDispatcher {
		&mut self.dispatcher
	}

	pub fn decryption_mut(&mut self) -> &mut DecryptionEngine {
		&mut self.decryption
	}

	/// Runs every transaction of a block in order. Failures are reported as recoverable
	/// [`IngestionEvent::SyncError`]s and do not stop the rest of the block.
	pub async fn process_block(&mut self, block: RpcBlock) -> usize {
		let block_time = block.header.timestamp;
		let mut stored = 0;
		for transaction in block.transactions {
			let source = SourceTransaction::Live {
				transaction,
				block_time,
			};
			match self.process(source).await {
				Ok(Some(_)) => stored += 1,
				Ok(None) => {}
				Err(e) => {
					warn!("Failed to ingest transaction from block {}: {}", block.header.hash, e);
					self.dispatcher
						.dispatch(&IngestionEvent::SyncError {
							error: e.to_string(),
							recoverable: true,
						})
						.await;
				}
			}
		}
		stored
	}

	/// Ingests one transaction. Returns the stored message, or `None` when the transaction
	/// was filtered, already known, or not relevant to this wallet.
	pub async fn process(
		&mut self,
		source: SourceTransaction,
	) -> Result<Option<Message>, WalletSyncError> {
		if !source.is_protocol() {
			return Ok(None);
		}
		self.stats.scanned += 1;
		let Some(tx) = source.into_canonical() else {
			self.stats.skipped += 1;
			return Ok(None);
		};

		if self.processed.contains(&tx.transaction_id) {
			debug!("Skipping {}: already processed", tx.transaction_id);
			self.stats.skipped += 1;
			return Ok(None);
		}
		if self.sink.contains(&self.wallet, &tx.transaction_id).await? {
			debug!("Skipping {}: already stored", tx.transaction_id);
			self.skip(&tx);
			return Ok(None);
		}

		let payload = match decode_payload(&tx.payload_hex) {
			Ok(payload) => payload,
			Err(e) => {
				debug!("Ignoring malformed payload in {}: {}", tx.transaction_id, e);
				self.skip(&tx);
				return Ok(None);
			}
		};

		let message = match payload.message_type {
			MessageType::Handshake => self.route_handshake(&tx, &payload).await?,
			MessageType::Comm => self.route_comm(&tx, &payload).await?,
			MessageType::Payment => self.route_payment(&tx, &payload).await?,
		};
		let Some(message) = message else {
			return Ok(None);
		};

		// Marked processed only once stored, so a failed write is retried by the next copy.
		if !self.sink.store(&self.wallet, message.clone()).await? {
			self.skip(&tx);
			return Ok(None);
		}
		self.processed.insert(&tx.transaction_id);
		if message.is_undecryptable() {
			self.stats.undecryptable += 1;
		}
		self.stats.stored += 1;

		let counterparty = if message.sender_address == self.wallet {
			&message.recipient_address
		} else {
			&message.sender_address
		};
		self.conversations
			.lock()
			.touch(counterparty, message.timestamp_ms);

		self.dispatcher
			.dispatch(&IngestionEvent::MessageReceived {
				wallet: self.wallet.clone(),
				message: message.clone(),
			})
			.await;
		self.stats.log_progress(false);
		Ok(Some(message))
	}

	fn skip(&mut self, tx: &CanonicalTransaction) {
		self.processed.insert(&tx.transaction_id);
		self.stats.skipped += 1;
	}

	/// Sender of `tx`, or `None` (counted as skipped) when it cannot be attributed. Such
	/// transactions stay out of the processed set so the other feed may try again.
	async fn sender_of(&mut self, tx: &CanonicalTransaction) -> Result<Option<String>, WalletSyncError> {
		let sender = self.processor.resolve_sender(tx).await?;
		if sender.is_none() {
			debug!("Skipping {}: sender unknown", tx.transaction_id);
			self.stats.skipped += 1;
		}
		Ok(sender)
	}

	/// Handshakes are always decrypted since they are what creates monitored state.
	async fn route_handshake(
		&mut self,
		tx: &CanonicalTransaction,
		payload: &DecodedPayload,
	) -> Result<Option<Message>, WalletSyncError> {
		let Some(sender) = self.sender_of(tx).await? else {
			return Ok(None);
		};
		let recipient = tx.recipient_address.clone().unwrap_or_default();

		let outcome = self
			.decryption
			.decrypt(&self.wallet, &tx.transaction_id, &payload.ciphertext_hex)
			.await;
		let envelope = outcome.plaintext().and_then(HandshakeEnvelope::from_json);

		if let Some(envelope) = &envelope {
			let result = self
				.conversations
				.lock()
				.process_handshake(&sender, &recipient, envelope);
			match result {
				Ok(HandshakeOutcome::Created(conversation)) => {
					self.stats.handshakes += 1;
					self.dispatcher
						.dispatch(&IngestionEvent::ConversationRequested(conversation))
						.await;
				}
				Ok(HandshakeOutcome::Activated(conversation)) => {
					self.stats.handshakes += 1;
					self.dispatcher
						.dispatch(&IngestionEvent::ConversationActivated(conversation))
						.await;
				}
				Ok(HandshakeOutcome::Ignored) => {}
				Err(e) => warn!("Rejected handshake {}: {}", tx.transaction_id, e),
			}
		}

		let relevant = envelope.is_some() || sender == self.wallet || recipient == self.wallet;
		if !relevant {
			self.skip(tx);
			return Ok(None);
		}
		Ok(Some(build_message(
			tx,
			MessageType::Handshake,
			sender,
			recipient,
			outcome.content().to_string(),
			None,
		)))
	}

	/// Comm messages are kept only when their alias belongs to a monitored conversation.
	/// The alias is checked before any network lookup or key trial.
	async fn route_comm(
		&mut self,
		tx: &CanonicalTransaction,
		payload: &DecodedPayload,
	) -> Result<Option<Message>, WalletSyncError> {
		let alias = payload.context.as_deref().unwrap_or_default();
		let counterparty = self
			.conversations
			.lock()
			.monitored()
			.address_for_alias(alias)
			.map(str::to_string);
		let Some(counterparty) = counterparty else {
			debug!("Skipping {}: alias {} not monitored", tx.transaction_id, alias);
			self.skip(tx);
			return Ok(None);
		};
		let Some(sender) = self.sender_of(tx).await? else {
			return Ok(None);
		};

		// A payload-only message pays change back to its sender, so the first output does
		// not name the recipient. The alias does.
		let recipient = if sender == self.wallet {
			counterparty
		} else {
			self.wallet.clone()
		};

		let outcome = self
			.decryption
			.decrypt(&self.wallet, &tx.transaction_id, &payload.ciphertext_hex)
			.await;
		let file_data = outcome.plaintext().and_then(FileAttachment::from_json);
		Ok(Some(build_message(
			tx,
			MessageType::Comm,
			sender,
			recipient,
			outcome.content().to_string(),
			file_data,
		)))
	}

	/// Payments are kept when they involve this wallet or a monitored counterparty.
	async fn route_payment(
		&mut self,
		tx: &CanonicalTransaction,
		payload: &DecodedPayload,
	) -> Result<Option<Message>, WalletSyncError> {
		let Some(sender) = self.sender_of(tx).await? else {
			return Ok(None);
		};
		let recipient = tx.recipient_address.clone().unwrap_or_default();

		let relevant = sender == self.wallet || recipient == self.wallet || {
			let conversations = self.conversations.lock();
			conversations.monitored().contains_address(&sender)
				|| conversations.monitored().contains_address(&recipient)
		};
		if !relevant {
			debug!("Skipping payment {}: not for this wallet", tx.transaction_id);
			self.skip(tx);
			return Ok(None);
		}

		let outcome = self
			.decryption
			.decrypt(&self.wallet, &tx.transaction_id, &payload.ciphertext_hex)
			.await;
		let content = match outcome.plaintext() {
			Some(plaintext) => PaymentEnvelope::from_json(plaintext)
				.map(|envelope| envelope.message)
				.unwrap_or_else(|| plaintext.to_string()),
			None => outcome.content().to_string(),
		};
		Ok(Some(build_message(
			tx,
			MessageType::Payment,
			sender,
			recipient,
			content,
			None,
		)))
	}
}

fn build_message(
	tx: &CanonicalTransaction,
	message_type: MessageType,
	sender_address: String,
	recipient_address: String,
	decrypted_content: String,
	file_data: Option<FileAttachment>,
) -> Message {
	Message {
		transaction_id: tx.transaction_id.clone(),
		sender_address,
		recipient_address,
		timestamp_ms: tx.timestamp_ms,
		payload_hex: tx.payload_hex.clone(),
		message_type,
		decrypted_content,
		amount_sompi: tx.amount,
		fee_sompi: None,
		file_data,
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use crate::crypto::{Address, Cipher, CipherError, PrivateKey, StaticKeySource};
	use crate::messaging::{
		Conversation, ConversationSnapshot, ConversationStatus, DecryptionCache, DecryptionConfig,
		MemoryCacheStore, MemoryMessageStore, StoreError, UNDECRYPTABLE_CONTENT,
	};
	use crate::node::RpcBlockHeader;
	use crate::protocol::{PROTOCOL_VERSION, encode_payload};
	use crate::wallet::sync::events::ChannelEventHandler;
	use crate::wallet::sync::transaction_processor::tests::{
		FAST, FakeExplorer, full_tx, funding_tx, rpc_tx,
	};
	use tokio::sync::mpsc::UnboundedReceiver;

	pub(crate) const ME: &str = "kaspa:me";
	pub(crate) const BOB: &str = "kaspa:bob";
	pub(crate) const MY_KEY: u8 = 7;
	const STRANGER_KEY: u8 = 9;

	/// Ciphertext is `hex(tag | plaintext)`; only a key whose bytes equal `tag` opens it.
	pub(crate) struct TaggedCipher;

	impl Cipher for TaggedCipher {
		fn encrypt(&self, _recipient: &Address, plaintext: &str) -> Result<String, CipherError> {
			Ok(seal(MY_KEY, plaintext))
		}

		fn decrypt(&self, ciphertext_hex: &str, private_key: &[u8]) -> Result<String, CipherError> {
			let bytes = hex::decode(ciphertext_hex).map_err(|_| CipherError::InvalidHex)?;
			let (tag, body) = bytes.split_first().ok_or(CipherError::Truncated)?;
			if private_key.first() != Some(tag) {
				return Err(CipherError::Decryption);
			}
			String::from_utf8(body.to_vec()).map_err(|_| CipherError::InvalidUtf8)
		}
	}

	pub(crate) fn seal(tag: u8, plaintext: &str) -> String {
		let mut bytes = vec![tag];
		bytes.extend_from_slice(plaintext.as_bytes());
		hex::encode(bytes)
	}

	pub(crate) struct Harness {
		pub(crate) pipeline: BlockIngestionPipeline,
		pub(crate) explorer: Arc<FakeExplorer>,
		pub(crate) sink: Arc<MemoryMessageStore>,
		pub(crate) conversations: Arc<Mutex<ConversationManager>>,
		pub(crate) events: UnboundedReceiver<IngestionEvent>,
	}

	fn pipeline_over(
		explorer: Arc<FakeExplorer>,
		sink: Arc<dyn MessageSink>,
	) -> (
		BlockIngestionPipeline,
		Arc<Mutex<ConversationManager>>,
		UnboundedReceiver<IngestionEvent>,
	) {
		let keys = Arc::new(StaticKeySource::single(PrivateKey::from_bytes([MY_KEY; 32])));
		let decryption = DecryptionEngine::new(
			Arc::new(TaggedCipher),
			keys,
			DecryptionCache::new(Arc::new(MemoryCacheStore::new())),
			DecryptionConfig::default(),
		);
		let conversations = Arc::new(Mutex::new(ConversationManager::new(ME)));
		let (channel, events) = ChannelEventHandler::channel();
		let mut dispatcher = EventDispatcher::new();
		dispatcher.register_handler(Box::new(channel));

		let pipeline = BlockIngestionPipeline::new(
			ME.to_string(),
			TransactionProcessor::new(explorer).with_retry_policy(FAST),
			decryption,
			conversations.clone(),
			sink,
			dispatcher,
		);
		(pipeline, conversations, events)
	}

	pub(crate) fn harness_with(
		explorer: Arc<FakeExplorer>,
		sink: Arc<MemoryMessageStore>,
	) -> Harness {
		let (pipeline, conversations, events) = pipeline_over(explorer.clone(), sink.clone());
		Harness {
			pipeline,
			explorer,
			sink,
			conversations,
			events,
		}
	}

	pub(crate) fn harness() -> Harness {
		harness_with(
			Arc::new(FakeExplorer::default()),
			Arc::new(MemoryMessageStore::new()),
		)
	}

	pub(crate) fn active_conversation_with_bob(conversations: &Mutex<ConversationManager>) {
		conversations.lock().restore(ConversationSnapshot {
			conversations: vec![Conversation {
				conversation_id: "conv-1".to_string(),
				counterparty_address: BOB.to_string(),
				my_alias: "a1a1a1a1a1a1".to_string(),
				their_alias: Some("b4e3da89b4e3".to_string()),
				status: ConversationStatus::Active,
				initiated_by_me: true,
				created_at_ms: 1,
				last_activity_ms: 1,
			}],
		});
	}

	fn payload(message_type: MessageType, context: Option<&str>, ciphertext: &str) -> String {
		encode_payload(PROTOCOL_VERSION, message_type, context, ciphertext).unwrap()
	}

	#[tokio::test]
	async fn live_and_historical_copies_store_once() {
		let mut h = harness();
		active_conversation_with_bob(&h.conversations);
		h.explorer
			.transactions
			.lock()
			.insert("prev".to_string(), funding_tx("prev", BOB));
		let comm = payload(MessageType::Comm, Some("b4e3da89b4e3"), &seal(MY_KEY, "hello"));

		let block = RpcBlock {
			header: RpcBlockHeader {
				hash: "block".to_string(),
				timestamp: 1_700_000_000_000,
				daa_score: 10,
			},
			transactions: vec![rpc_tx("tx1", "prev", BOB, &comm)],
		};
		assert_eq!(h.pipeline.process_block(block).await, 1);

		let again = h
			.pipeline
			.process(SourceTransaction::Historical(full_tx("tx1", BOB, BOB, &comm, 5)))
			.await
			.unwrap();
		assert!(again.is_none());

		let stored = h.sink.messages(ME).await.unwrap();
		assert_eq!(stored.len(), 1);
		assert_eq!(stored[0].decrypted_content, "hello");
		assert_eq!(stored[0].sender_address, BOB);
		assert_eq!(stored[0].recipient_address, ME);
		assert_eq!(stored[0].timestamp_ms, 1_700_000_000_000);

		assert!(matches!(
			h.events.try_recv(),
			Ok(IngestionEvent::MessageReceived { .. })
		));
		assert!(h.events.try_recv().is_err());
		assert_eq!(h.pipeline.stats().stored, 1);
		assert_eq!(h.pipeline.stats().skipped, 1);
	}

	#[tokio::test]
	async fn stored_message_is_skipped_by_a_fresh_pipeline() {
		let explorer = Arc::new(FakeExplorer::default());
		let sink = Arc::new(MemoryMessageStore::new());
		let comm = payload(MessageType::Comm, Some("b4e3da89b4e3"), &seal(MY_KEY, "hello"));

		let mut first = harness_with(explorer.clone(), sink.clone());
		active_conversation_with_bob(&first.conversations);
		let tx = full_tx("tx1", BOB, BOB, &comm, 5);
		assert!(first
			.pipeline
			.process(SourceTransaction::Historical(tx.clone()))
			.await
			.unwrap()
			.is_some());

		let mut second = harness_with(explorer, sink.clone());
		active_conversation_with_bob(&second.conversations);
		assert!(second
			.pipeline
			.process(SourceTransaction::Historical(tx))
			.await
			.unwrap()
			.is_none());
		assert_eq!(sink.messages(ME).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn comm_for_unknown_alias_needs_no_lookup() {
		let mut h = harness();
		let comm = payload(MessageType::Comm, Some("ffffffffffff"), &seal(MY_KEY, "hi"));

		let result = h
			.pipeline
			.process(SourceTransaction::Live {
				transaction: rpc_tx("tx1", "prev", BOB, &comm),
				block_time: 1,
			})
			.await
			.unwrap();
		assert!(result.is_none());
		assert_eq!(*h.explorer.lookups.lock(), 0);
		assert_eq!(h.pipeline.stats().skipped, 1);
	}

	#[tokio::test]
	async fn unsolicited_handshake_opens_pending_conversation() {
		let mut h = harness();
		let envelope = HandshakeEnvelope::new(
			"c0ffeec0ffee".to_string(),
			"conv-9".to_string(),
			ME.to_string(),
			false,
		);
		let handshake = payload(MessageType::Handshake, None, &seal(MY_KEY, &envelope.to_json()));

		let message = h
			.pipeline
			.process(SourceTransaction::Historical(full_tx("hs1", BOB, ME, &handshake, 10)))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(message.message_type, MessageType::Handshake);

		let conversations = h.conversations.lock();
		let conversation = conversations.by_counterparty(BOB).unwrap();
		assert_eq!(conversation.status, ConversationStatus::Pending);
		assert!(!conversation.initiated_by_me);
		assert_eq!(conversation.their_alias.as_deref(), Some("c0ffeec0ffee"));
		drop(conversations);

		assert!(matches!(
			h.events.try_recv(),
			Ok(IngestionEvent::ConversationRequested(_))
		));
		assert!(matches!(
			h.events.try_recv(),
			Ok(IngestionEvent::MessageReceived { .. })
		));
		assert_eq!(h.pipeline.stats().handshakes, 1);
	}

	#[tokio::test]
	async fn payment_to_wallet_decodes_note() {
		let mut h = harness();
		let note = PaymentEnvelope::new("for lunch".to_string(), 20_000_000, 1).to_json();
		let pay = payload(MessageType::Payment, None, &seal(MY_KEY, &note));

		let message = h
			.pipeline
			.process(SourceTransaction::Historical(full_tx("p1", BOB, ME, &pay, 10)))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(message.decrypted_content, "for lunch");
		assert_eq!(message.amount_sompi, 20_000_000);
	}

	#[tokio::test]
	async fn relevant_undecryptable_payment_is_stored_with_sentinel() {
		let mut h = harness();
		let pay = payload(MessageType::Payment, None, &seal(STRANGER_KEY, "secret"));

		let message = h
			.pipeline
			.process(SourceTransaction::Historical(full_tx("p2", BOB, ME, &pay, 10)))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(message.decrypted_content, UNDECRYPTABLE_CONTENT);
		assert_eq!(h.pipeline.stats().undecryptable, 1);
		assert_eq!(h.pipeline.decryption_mut().cache_mut().failed_count(ME).await, 1);
	}

	#[tokio::test]
	async fn unrelated_payment_is_ignored() {
		let mut h = harness();
		let pay = payload(MessageType::Payment, None, &seal(STRANGER_KEY, "secret"));

		let result = h
			.pipeline
			.process(SourceTransaction::Historical(full_tx(
				"p3",
				"kaspa:carol",
				"kaspa:dave",
				&pay,
				10,
			)))
			.await
			.unwrap();
		assert!(result.is_none());
		assert_eq!(h.pipeline.decryption_mut().cache_mut().failed_count(ME).await, 0);
	}

	#[tokio::test]
	async fn non_protocol_and_malformed_payloads_are_dropped() {
		let mut h = harness();
		let plain = full_tx("t1", BOB, ME, "deadbeef", 1);
		// prefix present, no fields after it
		let malformed = full_tx("t2", BOB, ME, &hex::encode("ciph_msg:1"), 1);

		assert!(h
			.pipeline
			.process(SourceTransaction::Historical(plain))
			.await
			.unwrap()
			.is_none());
		assert!(h
			.pipeline
			.process(SourceTransaction::Historical(malformed))
			.await
			.unwrap()
			.is_none());

		let stats = h.pipeline.take_stats();
		assert_eq!(stats.scanned, 1);
		assert_eq!(stats.skipped, 1);
		assert_eq!(h.pipeline.stats().scanned, 0);
	}

	/// Fails the first `failures` writes, then delegates.
	struct FailingSink {
		failures: Mutex<usize>,
		inner: MemoryMessageStore,
	}

	#[async_trait::async_trait]
	impl MessageSink for FailingSink {
		async fn contains(&self, wallet: &str, transaction_id: &str) -> Result<bool, StoreError> {
			self.inner.contains(wallet, transaction_id).await
		}

		async fn store(&self, wallet: &str, message: Message) -> Result<bool, StoreError> {
			{
				let mut failures = self.failures.lock();
				if *failures > 0 {
					*failures -= 1;
					return Err(StoreError::Io(std::io::Error::other("disk full")));
				}
			}
			self.inner.store(wallet, message).await
		}

		async fn messages(&self, wallet: &str) -> Result<Vec<Message>, StoreError> {
			self.inner.messages(wallet).await
		}
	}

	#[tokio::test]
	async fn failed_store_is_retried_by_the_next_copy() {
		let explorer = Arc::new(FakeExplorer::default());
		explorer
			.transactions
			.lock()
			.insert("prev".to_string(), funding_tx("prev", BOB));
		let sink = Arc::new(FailingSink {
			failures: Mutex::new(1),
			inner: MemoryMessageStore::new(),
		});
		let (mut pipeline, conversations, _events) = pipeline_over(explorer, sink.clone());
		active_conversation_with_bob(&conversations);
		let comm = payload(
			MessageType::Comm,
			Some("b4e3da89b4e3"),
			&seal(STRANGER_KEY, "sealed for someone else"),
		);

		let err = pipeline
			.process(SourceTransaction::Historical(full_tx("tx1", BOB, BOB, &comm, 5)))
			.await
			.unwrap_err();
		assert!(matches!(err, WalletSyncError::StoreError(StoreError::Io(_))));
		assert_eq!(pipeline.stats().stored, 0);
		assert_eq!(pipeline.stats().undecryptable, 0);

		let block = RpcBlock {
			header: RpcBlockHeader {
				hash: "block".to_string(),
				timestamp: 9,
				daa_score: 1,
			},
			transactions: vec![rpc_tx("tx1", "prev", BOB, &comm)],
		};
		assert_eq!(pipeline.process_block(block).await, 1);
		let stored = sink.messages(ME).await.unwrap();
		assert_eq!(stored.len(), 1);
		assert_eq!(stored[0].decrypted_content, UNDECRYPTABLE_CONTENT);
		assert_eq!(pipeline.stats().stored, 1);
		assert_eq!(pipeline.stats().undecryptable, 1);
	}
}
