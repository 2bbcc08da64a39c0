//! Builds, signs and submits the wallet's transactions.
//!
//! Three shapes share one procedure (generate, require exactly one transaction, sign,
//! submit):
//!
//! * payment: an output to the destination plus change back to the wallet;
//! * full balance: the whole mature balance leaves, change is redirected to the destination
//!   and the receiver pays the fees;
//! * self-message: no payment output at all, only the change output carrying the payload.

use crate::crypto::{Address, Cipher, KeyKind, KeySource};
use crate::messaging::{Conversation, ConversationManager};
use crate::node::{TransactionSubmitter, UtxoContext};
use crate::protocol::{
	MessageType, PROTOCOL_VERSION, PayloadError, PaymentEnvelope, encode_payload,
};
use crate::transaction::builder::{PendingKind, TransactionError, TransactionGenerator};
use crate::transaction::fees::PriorityFee;
use crate::transaction::signer::TransactionSigner;
use crate::transaction::types::{FeePolicy, PaymentOutput, PendingTransaction};
use crate::transaction::MIN_HANDSHAKE_AMOUNT;
use crate::utils::now_millis;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// When a message send skips the payment output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelfMessagePolicy {
	/// Only when the destination is the wallet's own receive address.
	DirectOnly,
	/// Also when a conversation with the destination is monitored.
	#[default]
	DirectOrMonitored,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
	pub self_message_policy: SelfMessagePolicy,
	pub priority_fee: PriorityFee,
	/// Amount attached to a message that does turn into a payment.
	pub message_amount: u64,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			self_message_policy: SelfMessagePolicy::default(),
			priority_fee: PriorityFee::None,
			message_amount: MIN_HANDSHAKE_AMOUNT,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendKind {
	Payment,
	/// Subject to self-message detection.
	Message,
	/// Payment without payload.
	Withdrawal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionShape {
	Payment,
	FullBalance,
	SelfMessage,
}

#[derive(Debug, Clone)]
pub struct SendRequest {
	pub destination: Address,
	pub amount: u64,
	/// Hex payload, empty for none.
	pub payload_hex: String,
	pub kind: SendKind,
}

/// Result of a dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeSummary {
	pub shape: TransactionShape,
	pub fee: u64,
	pub mass: u64,
	pub transaction_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransaction {
	pub transaction_id: String,
	pub shape: TransactionShape,
	pub payload_hex: String,
	/// Value delivered to the destination output, zero for self-messages.
	pub amount: u64,
	pub fee: u64,
}

pub struct TransactionEngine {
	receive_address: Address,
	keys: Arc<dyn KeySource>,
	cipher: Arc<dyn Cipher>,
	utxo: Arc<dyn UtxoContext>,
	submitter: Arc<dyn TransactionSubmitter>,
	signer: Arc<dyn TransactionSigner>,
	conversations: Arc<Mutex<ConversationManager>>,
	config: EngineConfig,
}

impl TransactionEngine {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		receive_address: Address,
		keys: Arc<dyn KeySource>,
		cipher: Arc<dyn Cipher>,
		utxo: Arc<dyn UtxoContext>,
		submitter: Arc<dyn TransactionSubmitter>,
		signer: Arc<dyn TransactionSigner>,
		conversations: Arc<Mutex<ConversationManager>>,
		config: EngineConfig,
	) -> Self {
		Self {
			receive_address,
			keys,
			cipher,
			utxo,
			submitter,
			signer,
			conversations,
			config,
		}
	}

	pub fn receive_address(&self) -> &Address {
		&self.receive_address
	}

	pub fn config(&self) -> &EngineConfig {
		&self.config
	}

	pub fn is_self_message(&self, destination: &Address) -> bool {
		if *destination == self.receive_address {
			return true;
		}
		match self.config.self_message_policy {
			SelfMessagePolicy::DirectOnly => false,
			SelfMessagePolicy::DirectOrMonitored => self
				.conversations
				.lock()
				.monitored()
				.contains_address(&destination.to_string()),
		}
	}

	fn shape_for(&self, request: &SendRequest, mature: u64) -> TransactionShape {
		if request.kind == SendKind::Message && self.is_self_message(&request.destination) {
			TransactionShape::SelfMessage
		} else if request.amount == mature {
			TransactionShape::FullBalance
		} else {
			TransactionShape::Payment
		}
	}

	async fn plan(
		&self,
		request: &SendRequest,
	) -> Result<(TransactionShape, Vec<(PendingKind, PendingTransaction)>), TransactionError> {
		if request.kind == SendKind::Withdrawal && !request.payload_hex.is_empty() {
			return Err(TransactionError::ValidationError(
				"withdrawals carry no payload".into(),
			));
		}
		let payload = hex::decode(&request.payload_hex)
			.map_err(|e| PayloadError::InvalidHex(e.to_string()))?;

		let balance = self.utxo.balance().await?;
		let shape = self.shape_for(request, balance.mature);
		if shape != TransactionShape::SelfMessage && request.amount > balance.mature {
			return Err(TransactionError::InsufficientBalance {
				need: request.amount,
				have: balance.mature,
			});
		}
		debug!("Planning {:?} to {}", shape, request.destination);

		let generator = TransactionGenerator::new()
			.with_utxos(self.utxo.mature_utxos().await?)
			.with_payload(payload)
			.with_priority_fee(self.config.priority_fee);
		let generator = match shape {
			TransactionShape::Payment => generator
				.with_output(PaymentOutput {
					address: request.destination.clone(),
					amount: request.amount,
				})
				.with_change_address(self.receive_address.clone()),
			TransactionShape::FullBalance => generator
				.with_output(PaymentOutput {
					address: request.destination.clone(),
					amount: request.amount,
				})
				.with_change_address(request.destination.clone())
				.with_fee_policy(FeePolicy::ReceiverPays),
			TransactionShape::SelfMessage => {
				generator.with_change_address(self.receive_address.clone())
			}
		};
		Ok((shape, generator.generate()?))
	}

	/// Runs the same generation as [`send`](Self::send) without signing or submitting.
	pub async fn estimate_fee(&self, request: &SendRequest) -> Result<FeeSummary, TransactionError> {
		let (shape, generated) = self.plan(request).await?;
		Ok(FeeSummary {
			shape,
			fee: generated.iter().map(|(_, p)| p.fee).sum(),
			mass: generated.iter().map(|(_, p)| p.mass).sum(),
			transaction_count: generated.len(),
		})
	}

	pub async fn send(&self, request: SendRequest) -> Result<SentTransaction, TransactionError> {
		let (shape, generated) = self.plan(&request).await?;
		let pending = match generated.as_slice() {
			[(PendingKind::Final, pending)] => pending,
			_ => {
				warn!(
					"Send to {} needs {} transactions, refusing",
					request.destination,
					generated.len()
				);
				return Err(TransactionError::InsufficientConsolidation(generated.len()));
			}
		};

		let key = self
			.keys
			.private_key(KeyKind::Receive, 0)
			.ok_or_else(|| TransactionError::Signing("receive key unavailable".into()))?;
		let signed = self.signer.sign(pending, &key)?;
		let transaction_id = self.submitter.submit_transaction(&signed).await?;

		if shape == TransactionShape::FullBalance {
			// Change went to the destination; start over from the wallet's own address.
			self.utxo.clear();
			if let Err(e) = self
				.utxo
				.track_addresses(&[self.receive_address.to_string()])
				.await
			{
				warn!("Failed to re-track {}: {}", self.receive_address, e);
			}
		}
		self.utxo.register_outgoing(pending);

		let amount = match shape {
			TransactionShape::SelfMessage => 0,
			TransactionShape::Payment => request.amount,
			TransactionShape::FullBalance => pending
				.transaction
				.outputs
				.first()
				.map_or(0, |output| output.value),
		};
		info!(
			"Sent {:?} transaction {} ({} sompi, fee {})",
			shape, transaction_id, amount, pending.fee
		);
		Ok(SentTransaction {
			transaction_id,
			shape,
			payload_hex: request.payload_hex,
			amount,
			fee: pending.fee,
		})
	}

	/// Plain payment with an optional hex payload.
	pub async fn send_payment(
		&self,
		destination: &Address,
		amount: u64,
		payload_hex: Option<String>,
	) -> Result<SentTransaction, TransactionError> {
		self.send(SendRequest {
			destination: destination.clone(),
			amount,
			payload_hex: payload_hex.unwrap_or_default(),
			kind: SendKind::Payment,
		})
		.await
	}

	pub async fn send_withdrawal(
		&self,
		destination: &Address,
		amount: u64,
	) -> Result<SentTransaction, TransactionError> {
		self.send(SendRequest {
			destination: destination.clone(),
			amount,
			payload_hex: String::new(),
			kind: SendKind::Withdrawal,
		})
		.await
	}

	/// Anchors an encoded payload on chain, as a self-message when the destination qualifies.
	pub async fn send_message(
		&self,
		destination: &Address,
		payload_hex: String,
		amount: u64,
	) -> Result<SentTransaction, TransactionError> {
		self.send(SendRequest {
			destination: destination.clone(),
			amount,
			payload_hex,
			kind: SendKind::Message,
		})
		.await
	}

	/// Opens a conversation. The handshake is an explicit payment of at least
	/// [`MIN_HANDSHAKE_AMOUNT`] so the counterparty finds it in its address history. The
	/// conversation is recorded only once the payment is submitted.
	pub async fn send_handshake(
		&self,
		counterparty: &Address,
		amount: u64,
	) -> Result<(SentTransaction, Conversation), TransactionError> {
		if amount < MIN_HANDSHAKE_AMOUNT {
			return Err(TransactionError::AmountBelowMinimum {
				amount,
				minimum: MIN_HANDSHAKE_AMOUNT,
			});
		}
		let (conversation, envelope) = self
			.conversations
			.lock()
			.prepare_handshake(&counterparty.to_string())?;

		let ciphertext = self.cipher.encrypt(counterparty, &envelope.to_json())?;
		let payload_hex = encode_payload(PROTOCOL_VERSION, MessageType::Handshake, None, &ciphertext)?;
		let sent = self.send_payment(counterparty, amount, Some(payload_hex)).await?;
		self.conversations.lock().record_handshake(conversation.clone());
		Ok((sent, conversation))
	}

	/// Answers a received handshake. The conversation becomes active once the response is
	/// submitted.
	pub async fn send_handshake_response(
		&self,
		conversation_id: &str,
	) -> Result<(SentTransaction, Conversation), TransactionError> {
		let (conversation, envelope) = self
			.conversations
			.lock()
			.prepare_response(conversation_id)?;

		let counterparty: Address = conversation.counterparty_address.parse()?;
		let ciphertext = self.cipher.encrypt(&counterparty, &envelope.to_json())?;
		let payload_hex = encode_payload(PROTOCOL_VERSION, MessageType::Handshake, None, &ciphertext)?;
		let sent = self
			.send_payment(&counterparty, MIN_HANDSHAKE_AMOUNT, Some(payload_hex))
			.await?;
		let activated = self.conversations.lock().confirm_response(conversation_id)?;
		Ok((sent, activated))
	}

	/// Sends `text` within an established conversation, tagged with our alias.
	pub async fn send_comm_message(
		&self,
		counterparty: &Address,
		text: &str,
	) -> Result<SentTransaction, TransactionError> {
		let my_alias = self
			.conversations
			.lock()
			.monitored()
			.alias_for_address(&counterparty.to_string())
			.map(str::to_string)
			.ok_or_else(|| {
				TransactionError::ValidationError(format!("no conversation with {}", counterparty))
			})?;

		let ciphertext = self.cipher.encrypt(counterparty, text)?;
		let payload_hex = encode_payload(
			PROTOCOL_VERSION,
			MessageType::Comm,
			Some(&my_alias),
			&ciphertext,
		)?;
		self.send_message(counterparty, payload_hex, self.config.message_amount)
			.await
	}

	/// Payment carrying an encrypted note.
	pub async fn send_payment_message(
		&self,
		counterparty: &Address,
		amount: u64,
		message: &str,
	) -> Result<SentTransaction, TransactionError> {
		let envelope = PaymentEnvelope::new(message.to_string(), amount, now_millis());
		let ciphertext = self.cipher.encrypt(counterparty, &envelope.to_json())?;
		let payload_hex = encode_payload(PROTOCOL_VERSION, MessageType::Payment, None, &ciphertext)?;
		self.send_payment(counterparty, amount, Some(payload_hex)).await
	}
}
