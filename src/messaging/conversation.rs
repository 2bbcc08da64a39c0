//! Handshake and alias state machine for one wallet session.
//!
//! A conversation starts `Pending` when either side sends a handshake and becomes `Active`
//! once the reciprocal handshake is seen (or sent). Every change rebuilds the monitored
//! alias/address index that the ingestion pipeline uses to route `comm` and `payment`
//! messages.

use crate::messaging::types::{Conversation, ConversationStatus};
use crate::protocol::{HandshakeEnvelope, generate_alias, generate_conversation_id};
use crate::utils::now_millis;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConversationError {
	#[error("Conversation not found: {0}")]
	NotFound(String),

	#[error("Conversation with {0} is already active")]
	AlreadyActive(String),

	#[error("{0} already sent a handshake; respond to it instead")]
	AwaitingResponse(String),

	#[error("Conversation {0} was initiated locally and cannot be answered")]
	NotRespondable(String),

	#[error("Alias {alias} is already used by a conversation with {counterparty}")]
	AliasCollision { alias: String, counterparty: String },
}

/// Derived routing index over Pending and Active conversations.
#[derive(Debug, Clone, Default)]
pub struct MonitoredConversations {
	/// Both aliases of a conversation, mapped to the counterparty address.
	by_alias: HashMap<String, String>,
	/// Counterparty address mapped to the alias used when writing to it.
	by_address: HashMap<String, String>,
}

impl MonitoredConversations {
	fn rebuild<'a>(conversations: impl Iterator<Item = &'a Conversation>) -> Self {
		let mut index = Self::default();
		for conversation in conversations {
			let counterparty = conversation.counterparty_address.clone();
			index
				.by_alias
				.insert(conversation.my_alias.clone(), counterparty.clone());
			if let Some(their_alias) = &conversation.their_alias {
				index.by_alias.insert(their_alias.clone(), counterparty.clone());
			}
			index
				.by_address
				.insert(counterparty, conversation.my_alias.clone());
		}
		index
	}

	pub fn address_for_alias(&self, alias: &str) -> Option<&str> {
		self.by_alias.get(alias).map(String::as_str)
	}

	pub fn alias_for_address(&self, address: &str) -> Option<&str> {
		self.by_address.get(address).map(String::as_str)
	}

	pub fn contains_alias(&self, alias: &str) -> bool {
		self.by_alias.contains_key(alias)
	}

	pub fn contains_address(&self, address: &str) -> bool {
		self.by_address.contains_key(address)
	}

	pub fn len(&self) -> usize {
		self.by_address.len()
	}

	pub fn is_empty(&self) -> bool {
		self.by_address.is_empty()
	}
}

/// Result of feeding an observed handshake into the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
	Created(Conversation),
	Activated(Conversation),
	Ignored,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationSnapshot {
	pub conversations: Vec<Conversation>,
}

pub struct ConversationManager {
	own_address: String,
	conversations: BTreeMap<String, Conversation>,
	monitored: MonitoredConversations,
}

impl ConversationManager {
	pub fn new(own_address: impl Into<String>) -> Self {
		Self {
			own_address: own_address.into(),
			conversations: BTreeMap::new(),
			monitored: MonitoredConversations::default(),
		}
	}

	pub fn own_address(&self) -> &str {
		&self.own_address
	}

	/// Plans a handshake to `counterparty` without touching state. A still-pending local
	/// handshake is returned again so it can be resent.
	pub fn prepare_handshake(
		&self,
		counterparty: &str,
	) -> Result<(Conversation, HandshakeEnvelope), ConversationError> {
		if let Some(existing) = self.by_counterparty(counterparty) {
			return match (existing.status, existing.initiated_by_me) {
				(ConversationStatus::Active, _) => {
					Err(ConversationError::AlreadyActive(counterparty.to_string()))
				}
				(ConversationStatus::Pending, false) => {
					Err(ConversationError::AwaitingResponse(counterparty.to_string()))
				}
				(ConversationStatus::Pending, true) => {
					let envelope = HandshakeEnvelope::new(
						existing.my_alias.clone(),
						existing.conversation_id.clone(),
						counterparty.to_string(),
						false,
					);
					Ok((existing.clone(), envelope))
				}
			};
		}

		let now = now_millis();
		let conversation = Conversation {
			conversation_id: generate_conversation_id(),
			counterparty_address: counterparty.to_string(),
			my_alias: self.fresh_alias(),
			their_alias: None,
			status: ConversationStatus::Pending,
			initiated_by_me: true,
			created_at_ms: now,
			last_activity_ms: now,
		};
		let envelope = HandshakeEnvelope::new(
			conversation.my_alias.clone(),
			conversation.conversation_id.clone(),
			counterparty.to_string(),
			false,
		);
		Ok((conversation, envelope))
	}

	/// Records a handshake planned by [`prepare_handshake`](Self::prepare_handshake) once it
	/// is on chain.
	pub fn record_handshake(&mut self, conversation: Conversation) {
		if self.conversations.contains_key(&conversation.conversation_id) {
			return;
		}
		info!(
			"Initiated conversation {} with {}",
			conversation.conversation_id, conversation.counterparty_address
		);
		self.insert(conversation);
	}

	/// Starts a conversation with `counterparty` right away.
	pub fn initiate_handshake(
		&mut self,
		counterparty: &str,
	) -> Result<(Conversation, HandshakeEnvelope), ConversationError> {
		let (conversation, envelope) = self.prepare_handshake(counterparty)?;
		self.record_handshake(conversation.clone());
		Ok((conversation, envelope))
	}

	/// Plans the answer to a handshake received from the counterparty. State is unchanged
	/// until [`confirm_response`](Self::confirm_response).
	pub fn prepare_response(
		&self,
		conversation_id: &str,
	) -> Result<(Conversation, HandshakeEnvelope), ConversationError> {
		let conversation = self
			.conversations
			.get(conversation_id)
			.ok_or_else(|| ConversationError::NotFound(conversation_id.to_string()))?;
		if conversation.initiated_by_me {
			return Err(ConversationError::NotRespondable(conversation_id.to_string()));
		}
		if !conversation.is_active() {
			self.activated(conversation_id, conversation.their_alias.clone())?;
		}

		let envelope = HandshakeEnvelope::new(
			conversation.my_alias.clone(),
			conversation.conversation_id.clone(),
			conversation.counterparty_address.clone(),
			true,
		);
		Ok((conversation.clone(), envelope))
	}

	/// Activates a conversation whose response has been sent.
	pub fn confirm_response(&mut self, conversation_id: &str) -> Result<Conversation, ConversationError> {
		let conversation = self
			.conversations
			.get(conversation_id)
			.ok_or_else(|| ConversationError::NotFound(conversation_id.to_string()))?;
		if conversation.initiated_by_me {
			return Err(ConversationError::NotRespondable(conversation_id.to_string()));
		}
		if conversation.is_active() {
			return Ok(conversation.clone());
		}
		let their_alias = conversation.their_alias.clone();
		self.activate(conversation_id, their_alias)
	}

	/// Answers a pending handshake received from the counterparty, activating the conversation.
	pub fn respond_to_handshake(
		&mut self,
		conversation_id: &str,
	) -> Result<(Conversation, HandshakeEnvelope), ConversationError> {
		let (_, envelope) = self.prepare_response(conversation_id)?;
		let activated = self.confirm_response(conversation_id)?;
		Ok((activated, envelope))
	}

	/// Applies a handshake observed on chain. `sender` and `recipient` come from transaction
	/// attribution. Handshakes that match no rule leave state untouched.
	pub fn process_handshake(
		&mut self,
		sender: &str,
		recipient: &str,
		envelope: &HandshakeEnvelope,
	) -> Result<HandshakeOutcome, ConversationError> {
		if sender == self.own_address {
			return self.process_own_handshake(recipient, envelope);
		}

		if envelope.is_response {
			let Some(conversation) = self.conversations.get(&envelope.conversation_id) else {
				debug!("Ignoring response for unknown conversation {}", envelope.conversation_id);
				return Ok(HandshakeOutcome::Ignored);
			};
			if conversation.is_active()
				|| !conversation.initiated_by_me
				|| conversation.counterparty_address != sender
			{
				debug!("Ignoring unrelated handshake response from {}", sender);
				return Ok(HandshakeOutcome::Ignored);
			}
			let activated = self.activate(&envelope.conversation_id, Some(envelope.alias.clone()))?;
			info!("Conversation {} with {} is active", activated.conversation_id, sender);
			return Ok(HandshakeOutcome::Activated(activated));
		}

		if self.by_counterparty(sender).is_some()
			|| self.conversations.contains_key(&envelope.conversation_id)
		{
			debug!("Ignoring repeated handshake from {}", sender);
			return Ok(HandshakeOutcome::Ignored);
		}
		self.ensure_alias_free(&envelope.alias, sender)?;

		let now = now_millis();
		let conversation = Conversation {
			conversation_id: envelope.conversation_id.clone(),
			counterparty_address: sender.to_string(),
			my_alias: self.fresh_alias(),
			their_alias: Some(envelope.alias.clone()),
			status: ConversationStatus::Pending,
			initiated_by_me: false,
			created_at_ms: now,
			last_activity_ms: now,
		};
		info!("Received handshake from {} ({})", sender, conversation.conversation_id);
		self.insert(conversation.clone());
		Ok(HandshakeOutcome::Created(conversation))
	}

	/// Our own handshakes seen on chain rebuild state lost since they were sent.
	///
	/// Only reachable when the cipher lets the sender open its own ciphertext. ECIES seals
	/// to the counterparty's key, so with [`EciesCipher`](crate::crypto::EciesCipher) the
	/// local side of a conversation survives only through the persisted snapshot.
	fn process_own_handshake(
		&mut self,
		recipient: &str,
		envelope: &HandshakeEnvelope,
	) -> Result<HandshakeOutcome, ConversationError> {
		let counterparty = if envelope.recipient_address.is_empty() {
			recipient
		} else {
			envelope.recipient_address.as_str()
		};

		if envelope.is_response {
			let answered = self
				.conversations
				.get(&envelope.conversation_id)
				.filter(|c| {
					!c.is_active() && !c.initiated_by_me && c.counterparty_address == counterparty
				})
				.map(|c| c.their_alias.clone());
			match answered {
				Some(their_alias) => {
					let activated = self.activate(&envelope.conversation_id, their_alias)?;
					Ok(HandshakeOutcome::Activated(activated))
				}
				None => Ok(HandshakeOutcome::Ignored),
			}
		} else {
			if self.by_counterparty(counterparty).is_some()
				|| self.conversations.contains_key(&envelope.conversation_id)
			{
				return Ok(HandshakeOutcome::Ignored);
			}
			let now = now_millis();
			let conversation = Conversation {
				conversation_id: envelope.conversation_id.clone(),
				counterparty_address: counterparty.to_string(),
				my_alias: envelope.alias.clone(),
				their_alias: None,
				status: ConversationStatus::Pending,
				initiated_by_me: true,
				created_at_ms: chrono::DateTime::parse_from_rfc3339(&envelope.timestamp)
					.map(|t| t.timestamp_millis())
					.unwrap_or(now),
				last_activity_ms: now,
			};
			self.insert(conversation.clone());
			Ok(HandshakeOutcome::Created(conversation))
		}
	}

	/// The conversation as it would look once active, or why it cannot become active.
	fn activated(
		&self,
		conversation_id: &str,
		their_alias: Option<String>,
	) -> Result<Conversation, ConversationError> {
		let mut conversation = self
			.conversations
			.get(conversation_id)
			.cloned()
			.ok_or_else(|| ConversationError::NotFound(conversation_id.to_string()))?;
		let counterparty = conversation.counterparty_address.clone();
		if let Some(alias) = &their_alias {
			self.ensure_alias_free(alias, &counterparty)?;
		}

		let pair = (conversation.my_alias.clone(), their_alias.clone());
		if self.conversations.values().any(|other| {
			other.conversation_id != conversation.conversation_id
				&& other.is_active()
				&& other.counterparty_address == counterparty
				&& (other.my_alias.clone(), other.their_alias.clone()) == pair
		}) {
			return Err(ConversationError::AliasCollision {
				alias: conversation.my_alias,
				counterparty,
			});
		}

		conversation.their_alias = their_alias;
		conversation.status = ConversationStatus::Active;
		conversation.last_activity_ms = now_millis();
		Ok(conversation)
	}

	fn activate(
		&mut self,
		conversation_id: &str,
		their_alias: Option<String>,
	) -> Result<Conversation, ConversationError> {
		let conversation = self.activated(conversation_id, their_alias)?;
		self.insert(conversation.clone());
		Ok(conversation)
	}

	/// An alias routes to exactly one counterparty.
	fn ensure_alias_free(&self, alias: &str, counterparty: &str) -> Result<(), ConversationError> {
		match self.monitored.address_for_alias(alias) {
			Some(owner) if owner != counterparty => Err(ConversationError::AliasCollision {
				alias: alias.to_string(),
				counterparty: owner.to_string(),
			}),
			_ => Ok(()),
		}
	}

	fn fresh_alias(&self) -> String {
		loop {
			let alias = generate_alias();
			if !self.monitored.contains_alias(&alias) {
				return alias;
			}
		}
	}

	fn insert(&mut self, conversation: Conversation) {
		self.conversations
			.insert(conversation.conversation_id.clone(), conversation);
		self.rebuild_monitored();
	}

	fn rebuild_monitored(&mut self) {
		self.monitored = MonitoredConversations::rebuild(self.conversations.values());
		debug!("Monitoring {} conversations", self.monitored.len());
	}

	/// Marks traffic on a conversation, e.g. when a comm message is routed to it.
	pub fn touch(&mut self, counterparty: &str, timestamp_ms: i64) {
		if let Some(conversation) = self
			.conversations
			.values_mut()
			.find(|c| c.counterparty_address == counterparty)
		{
			conversation.last_activity_ms = conversation.last_activity_ms.max(timestamp_ms);
		}
	}

	pub fn get(&self, conversation_id: &str) -> Option<&Conversation> {
		self.conversations.get(conversation_id)
	}

	/// Matches either side's alias.
	pub fn by_alias(&self, alias: &str) -> Option<&Conversation> {
		self.conversations
			.values()
			.find(|c| c.my_alias == alias || c.their_alias.as_deref() == Some(alias))
	}

	pub fn by_counterparty(&self, address: &str) -> Option<&Conversation> {
		self.conversations
			.values()
			.find(|c| c.counterparty_address == address)
	}

	pub fn conversations(&self) -> impl Iterator<Item = &Conversation> {
		self.conversations.values()
	}

	pub fn monitored(&self) -> &MonitoredConversations {
		&self.monitored
	}

	pub fn snapshot(&self) -> ConversationSnapshot {
		ConversationSnapshot {
			conversations: self.conversations.values().cloned().collect(),
		}
	}

	pub fn restore(&mut self, snapshot: ConversationSnapshot) {
		self.conversations = snapshot
			.conversations
			.into_iter()
			.map(|c| (c.conversation_id.clone(), c))
			.collect();
		self.rebuild_monitored();
		info!("Restored {} conversations", self.conversations.len());
	}
}
