use crate::protocol::{FileAttachment, MessageType};
use serde::{Deserialize, Serialize};

/// Content stored for messages no wallet key could decrypt.
pub const UNDECRYPTABLE_CONTENT: &str = "[undecryptable]";

/// A protocol message observed on chain, scoped to the owning wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
	pub transaction_id: String,
	pub sender_address: String,
	pub recipient_address: String,
	pub timestamp_ms: i64,
	pub payload_hex: String,
	pub message_type: MessageType,
	pub decrypted_content: String,
	pub amount_sompi: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub fee_sompi: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub file_data: Option<FileAttachment>,
}

impl Message {
	pub fn is_undecryptable(&self) -> bool {
		self.decrypted_content == UNDECRYPTABLE_CONTENT
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationStatus {
	/// Handshake sent or received, reciprocal handshake outstanding.
	Pending,
	/// Both sides exchanged handshakes; both aliases are known.
	Active,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
	pub conversation_id: String,
	pub counterparty_address: String,
	pub my_alias: String,
	pub their_alias: Option<String>,
	pub status: ConversationStatus,
	pub initiated_by_me: bool,
	pub created_at_ms: i64,
	pub last_activity_ms: i64,
}

impl Conversation {
	pub fn is_active(&self) -> bool {
		self.status == ConversationStatus::Active
	}
}
