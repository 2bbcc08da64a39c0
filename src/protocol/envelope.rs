//! Plaintext envelopes.
//!
//! Handshake and payment plaintexts are JSON documents; comm plaintexts are the raw message
//! text (or a JSON file descriptor, see [`FileAttachment`]).

use super::ALIAS_LENGTH;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Version number written into JSON envelopes.
pub const ENVELOPE_VERSION: u32 = 1;

/// Handshake plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeEnvelope {
	#[serde(rename = "type")]
	pub kind: String,
	/// Alias the sender will use as the `comm` context.
	pub alias: String,
	/// RFC 3339 creation time.
	pub timestamp: String,
	pub conversation_id: String,
	pub version: u32,
	pub recipient_address: String,
	#[serde(default)]
	pub send_to_recipient: bool,
	#[serde(default)]
	pub is_response: bool,
}

impl HandshakeEnvelope {
	pub fn new(
		alias: String,
		conversation_id: String,
		recipient_address: String,
		is_response: bool,
	) -> Self {
		Self {
			kind: "handshake".to_string(),
			alias,
			timestamp: chrono::Utc::now().to_rfc3339(),
			conversation_id,
			version: ENVELOPE_VERSION,
			recipient_address,
			send_to_recipient: true,
			is_response,
		}
	}

	pub fn to_json(&self) -> String {
		// Serializing a struct of strings and scalars cannot fail.
		serde_json::to_string(self).unwrap_or_default()
	}

	/// Parses a decrypted handshake plaintext; `None` if it is not a handshake document.
	pub fn from_json(plaintext: &str) -> Option<Self> {
		serde_json::from_str::<Self>(plaintext)
			.ok()
			.filter(|env| env.kind == "handshake" && !env.alias.is_empty())
	}
}

/// Payment plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEnvelope {
	#[serde(rename = "type")]
	pub kind: String,
	pub message: String,
	/// Amount in sompi.
	pub amount: u64,
	/// Unix milliseconds.
	pub timestamp: i64,
	pub version: u32,
}

impl PaymentEnvelope {
	pub fn new(message: String, amount: u64, timestamp: i64) -> Self {
		Self {
			kind: "payment".to_string(),
			message,
			amount,
			timestamp,
			version: ENVELOPE_VERSION,
		}
	}

	pub fn to_json(&self) -> String {
		serde_json::to_string(self).unwrap_or_default()
	}

	pub fn from_json(plaintext: &str) -> Option<Self> {
		serde_json::from_str::<Self>(plaintext)
			.ok()
			.filter(|env| env.kind == "payment")
	}
}

/// File sent as a `comm` message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
	#[serde(rename = "type")]
	pub kind: String,
	pub name: String,
	pub size: u64,
	pub mime_type: String,
	/// Base64 or data-URL content, passed through untouched.
	pub content: String,
}

impl FileAttachment {
	pub fn from_json(plaintext: &str) -> Option<Self> {
		serde_json::from_str::<Self>(plaintext)
			.ok()
			.filter(|file| file.kind == "file")
	}
}

/// Fresh random alias, `ALIAS_LENGTH` bytes as lowercase hex.
pub fn generate_alias() -> String {
	let mut bytes = [0u8; ALIAS_LENGTH];
	rand::rng().fill(&mut bytes);
	hex::encode(bytes)
}

/// Fresh random conversation identifier (16 bytes, hex).
pub fn generate_conversation_id() -> String {
	let mut bytes = [0u8; 16];
	rand::rng().fill(&mut bytes);
	hex::encode(bytes)
}
