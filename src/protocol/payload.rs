//! Payload codec.
//!
//! Encoding never inspects the ciphertext beyond checking it is hex. Decoding is total: any
//! input that is not a well-formed protocol payload yields a `PayloadError`, which callers
//! treat as "not a protocol message" rather than a failure.

use super::{MAX_PAYLOAD_SIZE, PROTOCOL_PREFIX, PROTOCOL_PREFIX_HEX};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Message kinds understood by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
	/// Conversation setup, exchanges aliases.
	Handshake,
	/// Conversation message routed by alias.
	Comm,
	/// Value transfer with an attached note.
	Payment,
}

impl MessageType {
	pub fn as_str(&self) -> &'static str {
		match self {
			MessageType::Handshake => "handshake",
			MessageType::Comm => "comm",
			MessageType::Payment => "payment",
		}
	}

	/// Only `comm` payloads carry a context segment.
	pub fn has_context(&self) -> bool {
		matches!(self, MessageType::Comm)
	}
}

impl fmt::Display for MessageType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for MessageType {
	type Err = PayloadError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"handshake" => Ok(MessageType::Handshake),
			"comm" => Ok(MessageType::Comm),
			"payment" => Ok(MessageType::Payment),
			other => Err(PayloadError::UnknownType(other.to_string())),
		}
	}
}

/// A payload split into its wire fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
	pub version: String,
	pub message_type: MessageType,
	/// Alias for `comm`, `None` otherwise.
	pub context: Option<String>,
	pub ciphertext_hex: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
	#[error("payload does not carry the protocol prefix")]
	NotProtocolPayload,

	#[error("payload is not valid hex: {0}")]
	InvalidHex(String),

	#[error("payload is not valid UTF-8")]
	InvalidUtf8,

	#[error("malformed payload: {0}")]
	Malformed(String),

	#[error("unknown message type: {0}")]
	UnknownType(String),

	#[error("payload is missing its ciphertext")]
	MissingCiphertext,

	#[error("comm payload is missing its alias context")]
	MissingContext,

	#[error("payload is {size} bytes, maximum is {max}")]
	PayloadTooLarge { size: usize, max: usize },
}

/// Cheap prefix test on a hex transaction payload, used to filter block contents.
pub fn is_protocol_payload(payload_hex: &str) -> bool {
	payload_hex.len() > PROTOCOL_PREFIX_HEX.len()
		&& payload_hex
			.get(..PROTOCOL_PREFIX_HEX.len())
			.is_some_and(|prefix| prefix.eq_ignore_ascii_case(PROTOCOL_PREFIX_HEX))
}

/// Builds the hex payload for a message.
///
/// `context` is required for `comm` and ignored for the other types.
pub fn encode_payload(
	version: &str,
	message_type: MessageType,
	context: Option<&str>,
	ciphertext_hex: &str,
) -> Result<String, PayloadError> {
	if version.is_empty() || version.contains(':') {
		return Err(PayloadError::Malformed(format!("invalid version {:?}", version)));
	}
	validate_ciphertext(ciphertext_hex)?;

	let ascii = if message_type.has_context() {
		let context = context
			.filter(|c| !c.is_empty())
			.ok_or(PayloadError::MissingContext)?;
		format!(
			"{}{}:{}:{}:{}",
			PROTOCOL_PREFIX, version, message_type, context, ciphertext_hex
		)
	} else {
		format!("{}{}:{}:{}", PROTOCOL_PREFIX, version, message_type, ciphertext_hex)
	};

	if ascii.len() > MAX_PAYLOAD_SIZE {
		return Err(PayloadError::PayloadTooLarge {
			size: ascii.len(),
			max: MAX_PAYLOAD_SIZE,
		});
	}

	Ok(hex::encode(ascii.as_bytes()))
}

/// Splits a hex transaction payload into its wire fields.
pub fn decode_payload(payload_hex: &str) -> Result<DecodedPayload, PayloadError> {
	if !is_protocol_payload(payload_hex) {
		return Err(PayloadError::NotProtocolPayload);
	}

	let bytes = hex::decode(payload_hex).map_err(|e| PayloadError::InvalidHex(e.to_string()))?;
	let ascii = String::from_utf8(bytes).map_err(|_| PayloadError::InvalidUtf8)?;

	// Three delimiters: after the marker, after the version, after the type.
	let mut parts = ascii.splitn(4, ':');
	let _marker = parts.next();
	let version = parts
		.next()
		.filter(|v| !v.is_empty())
		.ok_or_else(|| PayloadError::Malformed("missing version".to_string()))?;
	let message_type: MessageType = parts
		.next()
		.ok_or_else(|| PayloadError::Malformed("missing type".to_string()))?
		.parse()?;
	let rest = parts.next().ok_or(PayloadError::MissingCiphertext)?;

	let (context, ciphertext_hex) = if message_type.has_context() {
		// The ciphertext is hex and never contains ':'; anything before the last ':' is the alias.
		let (context, ciphertext) = rest.rsplit_once(':').ok_or(PayloadError::MissingContext)?;
		if context.is_empty() {
			return Err(PayloadError::MissingContext);
		}
		(Some(context.to_string()), ciphertext)
	} else {
		(None, rest)
	};

	validate_ciphertext(ciphertext_hex)?;

	Ok(DecodedPayload {
		version: version.to_string(),
		message_type,
		context,
		ciphertext_hex: ciphertext_hex.to_string(),
	})
}

fn validate_ciphertext(ciphertext_hex: &str) -> Result<(), PayloadError> {
	if ciphertext_hex.is_empty() {
		return Err(PayloadError::MissingCiphertext);
	}
	if ciphertext_hex.len() % 2 != 0 || !ciphertext_hex.bytes().all(|b| b.is_ascii_hexdigit()) {
		return Err(PayloadError::Malformed("ciphertext is not hex".to_string()));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn comm_scenario_decodes_to_its_fields() {
		let encoded = encode_payload("1", MessageType::Comm, Some("b4e3da89"), "deadbeef").unwrap();
		assert!(encoded.starts_with(PROTOCOL_PREFIX_HEX));

		let decoded = decode_payload(&encoded).unwrap();
		assert_eq!(
			decoded,
			DecodedPayload {
				version: "1".to_string(),
				message_type: MessageType::Comm,
				context: Some("b4e3da89".to_string()),
				ciphertext_hex: "deadbeef".to_string(),
			}
		);
	}

	#[test]
	fn round_trips_every_message_type() {
		for (message_type, context) in [
			(MessageType::Handshake, None),
			(MessageType::Comm, Some("a1b2c3d4e5f6")),
			(MessageType::Payment, None),
		] {
			let encoded = encode_payload("1", message_type, context, "00ff10").unwrap();
			let decoded = decode_payload(&encoded).unwrap();
			assert_eq!(decoded.message_type, message_type);
			assert_eq!(decoded.context.as_deref(), context);
			assert_eq!(decoded.ciphertext_hex, "00ff10");
		}
	}

	#[test]
	fn handshake_has_no_context_segment() {
		let encoded = encode_payload("1", MessageType::Handshake, Some("ignored"), "abcd").unwrap();
		let ascii = String::from_utf8(hex::decode(encoded).unwrap()).unwrap();
		assert_eq!(ascii, "ciph_msg:1:handshake:abcd");
	}

	#[test]
	fn comm_context_may_contain_colons() {
		let encoded = encode_payload("1", MessageType::Comm, Some("alias:with:colons"), "beef").unwrap();
		let decoded = decode_payload(&encoded).unwrap();
		assert_eq!(decoded.context.as_deref(), Some("alias:with:colons"));
		assert_eq!(decoded.ciphertext_hex, "beef");
	}

	#[test]
	fn rejects_non_protocol_and_malformed_payloads() {
		assert_eq!(decode_payload(""), Err(PayloadError::NotProtocolPayload));
		assert_eq!(
			decode_payload(&hex::encode("hello world")),
			Err(PayloadError::NotProtocolPayload)
		);
		assert_eq!(
			decode_payload(&hex::encode("ciph_msg:1:gossip:abcd")),
			Err(PayloadError::UnknownType("gossip".to_string()))
		);
		assert_eq!(
			decode_payload(&hex::encode("ciph_msg:1:handshake:")),
			Err(PayloadError::MissingCiphertext)
		);
		assert_eq!(
			decode_payload(&hex::encode("ciph_msg:1:comm:abcd")),
			Err(PayloadError::MissingContext)
		);
		assert!(matches!(
			decode_payload(&hex::encode("ciph_msg:1:payment:not-hex")),
			Err(PayloadError::Malformed(_))
		));
	}

	#[test]
	fn prefix_check_is_case_insensitive() {
		let upper = hex::encode("ciph_msg:1:handshake:ab").to_uppercase();
		assert!(is_protocol_payload(&upper));
		assert!(decode_payload(&upper).is_ok());
	}

	#[test]
	fn enforces_payload_size_limit() {
		let ciphertext = "ab".repeat(MAX_PAYLOAD_SIZE);
		assert!(matches!(
			encode_payload("1", MessageType::Payment, None, &ciphertext),
			Err(PayloadError::PayloadTooLarge { .. })
		));
	}
}
