//! On-chain messaging protocol: payload wire format and plaintext envelopes.
//!
//! Messages ride inside the opaque payload field of ordinary transactions. The payload is the
//! hex encoding of an ASCII string `ciph_msg:<version>:<type>:[<context>:]<ciphertext-hex>`.

/// Plaintext envelopes carried inside the encrypted part of a payload
pub mod envelope;
/// Payload wire codec
pub mod payload;

pub use envelope::{
	FileAttachment, HandshakeEnvelope, PaymentEnvelope, generate_alias, generate_conversation_id,
};
pub use payload::{
	DecodedPayload, MessageType, PayloadError, decode_payload, encode_payload, is_protocol_payload,
};

/// ASCII marker every protocol payload starts with.
pub const PROTOCOL_PREFIX: &str = "ciph_msg:";
/// `PROTOCOL_PREFIX` after hex encoding, as it appears in a transaction payload.
pub const PROTOCOL_PREFIX_HEX: &str = "636970685f6d73673a";
/// Wire version written by this implementation.
pub const PROTOCOL_VERSION: &str = "1";
/// Alias length in bytes (12 hex characters).
pub const ALIAS_LENGTH: usize = 6;
/// Upper bound on the raw payload size in bytes.
pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024;
