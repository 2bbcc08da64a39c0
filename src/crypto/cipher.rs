//! Per-recipient message encryption.
//!
//! ECIES over secp256k1: an ephemeral key agrees a secret with the recipient's public key,
//! HKDF-SHA256 stretches it into a ChaCha20-Poly1305 key, and the serialized message is
//! `nonce (12) | ephemeral public key (33, SEC1) | ciphertext`.

use super::address::{Address, AddressError};
use chacha20poly1305::{
	ChaCha20Poly1305, KeyInit, Nonce,
	aead::{Aead, AeadCore, OsRng},
};
use k256::{
	PublicKey, SecretKey,
	ecdh::{EphemeralSecret, SharedSecret, diffie_hellman},
};
use thiserror::Error;

pub const NONCE_LENGTH: usize = 12;
const COMPRESSED_KEY_LENGTH: usize = 33;
const X_ONLY_KEY_LENGTH: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
	#[error("invalid recipient address: {0}")]
	Address(#[from] AddressError),
	#[error("invalid public key")]
	InvalidPublicKey,
	#[error("invalid private key")]
	InvalidPrivateKey,
	#[error("ciphertext is not valid hex")]
	InvalidHex,
	#[error("ciphertext too short")]
	Truncated,
	#[error("failed to derive message key")]
	KeyDerivation,
	#[error("encryption failed")]
	Encryption,
	#[error("decryption failed - incorrect key or corrupted data")]
	Decryption,
	#[error("decrypted data is not valid UTF-8")]
	InvalidUtf8,
}

/// Encryption primitive consumed by the messaging engine.
pub trait Cipher: Send + Sync {
	/// Encrypts `plaintext` for the owner of `recipient`, returning the hex wire form.
	fn encrypt(&self, recipient: &Address, plaintext: &str) -> Result<String, CipherError>;

	/// Decrypts a hex wire ciphertext with a raw 32-byte secret key.
	fn decrypt(&self, ciphertext_hex: &str, private_key: &[u8]) -> Result<String, CipherError>;
}

/// Serialized ciphertext parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMessage {
	pub nonce: Vec<u8>,
	/// 33 bytes SEC1 compressed, or 32 bytes for legacy x-only encodings.
	pub ephemeral_public_key: Vec<u8>,
	pub ciphertext: Vec<u8>,
}

impl EncryptedMessage {
	pub fn to_bytes(&self) -> Vec<u8> {
		let mut bytes = Vec::with_capacity(
			self.nonce.len() + self.ephemeral_public_key.len() + self.ciphertext.len(),
		);
		bytes.extend_from_slice(&self.nonce);
		bytes.extend_from_slice(&self.ephemeral_public_key);
		bytes.extend_from_slice(&self.ciphertext);
		bytes
	}

	pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
		if bytes.len() <= NONCE_LENGTH {
			return Err(CipherError::Truncated);
		}
		let (nonce, rest) = bytes.split_at(NONCE_LENGTH);

		// 0x02/0x03 marks a compressed key, anything else is a bare x coordinate.
		let key_length = if matches!(rest[0], 0x02 | 0x03) {
			COMPRESSED_KEY_LENGTH
		} else {
			X_ONLY_KEY_LENGTH
		};
		if rest.len() < key_length {
			return Err(CipherError::Truncated);
		}
		let (ephemeral_public_key, ciphertext) = rest.split_at(key_length);

		Ok(Self {
			nonce: nonce.to_vec(),
			ephemeral_public_key: ephemeral_public_key.to_vec(),
			ciphertext: ciphertext.to_vec(),
		})
	}

	pub fn to_hex(&self) -> String {
		hex::encode(self.to_bytes())
	}

	pub fn from_hex(value: &str) -> Result<Self, CipherError> {
		let bytes = hex::decode(value).map_err(|_| CipherError::InvalidHex)?;
		Self::from_bytes(&bytes)
	}
}

/// Production [`Cipher`]: ECDH + HKDF-SHA256 + ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, Default)]
pub struct EciesCipher;

impl EciesCipher {
	fn message_key(shared: &SharedSecret) -> Result<[u8; 32], CipherError> {
		let hkdf = shared.extract::<sha2::Sha256>(None);
		let mut okm = [0u8; 32];
		hkdf.expand(b"", &mut okm)
			.map_err(|_| CipherError::KeyDerivation)?;
		Ok(okm)
	}

	fn parse_ephemeral_key(bytes: &[u8]) -> Result<PublicKey, CipherError> {
		if bytes.len() == X_ONLY_KEY_LENGTH {
			let mut sec1 = Vec::with_capacity(COMPRESSED_KEY_LENGTH);
			sec1.push(0x02);
			sec1.extend_from_slice(bytes);
			return PublicKey::from_sec1_bytes(&sec1).map_err(|_| CipherError::InvalidPublicKey);
		}
		PublicKey::from_sec1_bytes(bytes).map_err(|_| CipherError::InvalidPublicKey)
	}
}

impl Cipher for EciesCipher {
	fn encrypt(&self, recipient: &Address, plaintext: &str) -> Result<String, CipherError> {
		let recipient_key = PublicKey::from_sec1_bytes(&recipient.public_key_sec1()?)
			.map_err(|_| CipherError::InvalidPublicKey)?;

		let ephemeral_secret = EphemeralSecret::random(&mut OsRng);
		let ephemeral_public_key = ephemeral_secret.public_key();
		let shared = ephemeral_secret.diffie_hellman(&recipient_key);
		let key = Self::message_key(&shared)?;

		let cipher = ChaCha20Poly1305::new(&key.into());
		let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
		let ciphertext = cipher
			.encrypt(&nonce, plaintext.as_bytes())
			.map_err(|_| CipherError::Encryption)?;

		Ok(EncryptedMessage {
			nonce: nonce.to_vec(),
			ephemeral_public_key: ephemeral_public_key.to_sec1_bytes().to_vec(),
			ciphertext,
		}
		.to_hex())
	}

	fn decrypt(&self, ciphertext_hex: &str, private_key: &[u8]) -> Result<String, CipherError> {
		let message = EncryptedMessage::from_hex(ciphertext_hex)?;
		let secret = SecretKey::from_slice(private_key).map_err(|_| CipherError::InvalidPrivateKey)?;
		let ephemeral = Self::parse_ephemeral_key(&message.ephemeral_public_key)?;

		let shared = diffie_hellman(secret.to_nonzero_scalar(), ephemeral.as_affine());
		let key = Self::message_key(&shared)?;

		let cipher = ChaCha20Poly1305::new(&key.into());
		let plaintext = cipher
			.decrypt(Nonce::from_slice(&message.nonce), message.ciphertext.as_slice())
			.map_err(|_| CipherError::Decryption)?;

		String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::crypto::address::AddressVersion;

	fn keypair() -> (SecretKey, Address) {
		let secret = SecretKey::random(&mut OsRng);
		let sec1 = secret.public_key().to_sec1_bytes();
		let address =
			Address::new("kaspatest", AddressVersion::PubKey, sec1[1..].to_vec()).unwrap();
		(secret, address)
	}

	#[test]
	fn test_encrypt_decrypt() {
		let (secret, address) = keypair();
		let ciphertext = EciesCipher.encrypt(&address, "plaintext message").unwrap();
		let plaintext = EciesCipher
			.decrypt(&ciphertext, secret.to_bytes().as_slice())
			.unwrap();
		assert_eq!(plaintext, "plaintext message");
	}

	#[test]
	fn wrong_key_fails_to_decrypt() {
		let (_, address) = keypair();
		let (other, _) = keypair();
		let ciphertext = EciesCipher.encrypt(&address, "secret").unwrap();
		assert_eq!(
			EciesCipher.decrypt(&ciphertext, other.to_bytes().as_slice()),
			Err(CipherError::Decryption)
		);
	}

	#[test]
	fn ecdsa_addresses_are_supported() {
		let secret = SecretKey::random(&mut OsRng);
		let sec1 = secret.public_key().to_sec1_bytes().to_vec();
		let address = Address::new("kaspa", AddressVersion::PubKeyEcdsa, sec1).unwrap();
		let ciphertext = EciesCipher.encrypt(&address, "hi").unwrap();
		assert_eq!(
			EciesCipher.decrypt(&ciphertext, secret.to_bytes().as_slice()),
			Ok("hi".to_string())
		);
	}

	#[test]
	fn wire_layout_splits_on_key_marker() {
		let mut bytes = vec![7u8; NONCE_LENGTH];
		bytes.push(0x03);
		bytes.extend_from_slice(&[1u8; 32]);
		bytes.extend_from_slice(b"body");
		let message = EncryptedMessage::from_bytes(&bytes).unwrap();
		assert_eq!(message.ephemeral_public_key.len(), 33);
		assert_eq!(message.ciphertext, b"body");
		assert_eq!(message.to_bytes(), bytes);

		assert_eq!(
			EncryptedMessage::from_bytes(&[0u8; 20]),
			Err(CipherError::Truncated)
		);
	}

	#[test]
	fn garbage_ciphertext_is_rejected() {
		let (secret, _) = keypair();
		assert_eq!(
			EciesCipher.decrypt("zz", secret.to_bytes().as_slice()),
			Err(CipherError::InvalidHex)
		);
	}
}
