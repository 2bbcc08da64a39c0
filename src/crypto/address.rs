use bech32::Fe32;
use bech32::primitives::iter::{ByteIterExt, Fe32IterExt};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of 5-bit groups in the trailing checksum.
const CHECKSUM_LENGTH: usize = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
	#[error("address is missing the '<prefix>:' part")]
	MissingPrefix,
	#[error("unsupported address prefix '{0}'")]
	InvalidPrefix(String),
	#[error("invalid character '{0}' in address")]
	InvalidCharacter(char),
	#[error("address checksum mismatch")]
	BadChecksum,
	#[error("address payload too short")]
	TooShort,
	#[error("unknown address version {0}")]
	UnknownVersion(u8),
	#[error("payload length {actual} does not match version {version:?} (expected {expected})")]
	InvalidLength {
		version: AddressVersion,
		expected: usize,
		actual: usize,
	},
	#[error("address does not carry a public key")]
	NotAPublicKey,
}

/// Kind of payload carried by an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressVersion {
	/// 32-byte x-only Schnorr public key.
	PubKey,
	/// 33-byte compressed ECDSA public key.
	PubKeyEcdsa,
	/// 32-byte script hash.
	ScriptHash,
}

impl AddressVersion {
	fn to_byte(self) -> u8 {
		match self {
			AddressVersion::PubKey => 0,
			AddressVersion::PubKeyEcdsa => 1,
			AddressVersion::ScriptHash => 8,
		}
	}

	fn from_byte(byte: u8) -> Result<Self, AddressError> {
		match byte {
			0 => Ok(AddressVersion::PubKey),
			1 => Ok(AddressVersion::PubKeyEcdsa),
			8 => Ok(AddressVersion::ScriptHash),
			other => Err(AddressError::UnknownVersion(other)),
		}
	}

	fn payload_length(self) -> usize {
		match self {
			AddressVersion::PubKey | AddressVersion::ScriptHash => 32,
			AddressVersion::PubKeyEcdsa => 33,
		}
	}
}

/// A `prefix:payload` chain address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
	pub prefix: String,
	pub version: AddressVersion,
	pub payload: Vec<u8>,
}

impl Address {
	pub fn new(
		prefix: &str,
		version: AddressVersion,
		payload: Vec<u8>,
	) -> Result<Self, AddressError> {
		validate_prefix(prefix)?;
		if payload.len() != version.payload_length() {
			return Err(AddressError::InvalidLength {
				version,
				expected: version.payload_length(),
				actual: payload.len(),
			});
		}
		Ok(Self {
			prefix: prefix.to_string(),
			version,
			payload,
		})
	}

	pub fn decode(encoded: &str) -> Result<Self, AddressError> {
		let (prefix, data) = encoded.split_once(':').ok_or(AddressError::MissingPrefix)?;
		validate_prefix(prefix)?;

		let fes = data
			.chars()
			.map(|c| Fe32::from_char(c).map_err(|_| AddressError::InvalidCharacter(c)))
			.collect::<Result<Vec<_>, _>>()?;
		if fes.len() <= CHECKSUM_LENGTH {
			return Err(AddressError::TooShort);
		}

		let (body, checksum) = fes.split_at(fes.len() - CHECKSUM_LENGTH);
		let expected = checksum_of(prefix, body);
		let actual = checksum
			.iter()
			.fold(0u64, |acc, fe| (acc << 5) | u64::from(fe.to_u8()));
		if expected != actual {
			return Err(AddressError::BadChecksum);
		}

		let bytes: Vec<u8> = body.iter().copied().fes_to_bytes().collect();
		let (&version_byte, payload) = bytes.split_first().ok_or(AddressError::TooShort)?;
		Self::new(prefix, AddressVersion::from_byte(version_byte)?, payload.to_vec())
	}

	pub fn encode(&self) -> String {
		let body: Vec<Fe32> = std::iter::once(self.version.to_byte())
			.chain(self.payload.iter().copied())
			.bytes_to_fes()
			.collect();
		let checksum = checksum_of(&self.prefix, &body);

		let mut encoded = String::with_capacity(self.prefix.len() + 1 + body.len() + CHECKSUM_LENGTH);
		encoded.push_str(&self.prefix);
		encoded.push(':');
		encoded.extend(body.iter().map(|fe| fe.to_char()));
		for i in (0..CHECKSUM_LENGTH).rev() {
			let group = ((checksum >> (5 * i)) & 0x1f) as u8;
			// group < 32 always holds
			if let Ok(fe) = Fe32::try_from(group) {
				encoded.push(fe.to_char());
			}
		}
		encoded
	}

	/// SEC1 compressed public key behind a key address.
	///
	/// Schnorr addresses store only the x coordinate; the even-parity point is used, which
	/// yields the same ECDH x coordinate as its negation.
	pub fn public_key_sec1(&self) -> Result<Vec<u8>, AddressError> {
		match self.version {
			AddressVersion::PubKey => {
				let mut sec1 = Vec::with_capacity(33);
				sec1.push(0x02);
				sec1.extend_from_slice(&self.payload);
				Ok(sec1)
			}
			AddressVersion::PubKeyEcdsa => Ok(self.payload.clone()),
			AddressVersion::ScriptHash => Err(AddressError::NotAPublicKey),
		}
	}

	/// Version-0 locking script paying to this address.
	pub fn script_public_key(&self) -> Vec<u8> {
		let mut script = Vec::with_capacity(self.payload.len() + 3);
		match self.version {
			AddressVersion::PubKey => {
				script.push(0x20); // OP_DATA_32
				script.extend_from_slice(&self.payload);
				script.push(0xac); // OP_CHECKSIG
			}
			AddressVersion::PubKeyEcdsa => {
				script.push(0x21); // OP_DATA_33
				script.extend_from_slice(&self.payload);
				script.push(0xab); // OP_CHECKSIGECDSA
			}
			AddressVersion::ScriptHash => {
				script.push(0xaa); // OP_BLAKE2B
				script.push(0x20);
				script.extend_from_slice(&self.payload);
				script.push(0x87); // OP_EQUAL
			}
		}
		script
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.encode())
	}
}

impl FromStr for Address {
	type Err = AddressError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::decode(s)
	}
}

fn validate_prefix(prefix: &str) -> Result<(), AddressError> {
	match prefix {
		"kaspa" | "kaspatest" | "kaspadev" | "kaspasim" => Ok(()),
		other => Err(AddressError::InvalidPrefix(other.to_string())),
	}
}

fn checksum_of(prefix: &str, body: &[Fe32]) -> u64 {
	polymod(
		prefix
			.bytes()
			.map(|b| b & 0x1f)
			.chain(std::iter::once(0))
			.chain(body.iter().map(|fe| fe.to_u8()))
			.chain(std::iter::repeat_n(0, CHECKSUM_LENGTH)),
	)
}

/// 40-bit BCH checksum shared with cashaddr.
fn polymod(values: impl Iterator<Item = u8>) -> u64 {
	let mut c = 1u64;
	for d in values {
		let c0 = c >> 35;
		c = ((c & 0x07_ffff_ffff) << 5) ^ u64::from(d);
		if c0 & 0x01 != 0 {
			c ^= 0x98_f2bc_8e61;
		}
		if c0 & 0x02 != 0 {
			c ^= 0x79_b76d_99e2;
		}
		if c0 & 0x04 != 0 {
			c ^= 0xf3_3e5f_b3c4;
		}
		if c0 & 0x08 != 0 {
			c ^= 0xae_2eab_e2a8;
		}
		if c0 & 0x10 != 0 {
			c ^= 0x1e_4f43_e470;
		}
	}
	c ^ 1
}
