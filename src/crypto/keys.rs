use std::fmt;

/// Derivation branch of a wallet key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
	Receive,
	Change,
}

/// Raw 32-byte secp256k1 secret key.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey([u8; 32]);

impl PrivateKey {
	pub fn from_bytes(bytes: [u8; 32]) -> Self {
		Self(bytes)
	}

	pub fn from_hex(value: &str) -> Option<Self> {
		let bytes = hex::decode(value.trim()).ok()?;
		let bytes: [u8; 32] = bytes.try_into().ok()?;
		Some(Self(bytes))
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl fmt::Debug for PrivateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("PrivateKey(..)")
	}
}

/// Access to the unlocked wallet's derived keys.
///
/// Derivation itself lives outside the engine; implementations return `None` for indices
/// they cannot (or will not) derive.
pub trait KeySource: Send + Sync {
	fn private_key(&self, kind: KeyKind, index: u32) -> Option<PrivateKey>;
}

/// Key source over keys that are already derived, indexed by position.
#[derive(Debug, Clone, Default)]
pub struct StaticKeySource {
	receive: Vec<PrivateKey>,
	change: Vec<PrivateKey>,
}

impl StaticKeySource {
	pub fn new(receive: Vec<PrivateKey>, change: Vec<PrivateKey>) -> Self {
		Self { receive, change }
	}

	/// Single-address wallet: one receive key, no change branch.
	pub fn single(key: PrivateKey) -> Self {
		Self {
			receive: vec![key],
			change: Vec::new(),
		}
	}
}

impl KeySource for StaticKeySource {
	fn private_key(&self, kind: KeyKind, index: u32) -> Option<PrivateKey> {
		let keys = match kind {
			KeyKind::Receive => &self.receive,
			KeyKind::Change => &self.change,
		};
		keys.get(index as usize).cloned()
	}
}
