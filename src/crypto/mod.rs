//! Key material, addresses, and message encryption.

/// Address codec and locking scripts
pub mod address;
/// Message cipher
pub mod cipher;
/// Wallet key access
pub mod keys;

pub use address::{Address, AddressError, AddressVersion};
pub use cipher::{Cipher, CipherError, EciesCipher, EncryptedMessage};
pub use keys::{KeyKind, KeySource, PrivateKey, StaticKeySource};
