//! Encrypted peer-to-peer messaging carried in Kaspa transaction payloads.

pub mod crypto;
pub mod explorer;
pub mod messaging;
pub mod node;
pub mod protocol;
pub mod transaction;
pub mod utils;
pub mod wallet;
