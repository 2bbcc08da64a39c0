//! Message-level state: decryption, conversations and message storage.

/// Handshake and alias state machine
pub mod conversation;
/// Multi-key decryption
pub mod decryption;
/// Persistent record of undecryptable transactions
pub mod decryption_cache;
/// Message persistence
pub mod store;
pub mod types;

pub use conversation::{
	ConversationError, ConversationManager, ConversationSnapshot, HandshakeOutcome,
	MonitoredConversations,
};
pub use decryption::{DecryptionConfig, DecryptionEngine, DecryptionOutcome};
pub use decryption_cache::{CacheStore, DecryptionCache, MemoryCacheStore};
pub use store::{MemoryMessageStore, MessageSink, StoreError};
pub use types::{Conversation, ConversationStatus, Message, UNDECRYPTABLE_CONTENT};
