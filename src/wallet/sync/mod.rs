//! Message Ingestion Module
//!
//! This module discovers protocol messages on chain and stores the ones that belong to the
//! wallet. It is composed of several submodules, each responsible for a specific aspect of
//! ingestion:
//!
//! - `orchestrator`: Runs the configured feeds over one pipeline.
//! - `pipeline`: The single path every transaction takes, from payload filter to storage.
//! - `events`: Event types and handlers used to publish ingestion results.
//! - `progress_tracker`: Processed-transaction dedup and ingestion statistics.
//! - `strategies`: The live block feed and the historical backfill.
//! - `transaction_processor`: Normalizes feed transactions and resolves their sender.
//! - `repositories`: File-backed message, cache and conversation storage.
//!
//! Both feeds may deliver the same transaction; the pipeline stores it once.

/// Event system for publishing ingestion results
pub mod events;
/// Coordinator for the ingestion feeds
pub mod orchestrator;
/// Per-transaction ingestion path
pub mod pipeline;
/// Dedup and statistics
pub mod progress_tracker;
/// File-backed persistence
pub mod repositories;
/// Live and historical feeds
pub mod strategies;
/// Transaction normalization and sender attribution
pub mod transaction_processor;

pub use events::{
	ChannelEventHandler, EventDispatcher, IngestionEvent, IngestionEventHandler,
	LoggingEventHandler,
};
pub use orchestrator::IngestionOrchestrator;
pub use pipeline::BlockIngestionPipeline;
pub use progress_tracker::{IngestionStats, ProcessedSet};
pub use repositories::{FileCacheStore, FileConversationRepository, FileMessageRepository};
pub use strategies::{HistoricalBackfill, LiveBlockSync, SyncConfig, SyncStrategy};
pub use transaction_processor::{CanonicalTransaction, SourceTransaction, TransactionProcessor};
