//! Ingestion orchestrator and integration point for the feeds.
//!
//! This module defines the `IngestionOrchestrator`, which owns the wallet's
//! [`BlockIngestionPipeline`] and runs the configured [`SyncStrategy`]s over it in order.
//!
//! The orchestrator is responsible for:
//! - Preparing every strategy before the first one runs, so the live subscription is open
//!   (and buffering) while the historical backfill is still replaying
//! - Running the strategies one after another over the same pipeline
//! - Aggregating the per-strategy statistics
//!
//! Overlap between the feeds is expected: the pipeline's dedup makes a transaction delivered
//! by both of them count once.

use crate::wallet::WalletSyncError;
use crate::wallet::sync::{
	pipeline::BlockIngestionPipeline, progress_tracker::IngestionStats, strategies::SyncStrategy,
};
use tracing::info;

pub struct IngestionOrchestrator {
	pipeline: BlockIngestionPipeline,
	strategies: Vec<Box<dyn SyncStrategy>>,
}

impl IngestionOrchestrator {
	pub fn new(pipeline: BlockIngestionPipeline) -> Self {
		Self {
			pipeline,
			strategies: Vec::new(),
		}
	}

	/// Strategies run in the order they are added.
	pub fn with_strategy(mut self, strategy: Box<dyn SyncStrategy>) -> Self {
		self.strategies.push(strategy);
		self
	}

	pub fn pipeline(&self) -> &BlockIngestionPipeline {
		&self.pipeline
	}

	pub fn pipeline_mut(&mut self) -> &mut BlockIngestionPipeline {
		&mut self.pipeline
	}

	/// Consumes the orchestrator, handing the pipeline back.
	pub fn into_pipeline(self) -> BlockIngestionPipeline {
		self.pipeline
	}

	pub async fn run(&mut self) -> Result<IngestionStats, WalletSyncError> {
		info!(
			"Starting ingestion for {} with {} strategies",
			self.pipeline.wallet(),
			self.strategies.len()
		);
		for strategy in &mut self.strategies {
			strategy.prepare().await?;
		}

		let mut total = IngestionStats::default();
		for strategy in &mut self.strategies {
			info!("Running {}", strategy.name());
			let stats = strategy.sync(&mut self.pipeline).await?;
			total.merge(&stats);
		}

		info!("Ingestion completed: {}", total.summary());
		Ok(total)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::messaging::MessageSink;
	use crate::node::{RpcBlock, RpcBlockHeader};
	use crate::protocol::{MessageType, PROTOCOL_VERSION, encode_payload};
	use crate::wallet::sync::pipeline::tests::{
		BOB, ME, MY_KEY, active_conversation_with_bob, harness, seal,
	};
	use crate::wallet::sync::strategies::tests::ScriptedSubscriber;
	use crate::wallet::sync::strategies::{HistoricalBackfill, LiveBlockSync, SyncConfig};
	use crate::wallet::sync::transaction_processor::tests::{FAST, full_tx, funding_tx, rpc_tx};
	use std::sync::Arc;

	#[tokio::test]
	async fn transaction_seen_by_both_feeds_is_stored_once() {
		let h = harness();
		active_conversation_with_bob(&h.conversations);
		let comm = encode_payload(
			PROTOCOL_VERSION,
			MessageType::Comm,
			Some("b4e3da89b4e3"),
			&seal(MY_KEY, "once"),
		)
		.unwrap();
		*h.explorer.history.lock() = vec![full_tx("tx1", BOB, BOB, &comm, 50)];
		h.explorer
			.transactions
			.lock()
			.insert("fund".to_string(), funding_tx("fund", BOB));

		let subscriber = Arc::new(ScriptedSubscriber::new(vec![Ok(RpcBlock {
			header: RpcBlockHeader {
				hash: "b1".to_string(),
				timestamp: 50,
				daa_score: 1,
			},
			transactions: vec![rpc_tx("tx1", "fund", BOB, &comm)],
		})]));
		let config = SyncConfig {
			page_retry: FAST,
			..SyncConfig::default()
		};

		let mut orchestrator = IngestionOrchestrator::new(h.pipeline)
			.with_strategy(Box::new(HistoricalBackfill::new(
				h.explorer.clone(),
				ME.to_string(),
				config.clone(),
			)))
			.with_strategy(Box::new(LiveBlockSync::new(subscriber.clone(), config)));

		let total = orchestrator.run().await.unwrap();
		assert_eq!(total.stored, 1);
		assert_eq!(total.scanned, 2);
		assert_eq!(total.skipped, 1);
		// subscribed during prepare, before the backfill ran
		assert!(subscriber.items.lock().is_none());
		assert_eq!(h.sink.messages(ME).await.unwrap().len(), 1);
		assert_eq!(orchestrator.pipeline().wallet(), ME);
	}
}
