use crate::explorer::{ExplorerApi, ExplorerError, FullTransaction};
use crate::node::{BlockStream, BlockSubscriber};
use crate::utils::{RetryPolicy, retry_bounded};
use crate::wallet::WalletSyncError;
use crate::wallet::sync::events::IngestionEvent;
use crate::wallet::sync::pipeline::BlockIngestionPipeline;
use crate::wallet::sync::progress_tracker::IngestionStats;
use crate::wallet::sync::transaction_processor::SourceTransaction;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Trait for the feeds that drive the ingestion pipeline
#[async_trait::async_trait]
pub trait SyncStrategy: Send {
	/// Called for every strategy before any of them runs, e.g. to subscribe early so
	/// nothing is missed while another strategy is busy.
	async fn prepare(&mut self) -> Result<(), WalletSyncError> {
		Ok(())
	}

	/// Feeds transactions into `pipeline` and returns the counters for this run.
	async fn sync(
		&mut self,
		pipeline: &mut BlockIngestionPipeline,
	) -> Result<IngestionStats, WalletSyncError>;

	/// Get the name of this strategy
	fn name(&self) -> &'static str;
}

/// Configuration for sync strategies
#[derive(Debug, Clone)]
pub struct SyncConfig {
	/// The live feed stops after this long without a block. `None` follows the chain
	/// until the node closes the stream.
	pub idle_timeout: Option<Duration>,
	/// Transactions requested per history page.
	pub page_size: usize,
	/// Upper bound on history pages fetched per backfill.
	pub max_pages: usize,
	/// Retry for history page requests.
	pub page_retry: RetryPolicy,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			idle_timeout: None,
			page_size: 50,
			max_pages: 20,
			page_retry: RetryPolicy::NETWORK_FETCH,
		}
	}
}

/// Follows newly accepted blocks
pub struct LiveBlockSync {
	subscriber: Arc<dyn BlockSubscriber>,
	config: SyncConfig,
	stream: Option<BlockStream>,
}

impl LiveBlockSync {
	pub fn new(subscriber: Arc<dyn BlockSubscriber>, config: SyncConfig) -> Self {
		Self {
			subscriber,
			config,
			stream: None,
		}
	}
}

#[async_trait::async_trait]
impl SyncStrategy for LiveBlockSync {
	async fn prepare(&mut self) -> Result<(), WalletSyncError> {
		if self.stream.is_none() {
			self.stream = Some(self.subscriber.subscribe_blocks().await?);
			info!("Subscribed to block notifications");
		}
		Ok(())
	}

	async fn sync(
		&mut self,
		pipeline: &mut BlockIngestionPipeline,
	) -> Result<IngestionStats, WalletSyncError> {
		self.prepare().await?;
		let Some(mut stream) = self.stream.take() else {
			return Err(WalletSyncError::SyncError("block stream unavailable".to_string()));
		};
		info!("Starting live ingestion for {}", pipeline.wallet());

		loop {
			let next = match self.config.idle_timeout {
				Some(idle) => match tokio::time::timeout(idle, stream.next()).await {
					Ok(next) => next,
					Err(_) => {
						info!("No new blocks for {} seconds, stopping live sync", idle.as_secs());
						break;
					}
				},
				None => stream.next().await,
			};

			match next {
				Some(Ok(block)) => {
					debug!(
						"Processing block {} with {} transactions",
						block.header.hash,
						block.transactions.len()
					);
					pipeline.process_block(block).await;
				}
				Some(Err(e)) => {
					error!("Error in block subscription: {}", e);
					pipeline
						.dispatcher_mut()
						.dispatch(&IngestionEvent::SyncError {
							error: e.to_string(),
							recoverable: true,
						})
						.await;
				}
				None => {
					info!("Block stream closed");
					break;
				}
			}
		}

		let stats = pipeline.take_stats();
		pipeline
			.dispatcher_mut()
			.dispatch(&IngestionEvent::SyncCompleted {
				strategy: self.name(),
				stats: stats.clone(),
			})
			.await;
		Ok(stats)
	}

	fn name(&self) -> &'static str {
		"LiveBlockSync"
	}
}

/// Replays an address's confirmed history from the explorer
pub struct HistoricalBackfill {
	explorer: Arc<dyn ExplorerApi>,
	address: String,
	config: SyncConfig,
}

impl HistoricalBackfill {
	pub fn new(explorer: Arc<dyn ExplorerApi>, address: String, config: SyncConfig) -> Self {
		Self {
			explorer,
			address,
			config,
		}
	}

	/// Pages backwards with the `before` cursor until history is exhausted or the page
	/// limit is reached. Returned newest first.
	async fn fetch_history(&self) -> Result<Vec<FullTransaction>, WalletSyncError> {
		let mut history = Vec::new();
		let mut before: Option<i64> = None;

		for page_number in 0..self.config.max_pages {
			let explorer = self.explorer.clone();
			let address = self.address.clone();
			let limit = self.config.page_size;
			let page = retry_bounded(self.config.page_retry, "history page", || {
				let explorer = explorer.clone();
				let address = address.clone();
				async move {
					explorer
						.full_transactions_page(&address, before, limit)
						.await
						.map_err(|e| match e {
							ExplorerError::HttpError(_) => backoff::Error::transient(e),
							other => backoff::Error::permanent(other),
						})
				}
			})
			.await?;

			let fetched = page.transactions.len();
			history.extend(page.transactions);
			debug!("History page {} returned {} transactions", page_number + 1, fetched);

			match page.next_before {
				Some(cursor) if fetched > 0 && before.is_none_or(|previous| cursor < previous) => {
					before = Some(cursor);
				}
				_ => return Ok(history),
			}
		}

		warn!(
			"Stopped backfill for {} after {} pages",
			self.address, self.config.max_pages
		);
		Ok(history)
	}
}

#[async_trait::async_trait]
impl SyncStrategy for HistoricalBackfill {
	async fn sync(
		&mut self,
		pipeline: &mut BlockIngestionPipeline,
	) -> Result<IngestionStats, WalletSyncError> {
		info!("Starting historical backfill for {}", self.address);
		let history = self.fetch_history().await?;
		info!("Replaying {} historical transactions", history.len());

		// Oldest first, so a handshake is seen before the messages that depend on it.
		for transaction in history.into_iter().rev() {
			let transaction_id = transaction.transaction_id.clone();
			if let Err(e) = pipeline
				.process(SourceTransaction::Historical(transaction))
				.await
			{
				warn!("Failed to ingest historical transaction {}: {}", transaction_id, e);
				pipeline
					.dispatcher_mut()
					.dispatch(&IngestionEvent::SyncError {
						error: e.to_string(),
						recoverable: true,
					})
					.await;
			}
		}

		let stats = pipeline.take_stats();
		pipeline
			.dispatcher_mut()
			.dispatch(&IngestionEvent::SyncCompleted {
				strategy: self.name(),
				stats: stats.clone(),
			})
			.await;
		Ok(stats)
	}

	fn name(&self) -> &'static str {
		"HistoricalBackfill"
	}
}
