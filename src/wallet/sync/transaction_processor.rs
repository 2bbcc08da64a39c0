use crate::explorer::{ExplorerApi, ExplorerError, FullTransaction};
use crate::node::RpcTransaction;
use crate::protocol::is_protocol_payload;
use crate::utils::{RetryPolicy, now_millis, retry_bounded};
use std::sync::Arc;
use tracing::{debug, warn};

/// A transaction as delivered by one of the two feeds.
#[derive(Debug, Clone)]
pub enum SourceTransaction {
	/// From a `blockAddedNotification`; `block_time` is the block header timestamp.
	Live {
		transaction: RpcTransaction,
		block_time: i64,
	},
	/// From the explorer's address history.
	Historical(FullTransaction),
}

/// Output spent by a transaction's first input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputReference {
	pub transaction_id: String,
	pub index: u32,
	/// Known when the feed already resolved the previous outpoint.
	pub address: Option<String>,
}

/// Feed-independent view of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalTransaction {
	pub transaction_id: String,
	pub payload_hex: String,
	pub timestamp_ms: i64,
	/// `None` for coinbase transactions.
	pub first_input: Option<InputReference>,
	/// Address of the first output.
	pub recipient_address: Option<String>,
	/// Value of the first output.
	pub amount: u64,
}

impl SourceTransaction {
	pub fn transaction_id(&self) -> Option<&str> {
		match self {
			SourceTransaction::Live { transaction, .. } => transaction.transaction_id(),
			SourceTransaction::Historical(tx) => Some(&tx.transaction_id),
		}
	}

	pub fn payload_hex(&self) -> &str {
		match self {
			SourceTransaction::Live { transaction, .. } => &transaction.payload,
			SourceTransaction::Historical(tx) => tx.payload.as_deref().unwrap_or_default(),
		}
	}

	pub fn is_protocol(&self) -> bool {
		is_protocol_payload(self.payload_hex())
	}

	/// `None` when the feed did not report a transaction id.
	pub fn into_canonical(self) -> Option<CanonicalTransaction> {
		match self {
			SourceTransaction::Live {
				transaction,
				block_time,
			} => {
				let transaction_id = transaction.transaction_id()?.to_string();
				let timestamp_ms = transaction
					.verbose_data
					.as_ref()
					.and_then(|data| data.block_time)
					.filter(|time| *time > 0)
					.unwrap_or(block_time);
				let first_input = transaction.inputs.first().map(|input| InputReference {
					transaction_id: input.previous_outpoint.transaction_id.clone(),
					index: input.previous_outpoint.index,
					address: None,
				});
				let first_output = transaction.outputs.first();
				Some(CanonicalTransaction {
					transaction_id,
					payload_hex: transaction.payload,
					timestamp_ms,
					first_input,
					recipient_address: first_output
						.and_then(|output| output.verbose_data.as_ref())
						.map(|data| data.script_public_key_address.clone()),
					amount: first_output.map(|output| output.value).unwrap_or_default(),
				})
			}
			SourceTransaction::Historical(tx) => {
				let first_input = tx.inputs().first().map(|input| InputReference {
					transaction_id: input.previous_outpoint_hash.clone(),
					index: input.previous_outpoint_index,
					address: input.previous_outpoint_address.clone(),
				});
				let first_output = tx.outputs().iter().min_by_key(|output| output.index);
				Some(CanonicalTransaction {
					recipient_address: first_output
						.and_then(|output| output.script_public_key_address.clone()),
					amount: first_output.map(|output| output.amount).unwrap_or_default(),
					first_input,
					timestamp_ms: tx.block_time.unwrap_or_else(now_millis),
					payload_hex: tx.payload.unwrap_or_default(),
					transaction_id: tx.transaction_id,
				})
			}
		}
	}
}

/// Resolves transaction attribution against the explorer.
#[derive(Clone)]
pub struct TransactionProcessor {
	explorer: Arc<dyn ExplorerApi>,
	retry: RetryPolicy,
}

impl TransactionProcessor {
	pub fn new(explorer: Arc<dyn ExplorerApi>) -> Self {
		Self {
			explorer,
			retry: RetryPolicy::NETWORK_FETCH,
		}
	}

	pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;
		self
	}

	/// Address owning the output spent by the first input.
	///
	/// Freshly accepted transactions may not be indexed yet, so a 404 on the previous
	/// transaction is retried. `Ok(None)` means the sender cannot be determined: a coinbase
	/// transaction, an unknown output index, or a lookup that stayed 404.
	pub async fn resolve_sender(
		&self,
		transaction: &CanonicalTransaction,
	) -> Result<Option<String>, ExplorerError> {
		let Some(input) = &transaction.first_input else {
			return Ok(None);
		};
		if let Some(address) = &input.address {
			return Ok(Some(address.clone()));
		}

		let explorer = self.explorer.clone();
		let previous_id = input.transaction_id.clone();
		let label = format!("lookup of {}", previous_id);
		let lookup = retry_bounded(self.retry, &label, || {
			let explorer = explorer.clone();
			let previous_id = previous_id.clone();
			async move {
				explorer
					.transaction(&previous_id)
					.await
					.map_err(|e| match e {
						ExplorerError::NotFound(_) | ExplorerError::HttpError(_) => {
							backoff::Error::transient(e)
						}
						other => backoff::Error::permanent(other),
					})
			}
		})
		.await;

		let previous = match lookup {
			Ok(previous) => previous,
			Err(ExplorerError::NotFound(id)) => {
				warn!(
					"Previous transaction {} of {} never became available",
					id, transaction.transaction_id
				);
				return Ok(None);
			}
			Err(e) => return Err(e),
		};

		let sender = previous
			.outputs()
			.iter()
			.find(|output| output.index == input.index)
			.and_then(|output| output.script_public_key_address.clone());
		debug!(
			"Resolved sender of {} to {:?}",
			transaction.transaction_id, sender
		);
		Ok(sender)
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use crate::explorer::{FullTransactionInput, FullTransactionOutput, TransactionPage};
	use crate::node::{
		RpcTransactionInput, RpcTransactionOutput, RpcTransactionOutputVerboseData,
		RpcTransactionVerboseData,
	};
	use crate::transaction::types::{Outpoint, ScriptPublicKey};
	use parking_lot::Mutex;
	use std::collections::HashMap;
	use std::time::Duration;

	pub(crate) const FAST: RetryPolicy = RetryPolicy::new(3, Duration::ZERO);

	/// In-memory explorer. `history` is newest first.
	#[derive(Default)]
	pub(crate) struct FakeExplorer {
		pub(crate) transactions: Mutex<HashMap<String, FullTransaction>>,
		pub(crate) history: Mutex<Vec<FullTransaction>>,
		/// Lookups answered with 404 before `transactions` is consulted.
		pub(crate) not_found_responses: Mutex<u32>,
		pub(crate) lookups: Mutex<u32>,
		pub(crate) page_requests: Mutex<Vec<Option<i64>>>,
	}

	#[async_trait::async_trait]
	impl ExplorerApi for FakeExplorer {
		async fn full_transactions_page(
			&self,
			_address: &str,
			before: Option<i64>,
			limit: usize,
		) -> Result<TransactionPage, ExplorerError> {
			self.page_requests.lock().push(before);
			let older: Vec<FullTransaction> = self
				.history
				.lock()
				.iter()
				.filter(|tx| before.is_none_or(|cursor| tx.block_time.unwrap_or_default() < cursor))
				.cloned()
				.collect();
			let has_more = older.len() > limit;
			let transactions: Vec<FullTransaction> = older.into_iter().take(limit).collect();
			let next_before = if has_more {
				transactions.last().and_then(|tx| tx.block_time)
			} else {
				None
			};
			Ok(TransactionPage {
				transactions,
				next_before,
			})
		}

		async fn transaction(&self, transaction_id: &str) -> Result<FullTransaction, ExplorerError> {
			*self.lookups.lock() += 1;
			{
				let mut not_found = self.not_found_responses.lock();
				if *not_found > 0 {
					*not_found -= 1;
					return Err(ExplorerError::NotFound(transaction_id.to_string()));
				}
			}
			self.transactions
				.lock()
				.get(transaction_id)
				.cloned()
				.ok_or_else(|| ExplorerError::NotFound(transaction_id.to_string()))
		}
	}

	/// History entry with a resolved first input.
	pub(crate) fn full_tx(
		id: &str,
		sender: &str,
		recipient: &str,
		payload_hex: &str,
		block_time: i64,
	) -> FullTransaction {
		FullTransaction {
			transaction_id: id.to_string(),
			payload: Some(payload_hex.to_string()),
			block_time: Some(block_time),
			is_accepted: Some(true),
			inputs: Some(vec![FullTransactionInput {
				previous_outpoint_hash: format!("prev-{}", id),
				previous_outpoint_index: 0,
				previous_outpoint_address: Some(sender.to_string()),
				previous_outpoint_amount: Some(100_000_000),
			}]),
			outputs: Some(vec![FullTransactionOutput {
				index: 0,
				amount: 20_000_000,
				script_public_key_address: Some(recipient.to_string()),
			}]),
		}
	}

	/// Block transaction spending output 0 of `previous_id`.
	pub(crate) fn rpc_tx(id: &str, previous_id: &str, recipient: &str, payload_hex: &str) -> RpcTransaction {
		RpcTransaction {
			inputs: vec![RpcTransactionInput {
				previous_outpoint: Outpoint {
					transaction_id: previous_id.to_string(),
					index: 0,
				},
				signature_script: String::new(),
			}],
			outputs: vec![RpcTransactionOutput {
				value: 20_000_000,
				script_public_key: ScriptPublicKey {
					version: 0,
					script: String::new(),
				},
				verbose_data: Some(RpcTransactionOutputVerboseData {
					script_public_key_address: recipient.to_string(),
				}),
			}],
			payload: payload_hex.to_string(),
			verbose_data: Some(RpcTransactionVerboseData {
				transaction_id: id.to_string(),
				block_time: None,
			}),
		}
	}

	/// Explorer entry whose output 0 belongs to `owner`.
	pub(crate) fn funding_tx(id: &str, owner: &str) -> FullTransaction {
		let mut tx = full_tx(id, "kaspa:funder", owner, "", 1);
		tx.payload = None;
		tx
	}

	#[test]
	fn live_transaction_uses_block_time_and_first_output() {
		let source = SourceTransaction::Live {
			transaction: rpc_tx("tx1", "prev", "kaspa:bob", "636970685f6d73673a31"),
			block_time: 1_700_000_000_123,
		};
		assert!(source.is_protocol());
		assert_eq!(source.transaction_id(), Some("tx1"));

		let canonical = source.into_canonical().unwrap();
		assert_eq!(canonical.timestamp_ms, 1_700_000_000_123);
		assert_eq!(canonical.recipient_address.as_deref(), Some("kaspa:bob"));
		assert_eq!(canonical.amount, 20_000_000);
		assert_eq!(
			canonical.first_input,
			Some(InputReference {
				transaction_id: "prev".to_string(),
				index: 0,
				address: None,
			})
		);
	}

	#[test]
	fn historical_transaction_picks_lowest_output_index() {
		let mut tx = full_tx("tx2", "kaspa:alice", "kaspa:bob", "", 42);
		tx.outputs = Some(vec![
			FullTransactionOutput {
				index: 1,
				amount: 5,
				script_public_key_address: Some("kaspa:change".to_string()),
			},
			FullTransactionOutput {
				index: 0,
				amount: 7,
				script_public_key_address: Some("kaspa:bob".to_string()),
			},
		]);

		let canonical = SourceTransaction::Historical(tx).into_canonical().unwrap();
		assert_eq!(canonical.recipient_address.as_deref(), Some("kaspa:bob"));
		assert_eq!(canonical.amount, 7);
		assert_eq!(canonical.timestamp_ms, 42);
		assert!(!is_protocol_payload(&canonical.payload_hex));
	}

	#[tokio::test]
	async fn resolved_input_skips_the_lookup() {
		let explorer = Arc::new(FakeExplorer::default());
		let processor = TransactionProcessor::new(explorer.clone()).with_retry_policy(FAST);
		let canonical = SourceTransaction::Historical(full_tx("tx", "kaspa:alice", "kaspa:bob", "", 1))
			.into_canonical()
			.unwrap();

		let sender = processor.resolve_sender(&canonical).await.unwrap();
		assert_eq!(sender.as_deref(), Some("kaspa:alice"));
		assert_eq!(*explorer.lookups.lock(), 0);
	}

	#[tokio::test]
	async fn lookup_retries_until_indexed() {
		let explorer = Arc::new(FakeExplorer::default());
		explorer
			.transactions
			.lock()
			.insert("prev".to_string(), funding_tx("prev", "kaspa:alice"));
		*explorer.not_found_responses.lock() = 2;
		let processor = TransactionProcessor::new(explorer.clone()).with_retry_policy(FAST);
		let canonical = SourceTransaction::Live {
			transaction: rpc_tx("tx", "prev", "kaspa:bob", ""),
			block_time: 1,
		}
		.into_canonical()
		.unwrap();

		let sender = processor.resolve_sender(&canonical).await.unwrap();
		assert_eq!(sender.as_deref(), Some("kaspa:alice"));
		assert_eq!(*explorer.lookups.lock(), 3);
	}

	#[tokio::test]
	async fn lookup_gives_up_with_no_sender() {
		let explorer = Arc::new(FakeExplorer::default());
		let processor = TransactionProcessor::new(explorer.clone()).with_retry_policy(FAST);
		let canonical = SourceTransaction::Live {
			transaction: rpc_tx("tx", "missing", "kaspa:bob", ""),
			block_time: 1,
		}
		.into_canonical()
		.unwrap();

		assert_eq!(processor.resolve_sender(&canonical).await.unwrap(), None);
		assert_eq!(*explorer.lookups.lock(), 3);
	}
}
