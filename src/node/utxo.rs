//! Wallet UTXO context over the node's UTXO index.
//!
//! Tracks a set of addresses, splits their UTXOs into mature and pending by DAA score depth,
//! and hides outputs already spent by transactions this wallet submitted but the node has
//! not yet removed from its index.

use super::client::UtxoSource;
use super::types::{NetworkConfig, NodeError};
use crate::transaction::types::{Outpoint, PendingTransaction, UtxoEntry};
use crate::utils::{RetryPolicy, retry_bounded};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balance {
	pub mature: u64,
	pub pending: u64,
	/// Value leaving the wallet in submitted, unconfirmed transactions.
	pub outgoing: u64,
	pub mature_utxo_count: usize,
	pub pending_utxo_count: usize,
}

#[async_trait::async_trait]
pub trait UtxoContext: Send + Sync {
	async fn track_addresses(&self, addresses: &[String]) -> Result<(), NodeError>;
	/// Forgets tracked addresses and outgoing transactions.
	fn clear(&self);
	async fn balance(&self) -> Result<Balance, NodeError>;
	async fn mature_utxos(&self) -> Result<Vec<UtxoEntry>, NodeError>;
	/// Records a submitted transaction so its inputs are no longer offered.
	fn register_outgoing(&self, pending: &PendingTransaction);
}

#[derive(Debug)]
struct OutgoingTransaction {
	inputs: Vec<Outpoint>,
	amount: u64,
}

#[derive(Debug, Default)]
struct ContextState {
	tracked: Vec<String>,
	outgoing: Vec<OutgoingTransaction>,
}

pub struct RpcUtxoContext {
	source: Arc<dyn UtxoSource>,
	coinbase_maturity: u64,
	user_maturity: u64,
	state: Mutex<ContextState>,
}

struct Snapshot {
	mature: Vec<UtxoEntry>,
	pending: Vec<UtxoEntry>,
	outgoing: u64,
}

impl RpcUtxoContext {
	pub fn new(source: Arc<dyn UtxoSource>, network: &NetworkConfig) -> Self {
		Self {
			source,
			coinbase_maturity: network.coinbase_maturity,
			user_maturity: network.user_maturity,
			state: Mutex::new(ContextState::default()),
		}
	}

	pub fn tracked_addresses(&self) -> Vec<String> {
		self.state.lock().tracked.clone()
	}

	fn is_mature(&self, entry: &UtxoEntry, virtual_daa_score: u64) -> bool {
		let depth = if entry.is_coinbase {
			self.coinbase_maturity
		} else {
			self.user_maturity
		};
		virtual_daa_score >= entry.block_daa_score.saturating_add(depth)
	}

	async fn snapshot(&self) -> Result<Snapshot, NodeError> {
		let tracked = self.tracked_addresses();
		if tracked.is_empty() {
			return Ok(Snapshot {
				mature: Vec::new(),
				pending: Vec::new(),
				outgoing: 0,
			});
		}

		let source = self.source.clone();
		let entries = retry_bounded(RetryPolicy::UTXO_RESUBSCRIBE, "UTXO refresh", || {
			let source = source.clone();
			let tracked = tracked.clone();
			async move {
				source
					.utxos_by_addresses(&tracked)
					.await
					.map_err(backoff::Error::transient)
			}
		})
		.await?;
		let virtual_daa_score = self.source.virtual_daa_score().await?;

		let (spent, outgoing) = {
			let present: HashSet<&Outpoint> = entries.iter().map(|e| &e.outpoint).collect();
			let mut state = self.state.lock();
			// A transaction is settled once none of its inputs remain in the index.
			state
				.outgoing
				.retain(|tx| tx.inputs.iter().any(|input| present.contains(input)));
			let spent: HashSet<Outpoint> = state
				.outgoing
				.iter()
				.flat_map(|tx| tx.inputs.iter().cloned())
				.collect();
			let outgoing = state.outgoing.iter().map(|tx| tx.amount).sum();
			(spent, outgoing)
		};

		let (mature, pending): (Vec<UtxoEntry>, Vec<UtxoEntry>) = entries
			.into_iter()
			.filter(|entry| !spent.contains(&entry.outpoint))
			.partition(|entry| self.is_mature(entry, virtual_daa_score));
		Ok(Snapshot {
			mature,
			pending,
			outgoing,
		})
	}
}

#[async_trait::async_trait]
impl UtxoContext for RpcUtxoContext {
	async fn track_addresses(&self, addresses: &[String]) -> Result<(), NodeError> {
		{
			let mut state = self.state.lock();
			for address in addresses {
				if !state.tracked.contains(address) {
					state.tracked.push(address.clone());
				}
			}
		}
		let snapshot = self.snapshot().await?;
		info!(
			"Tracking {} addresses ({} mature, {} pending UTXOs)",
			self.state.lock().tracked.len(),
			snapshot.mature.len(),
			snapshot.pending.len()
		);
		Ok(())
	}

	fn clear(&self) {
		let mut state = self.state.lock();
		state.tracked.clear();
		state.outgoing.clear();
		debug!("UTXO context cleared");
	}

	async fn balance(&self) -> Result<Balance, NodeError> {
		let snapshot = self.snapshot().await?;
		Ok(Balance {
			mature: snapshot.mature.iter().map(|e| e.amount).sum(),
			pending: snapshot.pending.iter().map(|e| e.amount).sum(),
			outgoing: snapshot.outgoing,
			mature_utxo_count: snapshot.mature.len(),
			pending_utxo_count: snapshot.pending.len(),
		})
	}

	async fn mature_utxos(&self) -> Result<Vec<UtxoEntry>, NodeError> {
		Ok(self.snapshot().await?.mature)
	}

	fn register_outgoing(&self, pending: &PendingTransaction) {
		let amount = pending.input_amount().saturating_sub(pending.change_amount);
		self.state.lock().outgoing.push(OutgoingTransaction {
			inputs: pending
				.utxo_entries
				.iter()
				.map(|e| e.outpoint.clone())
				.collect(),
			amount,
		});
		debug!("Registered outgoing transaction of {} sompi", amount);
	}
}
