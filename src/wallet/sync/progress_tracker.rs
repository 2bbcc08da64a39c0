//! Deduplication and statistics for message ingestion.
//!
//! [`ProcessedSet`] remembers the most recently handled transaction ids so a transaction seen
//! by both the live feed and the historical backfill is only worked on once per run.
//! [`IngestionStats`] counts what happened to every scanned transaction.

use std::collections::{HashSet, VecDeque};
use tracing::info;

/// Default number of transaction ids remembered by [`ProcessedSet`].
pub const PROCESSED_SET_CAPACITY: usize = 1000;

/// Bounded set of processed transaction ids with first-in first-out eviction.
#[derive(Debug, Clone)]
pub struct ProcessedSet {
	capacity: usize,
	order: VecDeque<String>,
	ids: HashSet<String>,
}

impl Default for ProcessedSet {
	fn default() -> Self {
		Self::new(PROCESSED_SET_CAPACITY)
	}
}

impl ProcessedSet {
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity: capacity.max(1),
			order: VecDeque::new(),
			ids: HashSet::new(),
		}
	}

	pub fn contains(&self, transaction_id: &str) -> bool {
		self.ids.contains(transaction_id)
	}

	/// Returns `false` if the id was already present. Evicts the oldest id when full.
	pub fn insert(&mut self, transaction_id: &str) -> bool {
		if self.ids.contains(transaction_id) {
			return false;
		}
		if self.order.len() == self.capacity {
			if let Some(oldest) = self.order.pop_front() {
				self.ids.remove(&oldest);
			}
		}
		self.order.push_back(transaction_id.to_string());
		self.ids.insert(transaction_id.to_string());
		true
	}

	pub fn len(&self) -> usize {
		self.order.len()
	}

	pub fn is_empty(&self) -> bool {
		self.order.is_empty()
	}
}

/// Counters for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionStats {
	/// Transactions carrying a protocol payload.
	pub scanned: usize,
	/// Messages newly written to the sink.
	pub stored: usize,
	/// Duplicates, irrelevant or malformed transactions.
	pub skipped: usize,
	/// Relevant transactions no wallet key could decrypt.
	pub undecryptable: usize,
	/// Handshakes that changed conversation state.
	pub handshakes: usize,
	/// Scanned count at the last progress log line.
	last_logged: usize,
}

impl IngestionStats {
	/// Logs every 1000 scanned transactions, or always when forced.
	pub fn log_progress(&mut self, force: bool) {
		let since_last = self.scanned.saturating_sub(self.last_logged);
		if force || since_last >= 1000 {
			info!("Ingestion progress: {}", self.summary());
			self.last_logged = self.scanned;
		}
	}

	pub fn merge(&mut self, other: &IngestionStats) {
		self.scanned += other.scanned;
		self.stored += other.stored;
		self.skipped += other.skipped;
		self.undecryptable += other.undecryptable;
		self.handshakes += other.handshakes;
	}

	pub fn summary(&self) -> String {
		format!(
			"{} scanned, {} stored, {} skipped, {} undecryptable{}",
			self.scanned,
			self.stored,
			self.skipped,
			self.undecryptable,
			if self.handshakes == 0 {
				String::new()
			} else {
				format!(" ({} handshakes)", self.handshakes)
			}
		)
	}
}
