//! Types for the explorer REST API

use serde::{Deserialize, Deserializer, Serialize};

/// Accepts `3` as well as `"3"`; the API is not consistent about index types.
fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum NumberOrString {
		Number(u32),
		String(String),
	}

	match NumberOrString::deserialize(deserializer)? {
		NumberOrString::Number(n) => Ok(n),
		NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
	}
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum NumberOrString {
		Number(u64),
		String(String),
	}

	match NumberOrString::deserialize(deserializer)? {
		NumberOrString::Number(n) => Ok(n),
		NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
	}
}

/// Transaction input as returned by the explorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullTransactionInput {
	/// Id of the transaction that created the spent output.
	pub previous_outpoint_hash: String,
	#[serde(deserialize_with = "lenient_u32")]
	pub previous_outpoint_index: u32,
	/// Present when the request asked for previous outpoints to be resolved.
	#[serde(default)]
	pub previous_outpoint_address: Option<String>,
	#[serde(default)]
	pub previous_outpoint_amount: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullTransactionOutput {
	#[serde(deserialize_with = "lenient_u32")]
	pub index: u32,
	#[serde(deserialize_with = "lenient_u64")]
	pub amount: u64,
	#[serde(default)]
	pub script_public_key_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullTransaction {
	pub transaction_id: String,
	/// Hex-encoded payload.
	#[serde(default)]
	pub payload: Option<String>,
	/// Unix milliseconds.
	#[serde(default)]
	pub block_time: Option<i64>,
	#[serde(default)]
	pub is_accepted: Option<bool>,
	#[serde(default)]
	pub inputs: Option<Vec<FullTransactionInput>>,
	#[serde(default)]
	pub outputs: Option<Vec<FullTransactionOutput>>,
}

impl FullTransaction {
	pub fn inputs(&self) -> &[FullTransactionInput] {
		self.inputs.as_deref().unwrap_or_default()
	}

	pub fn outputs(&self) -> &[FullTransactionOutput] {
		self.outputs.as_deref().unwrap_or_default()
	}
}

/// One page of an address history, newest first.
#[derive(Debug, Clone, Default)]
pub struct TransactionPage {
	pub transactions: Vec<FullTransaction>,
	/// Cursor for the next (older) page; `None` when history is exhausted.
	pub next_before: Option<i64>,
}

/// Error types for explorer operations
#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
	#[error("Not found: {0}")]
	NotFound(String),

	#[error("HTTP status {0}")]
	Status(u16),

	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),
}
