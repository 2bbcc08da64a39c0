//! Types for the node's JSON wRPC interface

use crate::transaction::types::{Outpoint, ScriptPublicKey, UtxoEntry};
use serde::{Deserialize, Serialize};

/// Block header fields used by ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlockHeader {
	pub hash: String,
	/// Unix milliseconds.
	pub timestamp: i64,
	#[serde(default)]
	pub daa_score: u64,
}

/// A block as delivered by `blockAddedNotification`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
	pub header: RpcBlockHeader,
	#[serde(default)]
	pub transactions: Vec<RpcTransaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransactionInput {
	pub previous_outpoint: Outpoint,
	#[serde(default)]
	pub signature_script: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransactionOutputVerboseData {
	pub script_public_key_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransactionOutput {
	pub value: u64,
	pub script_public_key: ScriptPublicKey,
	#[serde(default)]
	pub verbose_data: Option<RpcTransactionOutputVerboseData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransactionVerboseData {
	pub transaction_id: String,
	#[serde(default)]
	pub block_time: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
	#[serde(default)]
	pub inputs: Vec<RpcTransactionInput>,
	#[serde(default)]
	pub outputs: Vec<RpcTransactionOutput>,
	/// Hex-encoded payload.
	#[serde(default)]
	pub payload: String,
	#[serde(default)]
	pub verbose_data: Option<RpcTransactionVerboseData>,
}

impl RpcTransaction {
	pub fn transaction_id(&self) -> Option<&str> {
		self.verbose_data
			.as_ref()
			.map(|data| data.transaction_id.as_str())
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcUtxoEntryData {
	pub amount: u64,
	pub script_public_key: ScriptPublicKey,
	pub block_daa_score: u64,
	#[serde(default)]
	pub is_coinbase: bool,
}

/// One item of a `getUtxosByAddresses` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcUtxoEntry {
	pub address: String,
	pub outpoint: Outpoint,
	pub utxo_entry: RpcUtxoEntryData,
}

impl From<RpcUtxoEntry> for UtxoEntry {
	fn from(entry: RpcUtxoEntry) -> Self {
		UtxoEntry {
			outpoint: entry.outpoint,
			address: entry.address,
			amount: entry.utxo_entry.amount,
			script_public_key: entry.utxo_entry.script_public_key,
			block_daa_score: entry.utxo_entry.block_daa_score,
			is_coinbase: entry.utxo_entry.is_coinbase,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDagInfo {
	pub network: String,
	pub virtual_daa_score: u64,
	#[serde(default)]
	pub block_count: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeerateBucket {
	/// Sompi per gram of mass.
	pub feerate: f64,
	pub estimated_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeEstimate {
	pub priority_bucket: FeerateBucket,
	#[serde(default)]
	pub normal_buckets: Vec<FeerateBucket>,
	#[serde(default)]
	pub low_buckets: Vec<FeerateBucket>,
}

/// Endpoint and consensus parameters of the network the wallet runs on.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
	/// Address prefix, e.g. `kaspa` or `kaspatest`.
	pub prefix: String,
	pub node_url: String,
	pub explorer_url: String,
	/// DAA score depth before a coinbase output is spendable.
	pub coinbase_maturity: u64,
	/// DAA score depth before a regular output counts as mature.
	pub user_maturity: u64,
}

impl Default for NetworkConfig {
	fn default() -> Self {
		Self {
			prefix: "kaspa".to_string(),
			node_url: "ws://127.0.0.1:18110".to_string(),
			explorer_url: "https://api.kaspa.org".to_string(),
			coinbase_maturity: 100,
			user_maturity: 10,
		}
	}
}

/// Error types for node RPC operations
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
	#[error("RPC error: {0}")]
	RpcError(String),

	#[error("No data returned")]
	NoData,

	#[error("WebSocket error: {0}")]
	WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("Connection closed before a response arrived")]
	ConnectionClosed,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn block_notification_deserializes() {
		let raw = r#"{
			"header": {"hash": "ab", "timestamp": 1700000000000, "daaScore": 42},
			"transactions": [{
				"inputs": [{"previousOutpoint": {"transactionId": "01", "index": 2}, "signatureScript": ""}],
				"outputs": [{
					"value": 100,
					"scriptPublicKey": {"version": 0, "scriptPublicKey": "20ac"},
					"verboseData": {"scriptPublicKeyAddress": "kaspatest:qq"}
				}],
				"payload": "636970685f6d73673a",
				"verboseData": {"transactionId": "ff"}
			}]
		}"#;

		let block: RpcBlock = serde_json::from_str(raw).unwrap();
		assert_eq!(block.header.daa_score, 42);
		let tx = &block.transactions[0];
		assert_eq!(tx.transaction_id(), Some("ff"));
		assert_eq!(tx.inputs[0].previous_outpoint.index, 2);
		assert_eq!(
			tx.outputs[0].verbose_data.as_ref().unwrap().script_public_key_address,
			"kaspatest:qq"
		);
	}

	#[test]
	fn utxo_entry_converts() {
		let raw = r#"{
			"address": "kaspatest:qq",
			"outpoint": {"transactionId": "aa", "index": 1},
			"utxoEntry": {
				"amount": 5,
				"scriptPublicKey": {"version": 0, "scriptPublicKey": "20ac"},
				"blockDaaScore": 7
			}
		}"#;
		let entry: UtxoEntry = serde_json::from_str::<RpcUtxoEntry>(raw).unwrap().into();
		assert_eq!(entry.amount, 5);
		assert_eq!(entry.block_daa_score, 7);
		assert!(!entry.is_coinbase);
	}
}
