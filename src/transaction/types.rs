//! Transaction, UTXO and output types in the node's RPC (camelCase JSON) form.

use crate::crypto::Address;
use serde::{Deserialize, Serialize};

/// Native subnetwork id: 20 zero bytes.
pub const NATIVE_SUBNETWORK_ID: &str = "0000000000000000000000000000000000000000";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outpoint {
	pub transaction_id: String,
	pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptPublicKey {
	pub version: u16,
	/// Hex-encoded locking script.
	#[serde(rename = "scriptPublicKey")]
	pub script: String,
}

impl ScriptPublicKey {
	pub fn for_address(address: &Address) -> Self {
		Self {
			version: 0,
			script: hex::encode(address.script_public_key()),
		}
	}

	pub fn script_len(&self) -> usize {
		self.script.len() / 2
	}
}

/// An unspent output owned by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtxoEntry {
	pub outpoint: Outpoint,
	pub address: String,
	pub amount: u64,
	pub script_public_key: ScriptPublicKey,
	pub block_daa_score: u64,
	#[serde(default)]
	pub is_coinbase: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInput {
	pub previous_outpoint: Outpoint,
	/// Hex-encoded signature script; empty until signed.
	pub signature_script: String,
	pub sequence: u64,
	pub sig_op_count: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOutput {
	pub value: u64,
	pub script_public_key: ScriptPublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
	pub version: u16,
	pub inputs: Vec<TransactionInput>,
	pub outputs: Vec<TransactionOutput>,
	pub lock_time: u64,
	pub subnetwork_id: String,
	pub gas: u64,
	/// Hex-encoded opaque payload.
	pub payload: String,
}

/// A requested payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutput {
	pub address: Address,
	pub amount: u64,
}

/// Who absorbs the network and priority fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeePolicy {
	/// Fees come out of the inputs on top of the payment.
	#[default]
	SenderPays,
	/// Fees are deducted from the first payment output.
	ReceiverPays,
}

/// A transaction produced by the generator, unsigned, with the entries it spends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
	pub transaction: Transaction,
	pub utxo_entries: Vec<UtxoEntry>,
	pub mass: u64,
	/// Network fee plus priority fee, in sompi.
	pub fee: u64,
	pub payment_amount: u64,
	pub change_amount: u64,
}

impl PendingTransaction {
	pub fn input_amount(&self) -> u64 {
		self.utxo_entries.iter().map(|e| e.amount).sum()
	}
}
