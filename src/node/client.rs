//!
//! JSON wRPC client for the chain node.
//!
//! Every request is a `{id, method, params}` text frame answered by a frame carrying the same
//! `id` and either `params` or `error`. Subscriptions keep the socket open and receive
//! `{method, params}` notification frames. All methods are async and designed for use with
//! Tokio.

use super::types::*;
use crate::transaction::types::{Transaction, UtxoEntry};
use futures_util::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info};

pub type BlockStream = Pin<Box<dyn Stream<Item = Result<RpcBlock, NodeError>> + Send>>;

/// Source of newly accepted blocks.
#[async_trait::async_trait]
pub trait BlockSubscriber: Send + Sync {
	async fn subscribe_blocks(&self) -> Result<BlockStream, NodeError>;
}

/// Broadcasts signed transactions.
#[async_trait::async_trait]
pub trait TransactionSubmitter: Send + Sync {
	/// Returns the id the node assigned to the accepted transaction.
	async fn submit_transaction(&self, transaction: &Transaction) -> Result<String, NodeError>;
}

/// UTXO queries backing the wallet's UTXO context.
#[async_trait::async_trait]
pub trait UtxoSource: Send + Sync {
	async fn utxos_by_addresses(&self, addresses: &[String]) -> Result<Vec<UtxoEntry>, NodeError>;
	async fn virtual_daa_score(&self) -> Result<u64, NodeError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UtxosByAddressesResponse {
	#[serde(default)]
	entries: Vec<RpcUtxoEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitTransactionResponse {
	transaction_id: String,
}

#[derive(Deserialize)]
struct FeeEstimateResponse {
	estimate: FeeEstimate,
}

#[derive(Deserialize)]
struct BlockAddedNotification {
	block: RpcBlock,
}

/// Node wRPC client
#[derive(Clone)]
pub struct KaspaNodeClient {
	/// WebSocket endpoint of the node's JSON wRPC listener.
	ws_url: String,
	next_id: Arc<AtomicU64>,
}

impl KaspaNodeClient {
	pub fn new(ws_url: String) -> Self {
		Self {
			ws_url,
			next_id: Arc::new(AtomicU64::new(1)),
		}
	}

	/// Performs a single request on a fresh connection.
	pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, NodeError> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		debug!("wRPC {} (id {}) to {}", method, id, self.ws_url);

		let (ws_stream, _) = connect_async(self.ws_url.as_str()).await?;
		let (mut ws_sender, mut ws_receiver) = ws_stream.split();
		ws_sender
			.send(Message::Text(
				json!({ "id": id, "method": method, "params": params }).to_string(),
			))
			.await?;

		while let Some(msg) = ws_receiver.next().await {
			match msg? {
				Message::Text(text) => {
					let parsed: Value = serde_json::from_str(&text)?;
					if parsed.get("id").and_then(Value::as_u64) != Some(id) {
						continue;
					}
					let _ = ws_sender.close().await;
					return parse_response(parsed);
				}
				Message::Close(_) => break,
				_ => continue,
			}
		}
		Err(NodeError::ConnectionClosed)
	}

	pub async fn get_block_dag_info(&self) -> Result<BlockDagInfo, NodeError> {
		self.call("getBlockDagInfo", json!({})).await
	}

	pub async fn get_fee_estimate(&self) -> Result<FeeEstimate, NodeError> {
		let response: FeeEstimateResponse = self.call("getFeeEstimate", json!({})).await?;
		Ok(response.estimate)
	}
}

#[async_trait::async_trait]
impl UtxoSource for KaspaNodeClient {
	async fn utxos_by_addresses(&self, addresses: &[String]) -> Result<Vec<UtxoEntry>, NodeError> {
		let response: UtxosByAddressesResponse = self
			.call("getUtxosByAddresses", json!({ "addresses": addresses }))
			.await?;
		Ok(response.entries.into_iter().map(UtxoEntry::from).collect())
	}

	async fn virtual_daa_score(&self) -> Result<u64, NodeError> {
		Ok(self.get_block_dag_info().await?.virtual_daa_score)
	}
}

#[async_trait::async_trait]
impl TransactionSubmitter for KaspaNodeClient {
	async fn submit_transaction(&self, transaction: &Transaction) -> Result<String, NodeError> {
		let response: SubmitTransactionResponse = self
			.call(
				"submitTransaction",
				json!({ "transaction": transaction, "allowOrphan": false }),
			)
			.await?;
		info!("Submitted transaction {}", response.transaction_id);
		Ok(response.transaction_id)
	}
}

#[async_trait::async_trait]
impl BlockSubscriber for KaspaNodeClient {
	/// Subscribe to `blockAdded` notifications.
	///
	/// # Returns
	/// A pinned async stream of blocks, or errors for frames that could not be read.
	async fn subscribe_blocks(&self) -> Result<BlockStream, NodeError> {
		debug!(
			"Attempting WebSocket connection for block subscription to: {}",
			self.ws_url
		);

		let (ws_stream, response) = connect_async(self.ws_url.as_str()).await?;
		debug!(
			"WebSocket connection established for blocks, response status: {}",
			response.status()
		);
		let (mut ws_sender, mut ws_receiver) = ws_stream.split();

		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let subscribe_message = json!({
			"id": id,
			"method": "subscribeBlockAdded",
			"params": {}
		});
		ws_sender
			.send(Message::Text(subscribe_message.to_string()))
			.await?;

		// Wait for the subscription acknowledgement
		loop {
			match ws_receiver.next().await {
				Some(msg) => {
					if let Message::Text(text) = msg? {
						let parsed: Value = serde_json::from_str(&text)?;
						if parsed.get("id").and_then(Value::as_u64) == Some(id) {
							if let Some(error) = parsed.get("error") {
								return Err(NodeError::RpcError(error_message(error)));
							}
							break;
						}
					}
				}
				None => return Err(NodeError::ConnectionClosed),
			}
		}
		info!("Subscribed to block notifications");

		let stream = ws_receiver.filter_map(|msg| async move {
			match msg {
				Ok(Message::Text(text)) => match parse_notification(&text) {
					Ok(block) => block.map(Ok),
					Err(e) => {
						error!("Failed to parse block notification: {}", e);
						Some(Err(e))
					}
				},
				Ok(Message::Close(_)) => {
					info!("Block subscription closed by node");
					None
				}
				Ok(_) => None,
				Err(e) => Some(Err(NodeError::WebSocketError(e))),
			}
		});

		Ok(Box::pin(stream))
	}
}

fn error_message(error: &Value) -> String {
	error
		.get("message")
		.and_then(Value::as_str)
		.map(str::to_string)
		.unwrap_or_else(|| error.to_string())
}

fn parse_response<T: DeserializeOwned>(parsed: Value) -> Result<T, NodeError> {
	if let Some(error) = parsed.get("error").filter(|e| !e.is_null()) {
		return Err(NodeError::RpcError(error_message(error)));
	}
	let params = parsed.get("params").cloned().ok_or(NodeError::NoData)?;
	Ok(serde_json::from_value(params)?)
}

/// `Ok(None)` for frames that are not block notifications.
fn parse_notification(text: &str) -> Result<Option<RpcBlock>, NodeError> {
	let parsed: Value = serde_json::from_str(text)?;
	match parsed.get("method").and_then(Value::as_str) {
		Some("blockAddedNotification") => {
			let params = parsed.get("params").cloned().ok_or(NodeError::NoData)?;
			let notification: BlockAddedNotification = serde_json::from_value(params)?;
			Ok(Some(notification.block))
		}
		Some(other) => {
			debug!("Ignoring notification: {}", other);
			Ok(None)
		}
		None => Ok(None),
	}
}
