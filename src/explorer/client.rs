//!
//! REST client for the chain explorer API.
//!
//! Provides paged access to an address's confirmed transaction history and single
//! transaction lookups. The API indexes blocks some time after the node accepts them, so a
//! lookup may 404 for a transaction that exists; callers retry on [`ExplorerError::NotFound`].

use super::types::*;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

/// Header carrying the cursor of the next (older) history page.
const NEXT_PAGE_BEFORE_HEADER: &str = "X-Next-Page-Before";

/// Read access to the explorer.
#[async_trait::async_trait]
pub trait ExplorerApi: Send + Sync {
	/// Transactions of `address` older than `before` (unix ms), newest first.
	async fn full_transactions_page(
		&self,
		address: &str,
		before: Option<i64>,
		limit: usize,
	) -> Result<TransactionPage, ExplorerError>;

	async fn transaction(&self, transaction_id: &str) -> Result<FullTransaction, ExplorerError>;
}

/// Explorer REST client
#[derive(Clone)]
pub struct KaspaExplorerClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL without trailing slash.
	base_url: String,
}

impl KaspaExplorerClient {
	/// Create a new explorer client.
	///
	/// # Arguments
	/// * `base_url` - The API root, e.g. `https://api.kaspa.org`.
	pub fn new(base_url: String) -> Result<Self, ExplorerError> {
		let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;

		Ok(Self {
			http_client,
			base_url: base_url.trim_end_matches('/').to_string(),
		})
	}
}

#[async_trait::async_trait]
impl ExplorerApi for KaspaExplorerClient {
	async fn full_transactions_page(
		&self,
		address: &str,
		before: Option<i64>,
		limit: usize,
	) -> Result<TransactionPage, ExplorerError> {
		let url = format!(
			"{}/addresses/{}/full-transactions-page",
			self.base_url, address
		);
		let mut query = vec![
			("limit", limit.to_string()),
			("resolve_previous_outpoints", "light".to_string()),
		];
		if let Some(before) = before {
			query.push(("before", before.to_string()));
		}
		debug!("Fetching history page for {} before {:?}", address, before);

		let response = self.http_client.get(&url).query(&query).send().await?;
		if !response.status().is_success() {
			return Err(ExplorerError::Status(response.status().as_u16()));
		}

		let next_before = response
			.headers()
			.get(NEXT_PAGE_BEFORE_HEADER)
			.and_then(|value| value.to_str().ok())
			.and_then(|value| value.parse::<i64>().ok())
			.filter(|cursor| *cursor > 0);
		let transactions: Vec<FullTransaction> = response.json().await?;

		info!(
			"Fetched {} transactions for {} (next cursor {:?})",
			transactions.len(),
			address,
			next_before
		);
		Ok(TransactionPage {
			transactions,
			next_before,
		})
	}

	async fn transaction(&self, transaction_id: &str) -> Result<FullTransaction, ExplorerError> {
		let url = format!("{}/transactions/{}", self.base_url, transaction_id);
		let response = self
			.http_client
			.get(&url)
			.query(&[
				("inputs", "true"),
				("outputs", "true"),
				("resolve_previous_outpoints", "no"),
			])
			.send()
			.await?;

		match response.status() {
			StatusCode::NOT_FOUND => Err(ExplorerError::NotFound(transaction_id.to_string())),
			status if !status.is_success() => Err(ExplorerError::Status(status.as_u16())),
			_ => Ok(response.json().await?),
		}
	}
}
