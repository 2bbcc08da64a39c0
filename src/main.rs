use ciph_msg_engine::crypto::{Address, EciesCipher, PrivateKey, StaticKeySource};
use ciph_msg_engine::explorer::KaspaExplorerClient;
use ciph_msg_engine::messaging::{
	ConversationManager, DecryptionCache, DecryptionConfig, DecryptionEngine, MessageSink,
};
use ciph_msg_engine::node::{KaspaNodeClient, NetworkConfig};
use ciph_msg_engine::transaction::KAS_DECIMALS;
use ciph_msg_engine::utils::format_token_amount;
use ciph_msg_engine::wallet::sync::{
	BlockIngestionPipeline, EventDispatcher, FileCacheStore, FileConversationRepository,
	FileMessageRepository, HistoricalBackfill, IngestionOrchestrator, LiveBlockSync,
	LoggingEventHandler, SyncConfig, TransactionProcessor,
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

fn env_or(name: &str, default: &str) -> String {
	std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn network_from_env() -> NetworkConfig {
	let defaults = NetworkConfig::default();
	NetworkConfig {
		prefix: env_or("KASPA_PREFIX", &defaults.prefix),
		node_url: env_or("KASPA_NODE_URL", &defaults.node_url),
		explorer_url: env_or("KASPA_EXPLORER_URL", &defaults.explorer_url),
		..defaults
	}
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting message ingestion");
	let network = network_from_env();

	let address: Address = match std::env::var("KASPA_ADDRESS").map(|a| a.parse::<Address>()) {
		Ok(Ok(address)) => address,
		Ok(Err(e)) => {
			error!("Invalid KASPA_ADDRESS: {}", e);
			return;
		}
		Err(_) => {
			error!("KASPA_ADDRESS is not set");
			return;
		}
	};
	let Some(key) = std::env::var("KASPA_PRIVATE_KEY")
		.ok()
		.and_then(|hex| PrivateKey::from_hex(&hex))
	else {
		error!("KASPA_PRIVATE_KEY must be a 32-byte hex key");
		return;
	};
	let data_dir = PathBuf::from(env_or("DATA_DIR", "./data"));

	let node = Arc::new(KaspaNodeClient::new(network.node_url.clone()));
	match futures::try_join!(node.get_block_dag_info(), node.get_fee_estimate()) {
		Ok((dag, fees)) => info!(
			"Connected to {} at DAA score {} ({} blocks), priority feerate {}",
			dag.network, dag.virtual_daa_score, dag.block_count, fees.priority_bucket.feerate
		),
		Err(e) => {
			error!("Failed to reach node {}: {}", network.node_url, e);
			return;
		}
	}

	let explorer = match KaspaExplorerClient::new(network.explorer_url.clone()) {
		Ok(client) => Arc::new(client),
		Err(e) => {
			error!("Failed to create explorer client: {}", e);
			return;
		}
	};

	let wallet = address.to_string();
	let conversations_repo = FileConversationRepository::new(data_dir.clone());
	let mut manager = ConversationManager::new(wallet.clone());
	match conversations_repo.load(&wallet).await {
		Ok(Some(snapshot)) => manager.restore(snapshot),
		Ok(None) => {}
		Err(e) => warn!("Ignoring unreadable conversation state: {}", e),
	}
	let conversations = Arc::new(Mutex::new(manager));

	let sink = Arc::new(FileMessageRepository::new(data_dir.clone()));
	let decryption = DecryptionEngine::new(
		Arc::new(EciesCipher),
		Arc::new(StaticKeySource::single(key)),
		DecryptionCache::new(Arc::new(FileCacheStore::new(data_dir.join("cache")))),
		DecryptionConfig::default(),
	);
	let mut dispatcher = EventDispatcher::new();
	dispatcher.register_handler(Box::new(LoggingEventHandler));

	let pipeline = BlockIngestionPipeline::new(
		wallet.clone(),
		TransactionProcessor::new(explorer.clone()),
		decryption,
		conversations.clone(),
		sink.clone(),
		dispatcher,
	);

	let idle_secs = env_or("IDLE_TIMEOUT_SECS", "0").parse::<u64>().unwrap_or(0);
	let config = SyncConfig {
		idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
		..SyncConfig::default()
	};
	let mut orchestrator = IngestionOrchestrator::new(pipeline)
		.with_strategy(Box::new(HistoricalBackfill::new(
			explorer,
			wallet.clone(),
			config.clone(),
		)))
		.with_strategy(Box::new(LiveBlockSync::new(node, config)));

	match orchestrator.run().await {
		Ok(stats) => info!("Ingestion finished: {}", stats.summary()),
		Err(e) => error!("Ingestion failed: {}", e),
	}

	match sink.messages(&wallet).await {
		Ok(messages) => {
			let received: u64 = messages
				.iter()
				.filter(|m| m.recipient_address == wallet)
				.map(|m| m.amount_sompi)
				.sum();
			info!(
				"{} messages stored, {} KAS received with them",
				messages.len(),
				format_token_amount(received, KAS_DECIMALS)
			);
		}
		Err(e) => error!("Failed to read stored messages: {}", e),
	}

	let snapshot = conversations.lock().snapshot();
	if let Err(e) = conversations_repo.save(&wallet, &snapshot).await {
		error!("Failed to save conversations: {}", e);
	}
}
