//! Event bus for message ingestion.
//!
//! The ingestion pipeline never calls into UI or session state directly. It emits
//! [`IngestionEvent`]s through an [`EventDispatcher`], and whoever cares registers a handler.
//! This keeps the pipeline free of references back into the wallet session that feeds it.

use crate::messaging::{Conversation, Message};
use crate::wallet::WalletSyncError;
use crate::wallet::sync::progress_tracker::IngestionStats;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Events produced while ingesting transactions
#[derive(Debug, Clone)]
pub enum IngestionEvent {
	/// A message was stored for `wallet`
	MessageReceived { wallet: String, message: Message },
	/// An unsolicited handshake opened a pending conversation
	ConversationRequested(Conversation),
	/// A handshake response activated a conversation
	ConversationActivated(Conversation),
	/// A sync strategy finished
	SyncCompleted {
		strategy: &'static str,
		stats: IngestionStats,
	},
	/// A feed reported an error
	SyncError { error: String, recoverable: bool },
}

/// Trait for handling ingestion events.
#[async_trait::async_trait]
pub trait IngestionEventHandler: Send + Sync {
	async fn handle(&mut self, event: &IngestionEvent) -> Result<(), WalletSyncError>;

	/// Get the name of this handler for logging and diagnostics.
	fn name(&self) -> &'static str;
}

/// Event dispatcher that manages multiple event handlers.
///
/// Handlers are called in registration order. A failing handler is logged and does not stop
/// the remaining handlers.
#[derive(Default)]
pub struct EventDispatcher {
	handlers: Vec<Box<dyn IngestionEventHandler>>,
}

impl EventDispatcher {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register_handler(&mut self, handler: Box<dyn IngestionEventHandler>) {
		self.handlers.push(handler);
	}

	pub fn handler_count(&self) -> usize {
		self.handlers.len()
	}

	pub async fn dispatch(&mut self, event: &IngestionEvent) {
		for handler in &mut self.handlers {
			if let Err(e) = handler.handle(event).await {
				error!("Handler {} failed to process event: {}", handler.name(), e);
			}
		}
	}
}

/// Logs every event.
pub struct LoggingEventHandler;

#[async_trait::async_trait]
impl IngestionEventHandler for LoggingEventHandler {
	async fn handle(&mut self, event: &IngestionEvent) -> Result<(), WalletSyncError> {
		match event {
			IngestionEvent::MessageReceived { wallet, message } => info!(
				"New {} message {} for {} from {}",
				message.message_type, message.transaction_id, wallet, message.sender_address
			),
			IngestionEvent::ConversationRequested(conversation) => info!(
				"Handshake received from {} (conversation {})",
				conversation.counterparty_address, conversation.conversation_id
			),
			IngestionEvent::ConversationActivated(conversation) => info!(
				"Conversation {} with {} is active",
				conversation.conversation_id, conversation.counterparty_address
			),
			IngestionEvent::SyncCompleted { strategy, stats } => {
				info!("{} completed: {}", strategy, stats.summary())
			}
			IngestionEvent::SyncError { error, recoverable } => {
				warn!("Sync error (recoverable: {}): {}", recoverable, error)
			}
		}
		Ok(())
	}

	fn name(&self) -> &'static str {
		"LoggingEventHandler"
	}
}

/// Forwards events to an unbounded channel, e.g. for a UI task.
pub struct ChannelEventHandler {
	sender: mpsc::UnboundedSender<IngestionEvent>,
}

impl ChannelEventHandler {
	pub fn new(sender: mpsc::UnboundedSender<IngestionEvent>) -> Self {
		Self { sender }
	}

	/// Handler plus the receiving end of its channel.
	pub fn channel() -> (Self, mpsc::UnboundedReceiver<IngestionEvent>) {
		let (sender, receiver) = mpsc::unbounded_channel();
		(Self::new(sender), receiver)
	}
}

#[async_trait::async_trait]
impl IngestionEventHandler for ChannelEventHandler {
	async fn handle(&mut self, event: &IngestionEvent) -> Result<(), WalletSyncError> {
		if self.sender.send(event.clone()).is_err() {
			debug!("Event receiver dropped");
		}
		Ok(())
	}

	fn name(&self) -> &'static str {
		"ChannelEventHandler"
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::messaging::store::tests::message;

	struct FailingHandler;

	#[async_trait::async_trait]
	impl IngestionEventHandler for FailingHandler {
		async fn handle(&mut self, _event: &IngestionEvent) -> Result<(), WalletSyncError> {
			Err(WalletSyncError::SyncError("boom".to_string()))
		}

		fn name(&self) -> &'static str {
			"FailingHandler"
		}
	}

	#[tokio::test]
	async fn failing_handler_does_not_block_later_handlers() {
		let (channel, mut events) = ChannelEventHandler::channel();
		let mut dispatcher = EventDispatcher::new();
		dispatcher.register_handler(Box::new(FailingHandler));
		dispatcher.register_handler(Box::new(LoggingEventHandler));
		dispatcher.register_handler(Box::new(channel));
		assert_eq!(dispatcher.handler_count(), 3);

		dispatcher
			.dispatch(&IngestionEvent::MessageReceived {
				wallet: "w".to_string(),
				message: message("tx1", "a", "w", "hi"),
			})
			.await;

		match events.try_recv() {
			Ok(IngestionEvent::MessageReceived { wallet, message }) => {
				assert_eq!(wallet, "w");
				assert_eq!(message.transaction_id, "tx1");
			}
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[tokio::test]
	async fn dropped_receiver_is_not_an_error() {
		let (mut channel, events) = ChannelEventHandler::channel();
		drop(events);
		let event = IngestionEvent::SyncError {
			error: "offline".to_string(),
			recoverable: true,
		};
		assert!(channel.handle(&event).await.is_ok());
	}
}
