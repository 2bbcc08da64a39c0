//! Transaction generator
//!
//! Turns a UTXO set and a list of payments into unsigned transactions. UTXOs are selected
//! largest-first so that a fee estimate and the later submission pick the same inputs.

use crate::crypto::{Address, AddressError, CipherError};
use crate::messaging::ConversationError;
use crate::node::NodeError;
use crate::protocol::PayloadError;
use crate::transaction::fees::{
	MAXIMUM_STANDARD_TRANSACTION_MASS, PriorityFee, network_fee, transaction_mass,
};
use crate::transaction::types::{
	FeePolicy, NATIVE_SUBNETWORK_ID, PaymentOutput, PendingTransaction, ScriptPublicKey, Transaction,
	TransactionInput, TransactionOutput, UtxoEntry,
};
use crate::transaction::KAS_DECIMALS;
use crate::utils::format_token_amount;
use itertools::Itertools;
use thiserror::Error;

fn kas(amount: &u64) -> String {
	format!("{} KAS", format_token_amount(*amount, KAS_DECIMALS))
}

#[derive(Error, Debug)]
pub enum TransactionError {
	#[error("Transaction validation error: {0}")]
	ValidationError(String),

	#[error("insufficient balance: need {} have {}", kas(.need), kas(.have))]
	InsufficientBalance { need: u64, have: u64 },

	#[error("UTXO set needs consolidation: {0} transactions required")]
	InsufficientConsolidation(usize),

	#[error("Priority fee of {} exceeds the maximum of 5 KAS", kas(.0))]
	PriorityFeeTooHigh(u64),

	#[error("Invalid fee rate: {0}")]
	InvalidFeeRate(f64),

	#[error("Amount {} is below the minimum of {}", kas(.amount), kas(.minimum))]
	AmountBelowMinimum { amount: u64, minimum: u64 },

	#[error("Signing error: {0}")]
	Signing(String),

	#[error("Address error: {0}")]
	Address(#[from] AddressError),

	#[error("Encryption error: {0}")]
	Cipher(#[from] CipherError),

	#[error("Payload error: {0}")]
	Payload(#[from] PayloadError),

	#[error("Conversation error: {0}")]
	Conversation(#[from] ConversationError),

	#[error("Node error: {0}")]
	Node(#[from] NodeError),
}

/// Role of a generated transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
	/// Carries the requested payments and payload.
	Final,
	/// Compounds inputs into a single change output; the final transaction comes later.
	Consolidation,
}

/// Builder for unsigned transactions over a UTXO set
pub struct TransactionGenerator {
	/// Spendable entries, in any order
	utxos: Vec<UtxoEntry>,
	/// Payments to make
	outputs: Vec<PaymentOutput>,
	/// Receives whatever the inputs leave after payments and fees
	change_address: Option<Address>,
	/// Opaque payload bytes
	payload: Vec<u8>,
	priority_fee: PriorityFee,
	fee_policy: FeePolicy,
}

impl TransactionGenerator {
	/// Creates a new generator
	pub fn new() -> Self {
		Self {
			utxos: Vec::new(),
			outputs: Vec::new(),
			change_address: None,
			payload: Vec::new(),
			priority_fee: PriorityFee::None,
			fee_policy: FeePolicy::SenderPays,
		}
	}

	/// Sets the UTXO entries to spend from
	pub fn with_utxos(mut self, utxos: Vec<UtxoEntry>) -> Self {
		self.utxos = utxos;
		self
	}

	/// Adds a payment output
	pub fn with_output(mut self, output: PaymentOutput) -> Self {
		self.outputs.push(output);
		self
	}

	/// Sets the change address
	pub fn with_change_address(mut self, address: Address) -> Self {
		self.change_address = Some(address);
		self
	}

	/// Sets the payload
	pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
		self.payload = payload;
		self
	}

	/// Sets the priority fee
	pub fn with_priority_fee(mut self, priority_fee: PriorityFee) -> Self {
		self.priority_fee = priority_fee;
		self
	}

	/// Sets who pays the fees
	pub fn with_fee_policy(mut self, fee_policy: FeePolicy) -> Self {
		self.fee_policy = fee_policy;
		self
	}

	/// Generates the transactions.
	///
	/// Returns a single [`PendingKind::Final`] transaction when the selected inputs fit one
	/// transaction. Otherwise returns the consolidation transactions that must be submitted
	/// before the payment can be made.
	pub fn generate(mut self) -> Result<Vec<(PendingKind, PendingTransaction)>, TransactionError> {
		log::debug!(
			"Generating transaction: {} utxos, {} outputs, {} payload bytes",
			self.utxos.len(),
			self.outputs.len(),
			self.payload.len()
		);

		let change_address = self
			.change_address
			.take()
			.ok_or_else(|| TransactionError::ValidationError("change address not set".into()))?;
		if self.outputs.iter().any(|o| o.amount == 0) {
			return Err(TransactionError::ValidationError(
				"payment outputs must be non-zero".into(),
			));
		}
		let priority = self.priority_fee.to_sompi()?;

		let mut utxos = std::mem::take(&mut self.utxos);
		utxos.sort_by(|a, b| {
			b.amount
				.cmp(&a.amount)
				.then_with(|| a.outpoint.cmp(&b.outpoint))
		});
		let available: u64 = utxos.iter().map(|u| u.amount).sum();
		let payment_total = self
			.outputs
			.iter()
			.try_fold(0u64, |acc, o| acc.checked_add(o.amount))
			.ok_or_else(|| TransactionError::ValidationError("payment total overflows".into()))?;

		let change_script = ScriptPublicKey::for_address(&change_address);
		let payment_scripts: Vec<ScriptPublicKey> = self
			.outputs
			.iter()
			.map(|o| ScriptPublicKey::for_address(&o.address))
			.collect();
		let script_lens: Vec<usize> = payment_scripts
			.iter()
			.chain(std::iter::once(&change_script))
			.map(ScriptPublicKey::script_len)
			.collect();

		let mut selected = 0usize;
		let mut total = 0u64;
		let mut needed = payment_total;
		let mut covered = false;
		for utxo in &utxos {
			selected += 1;
			total += utxo.amount;
			let fee = network_fee(transaction_mass(selected, &script_lens, self.payload.len())) + priority;
			needed = match self.fee_policy {
				FeePolicy::SenderPays => payment_total + fee,
				FeePolicy::ReceiverPays => payment_total,
			};
			if total >= needed {
				covered = true;
				break;
			}
		}
		if !covered {
			log::warn!("Insufficient balance: need {} have {}", needed, available);
			return Err(TransactionError::InsufficientBalance {
				need: needed,
				have: available,
			});
		}

		let inputs = &utxos[..selected];
		let mass_with_change = transaction_mass(selected, &script_lens, self.payload.len());
		if mass_with_change > MAXIMUM_STANDARD_TRANSACTION_MASS {
			log::info!(
				"Selection of {} inputs has mass {}, consolidating first",
				selected,
				mass_with_change
			);
			return self.consolidate(inputs, &change_script, priority);
		}
		let payment_lens = &script_lens[..script_lens.len() - 1];

		let (mass, fee, change) = match self.fee_policy {
			FeePolicy::SenderPays => {
				let fee = network_fee(mass_with_change) + priority;
				let change = total - payment_total - fee;
				if change == 0 && !self.outputs.is_empty() {
					let mass = transaction_mass(selected, payment_lens, self.payload.len());
					(mass, fee, 0)
				} else {
					(mass_with_change, fee, change)
				}
			}
			FeePolicy::ReceiverPays => {
				let change = total - payment_total;
				let mass = if change == 0 {
					transaction_mass(selected, payment_lens, self.payload.len())
				} else {
					mass_with_change
				};
				(mass, network_fee(mass) + priority, change)
			}
		};

		let mut outputs: Vec<TransactionOutput> = self
			.outputs
			.iter()
			.zip(payment_scripts)
			.map(|(o, script)| TransactionOutput {
				value: o.amount,
				script_public_key: script,
			})
			.collect();
		if self.fee_policy == FeePolicy::ReceiverPays {
			let first = outputs.first_mut().ok_or_else(|| {
				TransactionError::ValidationError("receiver-pays needs a payment output".into())
			})?;
			if first.value <= fee {
				return Err(TransactionError::InsufficientBalance {
					need: fee + 1,
					have: first.value,
				});
			}
			first.value -= fee;
		}
		if change > 0 || outputs.is_empty() {
			outputs.push(TransactionOutput {
				value: change,
				script_public_key: change_script,
			});
		}

		let pending = PendingTransaction {
			transaction: build_transaction(inputs, outputs, &self.payload),
			utxo_entries: inputs.to_vec(),
			mass,
			fee,
			payment_amount: payment_total,
			change_amount: change,
		};
		log::info!(
			"Generated transaction: {} inputs, {} outputs, mass {}, fee {}",
			pending.transaction.inputs.len(),
			pending.transaction.outputs.len(),
			pending.mass,
			pending.fee
		);
		Ok(vec![(PendingKind::Final, pending)])
	}

	fn consolidate(
		&self,
		inputs: &[UtxoEntry],
		change_script: &ScriptPublicKey,
		priority: u64,
	) -> Result<Vec<(PendingKind, PendingTransaction)>, TransactionError> {
		let base = transaction_mass(0, &[change_script.script_len()], 0);
		let per_input = transaction_mass(1, &[], 0) - transaction_mass(0, &[], 0);
		let max_inputs = ((MAXIMUM_STANDARD_TRANSACTION_MASS - base) / per_input) as usize;

		inputs
			.iter()
			.chunks(max_inputs)
			.into_iter()
			.map(|chunk| {
				let chunk: Vec<UtxoEntry> = chunk.cloned().collect();
				let total: u64 = chunk.iter().map(|u| u.amount).sum();
				let mass = transaction_mass(chunk.len(), &[change_script.script_len()], 0);
				let fee = network_fee(mass) + priority;
				if total <= fee {
					return Err(TransactionError::InsufficientBalance {
						need: fee + 1,
						have: total,
					});
				}
				let outputs = vec![TransactionOutput {
					value: total - fee,
					script_public_key: change_script.clone(),
				}];
				Ok((
					PendingKind::Consolidation,
					PendingTransaction {
						transaction: build_transaction(&chunk, outputs, &[]),
						utxo_entries: chunk,
						mass,
						fee,
						payment_amount: 0,
						change_amount: total - fee,
					},
				))
			})
			.collect()
	}
}

impl Default for TransactionGenerator {
	fn default() -> Self {
		Self::new()
	}
}

fn build_transaction(inputs: &[UtxoEntry], outputs: Vec<TransactionOutput>, payload: &[u8]) -> Transaction {
	Transaction {
		version: 0,
		inputs: inputs
			.iter()
			.map(|utxo| TransactionInput {
				previous_outpoint: utxo.outpoint.clone(),
				signature_script: String::new(),
				sequence: 0,
				sig_op_count: 1,
			})
			.collect(),
		outputs,
		lock_time: 0,
		subnetwork_id: NATIVE_SUBNETWORK_ID.to_string(),
		gas: 0,
		payload: hex::encode(payload),
	}
}
