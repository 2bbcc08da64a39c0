//! Transaction mass and fee model.
//!
//! Mass is the sum of the serialized size, the locking-script bytes weighted by
//! [`MASS_PER_SCRIPT_PUB_KEY_BYTE`] and the signature operations weighted by
//! [`MASS_PER_SIG_OP`]. The network fee is one sompi per unit of mass.

use crate::transaction::builder::TransactionError;
use crate::transaction::SOMPI_PER_KAS;
use crate::transaction::types::Transaction;

pub const MASS_PER_TX_BYTE: u64 = 1;
pub const MASS_PER_SCRIPT_PUB_KEY_BYTE: u64 = 10;
pub const MASS_PER_SIG_OP: u64 = 1000;

/// Mass of a one-input, two-output pay-to-pubkey transaction without payload.
pub const STANDARD_TRANSACTION_MASS: u64 = 2036;
pub const MAXIMUM_STANDARD_TRANSACTION_MASS: u64 = 100_000;
pub const SOMPI_PER_MASS: u64 = 1;
pub const MAX_PRIORITY_FEE: u64 = 5 * SOMPI_PER_KAS;

// version, input count, output count, lock time, subnetwork id, gas, payload hash, payload length
const TX_HEADER_SIZE: u64 = 2 + 8 + 8 + 8 + 20 + 8 + 32 + 8;
// outpoint, signature script length, 66-byte schnorr signature script, sequence
const TX_INPUT_SIZE: u64 = 32 + 4 + 8 + 66 + 8;
// value, script version, script length
const TX_OUTPUT_BASE_SIZE: u64 = 8 + 2 + 8;

/// Mass of a transaction with `input_count` single-signature inputs, outputs with the given
/// locking-script lengths, and a payload of `payload_len` bytes.
pub fn transaction_mass(input_count: usize, output_script_lens: &[usize], payload_len: usize) -> u64 {
	let size = TX_HEADER_SIZE
		+ payload_len as u64
		+ TX_INPUT_SIZE * input_count as u64
		+ output_script_lens
			.iter()
			.map(|len| TX_OUTPUT_BASE_SIZE + *len as u64)
			.sum::<u64>();
	let script_bytes: u64 = output_script_lens.iter().map(|len| 2 + *len as u64).sum();

	size * MASS_PER_TX_BYTE
		+ script_bytes * MASS_PER_SCRIPT_PUB_KEY_BYTE
		+ input_count as u64 * MASS_PER_SIG_OP
}

pub fn mass_of(transaction: &Transaction) -> u64 {
	let scripts: Vec<usize> = transaction
		.outputs
		.iter()
		.map(|o| o.script_public_key.script_len())
		.collect();
	transaction_mass(
		transaction.inputs.len(),
		&scripts,
		transaction.payload.len() / 2,
	)
}

pub fn network_fee(mass: u64) -> u64 {
	mass * SOMPI_PER_MASS
}

/// Fee paid on top of the network fee.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PriorityFee {
	#[default]
	None,
	/// Explicit amount, capped at [`MAX_PRIORITY_FEE`].
	Sompi(u64),
	/// Sompi per mass unit, applied to [`STANDARD_TRANSACTION_MASS`].
	FeeRate(f64),
}

impl PriorityFee {
	pub fn to_sompi(&self) -> Result<u64, TransactionError> {
		match *self {
			PriorityFee::None => Ok(0),
			PriorityFee::Sompi(amount) if amount > MAX_PRIORITY_FEE => {
				Err(TransactionError::PriorityFeeTooHigh(amount))
			}
			PriorityFee::Sompi(amount) => Ok(amount),
			PriorityFee::FeeRate(rate) if !rate.is_finite() || rate < 0.0 => {
				Err(TransactionError::InvalidFeeRate(rate))
			}
			PriorityFee::FeeRate(rate) => Ok((rate * STANDARD_TRANSACTION_MASS as f64).ceil() as u64),
		}
	}
}
