/// Formats an integer amount of base units as a decimal string with `decimals` places.
pub fn format_token_amount(amount: u64, decimals: u32) -> String {
	let scale = 10u64.pow(decimals);
	format!(
		"{}.{:0width$}",
		amount / scale,
		amount % scale,
		width = decimals as usize
	)
}

/// Parses a decimal token string ("1.5", "0.2", "3") into base units.
///
/// Returns `None` for negative, malformed, or over-precise input.
pub fn parse_token_amount(value: &str, decimals: u32) -> Option<u64> {
	let value = value.trim();
	if value.is_empty() || value.starts_with('-') {
		return None;
	}

	let (whole, fraction) = match value.split_once('.') {
		Some((whole, fraction)) => (whole, fraction),
		None => (value, ""),
	};
	if fraction.len() > decimals as usize {
		return None;
	}

	let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
	let padded = format!("{:0<width$}", fraction, width = decimals as usize);
	let fraction: u64 = if padded.is_empty() { 0 } else { padded.parse().ok()? };

	whole
		.checked_mul(10u64.pow(decimals))
		.and_then(|w| w.checked_add(fraction))
}

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> i64 {
	chrono::Utc::now().timestamp_millis()
}
