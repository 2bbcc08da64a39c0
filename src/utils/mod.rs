//!
//! Utility module for the messaging engine.
//!
//! Re-exports amount formatting helpers and the bounded retry combinator used by every
//! network-facing component.
/// Utility functions for formatting and display
pub mod index;
/// Bounded retry built on `backoff`
pub mod retry;

pub use index::{format_token_amount, now_millis, parse_token_amount};
pub use retry::{RetryPolicy, retry_bounded};
