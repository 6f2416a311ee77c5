//! Error taxonomy for rate lookups

use thiserror::Error;

/// Errors surfaced by rate lookups.
///
/// The type is `Clone` so that every caller waiting on the same in-flight
/// fetch observes the same failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateError {
    /// The upstream feed could not be reached or answered with a non-success status
    #[error("Failed to fetch rates: {0}")]
    Fetch(String),
    /// The feed document or one of its values could not be interpreted
    #[error("Failed to parse rates: {0}")]
    Parse(String),
    /// The requested currency code is not part of the snapshot
    #[error("No rate found for currency code: {0}")]
    Lookup(String),
}
