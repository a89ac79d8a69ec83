//! Result type definition and extension traits.
//!
//! Provides combinators that log instead of unwrapping.

use crate::error::Error;

/// The standard Result type for tokenflow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait providing logging combinators for Results.
///
/// These are for call sites where a failure is recoverable and only needs to be
/// recorded, such as an environment override that does not parse.
pub trait ResultExt<T> {
    /// Convert a Result to an Option, logging the error if present.
    fn into_option_logged(self) -> Option<T>;

    /// Get the value or a default, logging the error if present.
    fn or_default_logged(self, default: T) -> T;
}

impl<T> ResultExt<T> for Result<T> {
    fn into_option_logged(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "Operation failed");
                None
            }
        }
    }

    fn or_default_logged(self, default: T) -> T {
        match self {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Operation failed, using default");
                default
            }
        }
    }
}
