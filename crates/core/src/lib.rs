//! # tokenflow-core
//!
//! Process-level error types shared by the tokenflow crates.
//!
//! Actor-local failures (guards, action bodies, firing) have their own typed
//! errors in `tokenflow-actor`; this crate only carries the failures that reach
//! the embedding process: configuration, runtime construction and scheduler
//! bookkeeping.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

pub mod error;
pub mod result;

pub use error::Error;
pub use result::{Result, ResultExt};
