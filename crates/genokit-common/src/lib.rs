//! Genokit Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the genokit workspace.
//!
//! # Example
//!
//! ```no_run
//! use genokit_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> genokit_common::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     tracing::info!("worker starting");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

pub use error::{GenokitError, Result};
