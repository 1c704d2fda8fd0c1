//! New Steps QA Common Library
//!
//! Configuration, the report model, and the reference-ID registry shared by
//! the harness core and the command-line driver.

pub mod config;
pub mod error;
pub mod reference;
pub mod report;
pub mod types;

pub use config::HarnessConfig;
pub use error::{Error, Result};
pub use reference::{find_reference, ReferenceId, ReferenceKind};
pub use report::{Report, Verdict};
pub use types::*;

/// Harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
