//! New Steps QA CLI
//!
//! Argument parsing, configuration merge, and the terminal summary for the
//! acceptance harness.

pub mod output;
pub mod settings;

pub use settings::Cli;

/// Exit code when the run is interrupted
pub const EXIT_INTERRUPTED: i32 = 130;
/// Exit code for setup errors (configuration, output directory)
pub const EXIT_SETUP: i32 = 2;
