//! Command-line front end for market sentinel.
//!
//! The binary in `main.rs` only parses arguments and dispatches; argument
//! types and command bodies live here so they can be exercised from tests.

pub mod cli;
pub mod commands;

pub use cli::{init_tracing, load_config, Cli, Commands};
