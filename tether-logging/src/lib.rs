//! Logging infrastructure for Tether
//!
//! All crates emit through `tracing`. This crate only owns installing the
//! global subscriber, driven by the `logging` configuration domain.

pub mod init;

pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing};
