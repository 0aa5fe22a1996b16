//! flowtest CLI library
//!
//! Shared by the `flowtest` binary and its integration tests.

pub mod builder;
pub mod cli;
pub mod commands;
pub mod error;
pub mod harness;
pub mod logging;
pub mod reporter;
pub mod runner;
pub mod signal;
pub mod teardown;
