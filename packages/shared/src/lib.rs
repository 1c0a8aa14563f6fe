//! Shared utilities for the chanoma workspace.
//!
//! This crate holds the pieces that are useful to every chanoma binary and
//! test: logging setup and time handling.

pub mod logger;
pub mod time;
