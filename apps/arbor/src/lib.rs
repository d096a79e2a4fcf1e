//! # Arbor
//!
//! Host application for the arbor-core graph engine: an HTTP front end
//! that forwards request envelopes to one shared [`arbor_core::Database`],
//! a CLI for administration, and TOML configuration.

pub mod api;
pub mod cli;
pub mod config;
