// crates/quarry-server/src/lib.rs
// Quarry - resilient multi-step search and answer orchestrator

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod error;
pub mod http;
pub mod llm;
pub mod orchestrator;
pub mod resilience;
pub mod search;
pub mod web;

pub use error::{ProviderError, QuarryError, Result};
pub use quarry_types as types;
