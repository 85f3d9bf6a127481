// crates/quarry-server/src/search/mod.rs
// Web search: provider, aggregation, and prompt digests

pub mod aggregator;
pub mod digest;
pub mod provider;
pub mod searxng;

pub use aggregator::{SearchAggregator, SearchOptions};
pub use provider::{SearchClient, SearchProvider};
pub use searxng::SearxngProvider;
