// crates/quarry-server/src/http.rs
// Shared HTTP client for all provider calls

use std::time::Duration;

/// Full-call timeout for non-streaming LLM requests
pub const LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// Full-call timeout for a single search request
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect timeout, enforced separately from the full-call timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest silence tolerated between two chunks of a streaming response
pub const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest a streaming response may run from its first byte to its last
pub const STREAM_MAX_DURATION: Duration = Duration::from_secs(600);

/// Create the shared HTTP client.
///
/// No overall timeout is set on the client: streaming responses can run
/// long, so each non-streaming request sets its own full-call timeout.
/// Streams bound the wait for response headers, each read, and their
/// total duration separately.
pub fn create_shared_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(10)
        .user_agent(concat!("quarry/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_shared_client() {
        let client = create_shared_client();
        drop(client);
    }

    #[test]
    fn test_timeout_values() {
        assert_eq!(CONNECT_TIMEOUT, Duration::from_secs(10));
        assert_eq!(SEARCH_TIMEOUT, Duration::from_secs(10));
        assert!(STREAM_IDLE_TIMEOUT < LLM_TIMEOUT);
        assert!(STREAM_IDLE_TIMEOUT < STREAM_MAX_DURATION);
    }
}
