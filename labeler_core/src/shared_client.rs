//! Shared HTTP client for connection pooling.
//!
//! All sessions in a process draw from one pooled `reqwest::Client`, so the
//! concurrent per-record submissions reuse connections instead of paying a
//! TLS handshake each. The client carries no global request timeout; the
//! transport applies the per-route timeout to each request.

use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

/// Default pool size for idle connections per host.
pub const DEFAULT_POOL_SIZE: usize = 20;

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Process-wide pooled client.
pub static SHARED_CLIENT: Lazy<Client> = Lazy::new(build_pooled_client);

/// Build a new pooled HTTP client.
pub fn build_pooled_client() -> Client {
    Client::builder()
        .pool_max_idle_per_host(DEFAULT_POOL_SIZE)
        .pool_idle_timeout(Duration::from_secs(90))
        .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .build()
        .unwrap_or_else(|_| Client::new())
}
