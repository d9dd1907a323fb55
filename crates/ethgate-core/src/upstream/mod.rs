//! Upstream node pool.
//!
//! This module handles communication with upstream Ethereum nodes:
//! - A shared pooled HTTP client with a concurrency limit ([`http_client`])
//! - Per-network endpoint arenas with O(1) swap-to-tail eviction ([`arena`])
//! - The [`NodePool`] that selects, retries and charges failures ([`pool`])
//! - Typed node queries (`eth_call`, `net_version`, `eth_sendRawTransaction`, ...)
//! - Caller cancellation and deadlines ([`CallContext`])
//!
//! # Failure Accounting
//!
//! | Outcome                      | Retried | Charged to endpoint |
//! |------------------------------|---------|---------------------|
//! | POST timeout / refused / 5xx | yes     | yes                 |
//! | Body could not be read       | yes     | no                  |
//! | JSON-RPC error from the node | no      | no                  |
//! | Cancelled / deadline passed  | no      | no                  |
//!
//! An endpoint is evicted on the failure that takes its count past the threshold, unless the
//! network is already at its minimum number of selectable endpoints. Evicted endpoints stay in
//! the arena and only return through [`NodePool::reinstate_all`].

pub mod arena;
pub mod builder;
pub mod context;
pub mod errors;
pub mod http_client;
pub mod pool;
pub mod queries;

pub use arena::{Endpoint, EndpointArena, FailureOutcome};
pub use builder::{BuilderError, NodePoolBuilder};
pub use context::CallContext;
pub use errors::UpstreamError;
pub use http_client::{HttpClient, HttpClientConfig};
pub use pool::{NetworkHealth, NodePool, NodePoolConfig, PoolStats};
pub use queries::parse_quantity_u64;
