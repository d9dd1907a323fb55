//! Mock infrastructure for gateway tests.
//!
//! Upstream Ethereum nodes are faked with mockito so tests never touch the network.
//!
//! ## Components
//!
//! - `RpcMockBuilder`: Wraps mockito with Ethereum JSON-RPC responders
//! - Test helpers: a known operator key, an ERC20 ABI and pool/config constructors
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::RpcMockBuilder;
//!
//! let mut node = RpcMockBuilder::new().await;
//! node.mock_balance("0xde0b6b3a7640000");
//!
//! // Register node.url() as a pool endpoint
//! ```

pub mod rpc_mock;

pub use rpc_mock::RpcMockBuilder;
pub use test_helpers::*;
