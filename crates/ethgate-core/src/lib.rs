//! # Ethgate Core
//!
//! Core library for a JSON-RPC gateway in front of a pool of Ethereum nodes.
//!
//! This crate provides the foundational components for:
//!
//! - **[`upstream`]**: Per-network node pools with retry, failure accounting and eviction.
//!
//! - **[`dispatch`]**: Predefined local handlers (`eth_getBalance` with unit conversion) and
//!   verbatim forwarding of every other method.
//!
//! - **[`signer`]**: Operator key loading behind a start-up gate, message and transaction
//!   signing, signature recovery and serialized nonce management.
//!
//! - **[`abi`]**: Contract call encoding/decoding and the signed transaction pipeline.
//!
//! - **[`units`]**: Wei to denomination conversion.
//!
//! - **[`metrics`]**: Prometheus metrics collection.
//!
//! - **[`config`]** and **[`runtime`]**: Layered configuration and component wiring.
//!
//! ## Request Flow
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────┐
//! │  Ingress    │ ─── Malformed ──► Gateway error (400)
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ Dispatcher  │ ─── Predefined ──► handler ──┐
//! └──────┬──────┘                              │
//!        │ Passthrough                         │
//!        ▼                                     ▼
//! ┌──────────────────┐                 ┌──────────────┐
//! │     NodePool     │ ◄───────────────│ pre/post     │
//! │ select ► POST ►  │                 │ processing   │
//! │ retry / evict    │                 └──────────────┘
//! └────────┬─────────┘
//!          │
//!          ▼
//!   Node body (verbatim) or node error ──► Response to Client
//! ```

pub mod abi;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod metrics;
pub mod runtime;
pub mod signer;
pub mod types;
pub mod units;
pub mod upstream;
