//! HTTP ingress for the ethgate JSON-RPC gateway.
//!
//! [`app::create_app`] wires the [`router`] handlers over the shared
//! [`GatewayComponents`](ethgate_core::runtime::GatewayComponents).

pub mod app;
pub mod router;
