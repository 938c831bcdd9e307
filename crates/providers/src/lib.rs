//! Completion provider implementations for DandiClaw.
//!
//! The only backend is the completion gateway, reached over HTTP with a
//! server-sent event response. The SSE decoding lives in [`sse`] so it can
//! be exercised without a network.

pub mod gateway;
pub mod sse;

pub use gateway::GatewayProvider;
pub use sse::SseDecoder;
