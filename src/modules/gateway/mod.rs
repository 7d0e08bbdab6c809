//! # Gateway Module
//!
//! HTTP/1 reverse proxy in front of a single upstream. Every request is
//! evaluated by a [`RateLimitEvaluator`](crate::modules::rate_limiting::RateLimitEvaluator)
//! first; rejected requests are answered locally, the rest are forwarded and
//! get the `RateLimit-*` headers added to the upstream response.
//!
//! Upstream failures are answered with 502.

mod error;
mod proxy;
mod server;
mod stats;

pub use error::{GatewayError, GatewayResult};
pub use proxy::{ProxyBody, Upstream};
pub use server::{GatewayBody, GatewayServer};
pub use stats::{GatewayStats, StatsSnapshot};
