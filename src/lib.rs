//! # r0n-dynlimits
//!
//! Rate limiting reverse proxy. Each request is identified by an API key
//! header and matched against a catalog of templated endpoints; the
//! key's per endpoint quota is enforced over a sliding one minute window
//! kept in a store shared by every gateway instance.
//!
//! ## Features
//!
//! - Sliding window counters, in process or in redis
//! - Templated path matching with atomic route table swaps
//! - Versioned catalogs pulled from a control server, with quotas
//!   published by one instance under a store lease
//! - `RateLimit-*` response headers
//!
//! ## Layout
//!
//! - [`modules::rate_limiting`]: windows and per-request decisions
//! - [`modules::path_matcher`]: route lookup
//! - [`modules::catalog`]: catalog model, validation and distribution
//! - [`modules::gateway`]: HTTP listener and upstream proxy
//! - [`store`]: shared key-value store backends
//! - [`config`], [`logging`], [`runtime`]: process setup

pub mod clock;
pub mod config;
pub mod logging;
pub mod modules;
pub mod runtime;
pub mod store;
