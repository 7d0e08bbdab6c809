//! # Gateway Modules
//!
//! - [`rate_limiting`] - Sliding window counters and per-request decisions
//! - [`path_matcher`] - Templated route lookup with atomic table swaps
//! - [`catalog`] - Catalog model, validation, publishing and background updates
//! - [`gateway`] - HTTP listener and upstream proxy

pub mod catalog;
pub mod gateway;
pub mod path_matcher;
pub mod rate_limiting;
