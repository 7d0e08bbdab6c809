//! # Rate Limiting Module
//!
//! Per API key, per endpoint quotas over a rolling one minute window.
//!
//! ## Features
//!
//! - **Sliding window counters**: per-second counts over the trailing 60
//!   seconds, either in process ([`LocalWindowCounter`]) or in the shared
//!   store ([`DistributedWindowCounter`]) so every gateway instance sees the
//!   same totals
//! - **Per-request decisions**: [`RateLimitEvaluator`] maps a request to its
//!   bucket, checks the window and produces a [`Decision`] with the
//!   `RateLimit-*` response headers
//! - **API key blocking**: [`ApiKeyCatalog`] implementations that can block
//!   a key until a given time
//!
//! ## Usage
//!
//! ```ignore
//! let counter: Arc<dyn WindowCounter> =
//!     Arc::new(DistributedWindowCounter::new(store, KeyLayout::default()));
//! let evaluator = RateLimitEvaluator::new(
//!     matcher,
//!     counter,
//!     Arc::new(DefaultApiKeys),
//!     Arc::new(SystemClock),
//!     EvaluatorSettings::default(),
//! );
//!
//! match evaluator.evaluate("GET", "/users/42", &headers).await {
//!     decision if decision.forwards() => { /* proxy upstream */ },
//!     decision => { /* reply with decision.rejection_status() */ },
//! }
//! ```

mod api_keys;
mod decision;
mod distributed;
mod error;
mod local;
mod window;

pub use api_keys::{ApiKeyCatalog, ApiLimits, DefaultApiKeys, StoreApiKeys};
pub use decision::{
    Decision, EvaluatorSettings, MissingPolicy, RateLimitEvaluator, RateLimitHeaders,
    RATELIMIT_LIMIT, RATELIMIT_REMAINING, RATELIMIT_RESET,
};
pub use distributed::DistributedWindowCounter;
pub use error::{RateLimitError, RateLimitResult};
pub use local::{LocalWindow, LocalWindowCounter};
pub use window::{WindowCounter, WindowSnapshot, BUCKET_TTL_SECS, WINDOW_SECS};
