//! Per-request rate limit decision.

use super::api_keys::{ApiKeyCatalog, ApiLimits};
use super::error::{RateLimitError, RateLimitResult};
use super::window::WindowCounter;
use crate::clock::Clock;
use crate::modules::path_matcher::SharedRouteMatcher;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// `RateLimit-Limit` response header.
pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
/// `RateLimit-Remaining` response header.
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
/// `RateLimit-Reset` response header.
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// What to do with a routed request whose bucket has no quota.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPolicy {
    /// Reject with 403.
    #[default]
    Deny,
    /// Forward without counting.
    Allow,
}

/// Values of the rate limit response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// Requests allowed per minute.
    pub limit: i64,
    /// Requests left in the window.
    pub remaining: i64,
    /// Seconds until the oldest counted request leaves the window.
    pub reset: usize,
}

impl RateLimitHeaders {
    /// Add the headers to `headers`.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(RATELIMIT_RESET, HeaderValue::from(self.reset));
    }
}

/// Outcome of evaluating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Within quota; forward and count.
    Allowed {
        /// Bucket that was charged.
        bucket: String,
        /// Headers to add to the upstream response.
        headers: RateLimitHeaders,
    },
    /// Quota used up; reject with 429.
    Limited {
        /// Bucket that is exhausted.
        bucket: String,
        /// Headers to add to the rejection.
        headers: RateLimitHeaders,
    },
    /// No API key header; reject with 400.
    MissingApiKey,
    /// API key blocked; reject with 429.
    Blocked {
        /// Seconds until the block ends.
        retry_after: i64,
    },
    /// Route not in the catalog; reject with 404.
    UnknownRoute,
    /// Route not in the catalog but unknown paths are allowed.
    PassThrough,
    /// No quota for the bucket; reject with 403.
    NoPolicy {
        /// Bucket without a quota.
        bucket: String,
    },
    /// No quota for the bucket, forwarded uncounted.
    Unmetered {
        /// Bucket without a quota.
        bucket: String,
    },
    /// The counter failed; forwarded uncounted.
    FailedOpen {
        /// Bucket that could not be checked.
        bucket: String,
    },
}

impl Decision {
    /// Whether the request goes to the upstream.
    #[must_use]
    pub fn forwards(&self) -> bool {
        self.rejection_status().is_none()
    }

    /// Status to reply with instead of forwarding.
    #[must_use]
    pub fn rejection_status(&self) -> Option<StatusCode> {
        match self {
            Self::Allowed { .. }
            | Self::PassThrough
            | Self::Unmetered { .. }
            | Self::FailedOpen { .. } => None,
            Self::Limited { .. } | Self::Blocked { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            Self::MissingApiKey => Some(StatusCode::BAD_REQUEST),
            Self::UnknownRoute => Some(StatusCode::NOT_FOUND),
            Self::NoPolicy { .. } => Some(StatusCode::FORBIDDEN),
        }
    }

    /// Rate limit headers, when the window was read.
    #[must_use]
    pub fn headers(&self) -> Option<&RateLimitHeaders> {
        match self {
            Self::Allowed { headers, .. } | Self::Limited { headers, .. } => Some(headers),
            _ => None,
        }
    }
}

/// Evaluator settings.
#[derive(Debug, Clone)]
pub struct EvaluatorSettings {
    /// Header carrying the API key.
    pub api_key_header: HeaderName,
    /// Forward requests for routes not in the catalog.
    pub allow_unknown_paths: bool,
    /// Behavior when a bucket has no quota.
    pub missing_policy: MissingPolicy,
    /// Deadline for each counter call.
    pub store_timeout: Duration,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            api_key_header: HeaderName::from_static("x-api-key"),
            allow_unknown_paths: false,
            missing_policy: MissingPolicy::Deny,
            store_timeout: Duration::from_millis(250),
        }
    }
}

/// Decides, per request, whether it is within its API key's quota.
#[derive(Debug, Clone)]
pub struct RateLimitEvaluator {
    matcher: Arc<SharedRouteMatcher>,
    counter: Arc<dyn WindowCounter>,
    api_keys: Arc<dyn ApiKeyCatalog>,
    clock: Arc<dyn Clock>,
    settings: EvaluatorSettings,
}

impl RateLimitEvaluator {
    /// Create an evaluator.
    #[must_use]
    pub fn new(
        matcher: Arc<SharedRouteMatcher>,
        counter: Arc<dyn WindowCounter>,
        api_keys: Arc<dyn ApiKeyCatalog>,
        clock: Arc<dyn Clock>,
        settings: EvaluatorSettings,
    ) -> Self {
        Self {
            matcher,
            counter,
            api_keys,
            clock,
            settings,
        }
    }

    /// Evaluator settings.
    #[must_use]
    pub fn settings(&self) -> &EvaluatorSettings {
        &self.settings
    }

    /// Evaluate a request and charge its bucket when it is allowed.
    pub async fn evaluate(&self, method: &str, path: &str, headers: &HeaderMap) -> Decision {
        let Some(api_key) = headers
            .get(&self.settings.api_key_header)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
        else {
            return Decision::MissingApiKey;
        };

        let Some(route) = self.matcher.lookup(method, path) else {
            debug!(method, path, "no route");
            return if self.settings.allow_unknown_paths {
                Decision::PassThrough
            } else {
                Decision::UnknownRoute
            };
        };

        let now = self.clock.now_secs();
        let limits = match self
            .bounded("api key lookup", self.api_keys.limits(api_key, route.method(), route.template()))
            .await
        {
            Ok(limits) => limits,
            Err(e) => {
                warn!(error = %e, "api key lookup failed, ignoring blocks");
                ApiLimits::unblocked(api_key)
            },
        };
        if let Some(until) = limits.blocked_until.filter(|&until| until > now) {
            return Decision::Blocked {
                retry_after: until - now,
            };
        }

        let bucket = format!("{}_{}", limits.key_prefix, route.bucket_key());
        let snapshot = match self.bounded("window fetch", self.counter.fetch(&bucket, now)).await {
            Ok(snapshot) => snapshot,
            Err(RateLimitError::QuotaNotFound(_)) => {
                debug!(bucket = %bucket, "no quota for bucket");
                return match self.settings.missing_policy {
                    MissingPolicy::Deny => Decision::NoPolicy { bucket },
                    MissingPolicy::Allow => Decision::Unmetered { bucket },
                };
            },
            Err(e) => {
                warn!(bucket = %bucket, error = %e, "rate limit check failed, letting request through");
                return Decision::FailedOpen { bucket };
            },
        };

        let reset = snapshot.num_empty_slots_at_start();
        if snapshot.is_exhausted() {
            return Decision::Limited {
                bucket,
                headers: RateLimitHeaders {
                    limit: snapshot.quota,
                    remaining: 0,
                    reset,
                },
            };
        }

        let headers = RateLimitHeaders {
            limit: snapshot.quota,
            remaining: snapshot.remaining_after_admit(),
            reset,
        };
        if let Err(e) = self.bounded("window increment", self.counter.increment(&bucket, now)).await {
            warn!(bucket = %bucket, error = %e, "failed to count request");
        }
        Decision::Allowed { bucket, headers }
    }

    async fn bounded<T>(
        &self,
        what: &str,
        fut: impl Future<Output = RateLimitResult<T>>,
    ) -> RateLimitResult<T> {
        tokio::time::timeout(self.settings.store_timeout, fut)
            .await
            .map_err(|_| RateLimitError::Timeout(what.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::modules::rate_limiting::{DefaultApiKeys, LocalWindowCounter, StoreApiKeys, WindowSnapshot};
    use crate::store::{KeyLayout, MemoryStore};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct FailingCounter;

    #[async_trait]
    impl WindowCounter for FailingCounter {
        async fn fetch(&self, _key: &str, _ts: i64) -> RateLimitResult<WindowSnapshot> {
            Err(RateLimitError::Store(crate::store::StoreError::Unavailable(
                "down".to_string(),
            )))
        }

        async fn increment(&self, _key: &str, _ts: i64) -> RateLimitResult<()> {
            Ok(())
        }

        async fn set_quota(&self, _key: &str, _quota: i64) -> RateLimitResult<()> {
            Ok(())
        }
    }

    fn matcher() -> Arc<SharedRouteMatcher> {
        let matcher = Arc::new(SharedRouteMatcher::new());
        let mut changes = matcher.start_change_set();
        changes.add_route("GET", "/a/{id}");
        changes.commit();
        matcher
    }

    fn evaluator(counter: Arc<dyn WindowCounter>, settings: EvaluatorSettings) -> RateLimitEvaluator {
        RateLimitEvaluator::new(
            matcher(),
            counter,
            Arc::new(DefaultApiKeys),
            Arc::new(ManualClock::new(1_000)),
            settings,
        )
    }

    fn with_key(key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(key).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let eval = evaluator(Arc::new(LocalWindowCounter::new()), EvaluatorSettings::default());
        let decision = eval.evaluate("GET", "/a/1", &HeaderMap::new()).await;
        assert_eq!(decision, Decision::MissingApiKey);
        assert_eq!(decision.rejection_status(), Some(StatusCode::BAD_REQUEST));

        let decision = eval.evaluate("GET", "/a/1", &with_key("")).await;
        assert_eq!(decision, Decision::MissingApiKey);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let eval = evaluator(Arc::new(LocalWindowCounter::new()), EvaluatorSettings::default());
        let decision = eval.evaluate("GET", "/nope", &with_key("K")).await;
        assert_eq!(decision.rejection_status(), Some(StatusCode::NOT_FOUND));

        let eval = evaluator(
            Arc::new(LocalWindowCounter::new()),
            EvaluatorSettings {
                allow_unknown_paths: true,
                ..EvaluatorSettings::default()
            },
        );
        let decision = eval.evaluate("GET", "/nope", &with_key("K")).await;
        assert_eq!(decision, Decision::PassThrough);
        assert!(decision.forwards());
    }

    #[tokio::test]
    async fn test_missing_policy() {
        let eval = evaluator(Arc::new(LocalWindowCounter::new()), EvaluatorSettings::default());
        let decision = eval.evaluate("GET", "/a/1", &with_key("K")).await;
        assert_eq!(
            decision,
            Decision::NoPolicy {
                bucket: "K_GET_/a/{id}".to_string()
            }
        );
        assert_eq!(decision.rejection_status(), Some(StatusCode::FORBIDDEN));

        let eval = evaluator(
            Arc::new(LocalWindowCounter::new()),
            EvaluatorSettings {
                missing_policy: MissingPolicy::Allow,
                ..EvaluatorSettings::default()
            },
        );
        assert!(eval.evaluate("GET", "/a/1", &with_key("K")).await.forwards());
    }

    #[tokio::test]
    async fn test_allows_until_quota_then_limits() {
        let counter = Arc::new(LocalWindowCounter::new());
        counter.update_quota("K_GET_/a/{id}", 2);
        let eval = evaluator(counter.clone(), EvaluatorSettings::default());

        let first = eval.evaluate("GET", "/a/1", &with_key("K")).await;
        assert_eq!(
            first.headers(),
            Some(&RateLimitHeaders {
                limit: 2,
                remaining: 1,
                reset: 60
            })
        );
        assert!(first.forwards());

        let second = eval.evaluate("GET", "/a/2", &with_key("K")).await;
        assert_eq!(second.headers().map(|h| h.remaining), Some(0));
        assert!(second.forwards());

        let third = eval.evaluate("GET", "/a/3", &with_key("K")).await;
        assert_eq!(third.rejection_status(), Some(StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(
            third.headers(),
            Some(&RateLimitHeaders {
                limit: 2,
                remaining: 0,
                reset: 59
            })
        );
        // Denied requests are not counted.
        assert_eq!(counter.snapshot("K_GET_/a/{id}", 1_000).map(|s| s.sum), Some(2));
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let eval = evaluator(Arc::new(FailingCounter), EvaluatorSettings::default());
        let decision = eval.evaluate("GET", "/a/1", &with_key("K")).await;
        assert!(matches!(decision, Decision::FailedOpen { .. }));
        assert!(decision.forwards());
    }

    #[tokio::test]
    async fn test_blocked_key() {
        let clock = ManualClock::new(1_000);
        let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));
        let api_keys = Arc::new(StoreApiKeys::new(store, KeyLayout::default(), Arc::new(clock.clone())));
        api_keys.block_until("K", 1_020).await.unwrap();

        let counter = Arc::new(LocalWindowCounter::new());
        counter.update_quota("K_GET_/a/{id}", 10);
        let eval = RateLimitEvaluator::new(
            matcher(),
            counter,
            api_keys,
            Arc::new(clock),
            EvaluatorSettings::default(),
        );
        let decision = eval.evaluate("GET", "/a/1", &with_key("K")).await;
        assert_eq!(decision, Decision::Blocked { retry_after: 20 });
    }

    #[test]
    fn test_headers_apply() {
        let mut map = HeaderMap::new();
        RateLimitHeaders {
            limit: 5,
            remaining: 3,
            reset: 12,
        }
        .apply(&mut map);
        assert_eq!(map.get("RateLimit-Limit").unwrap(), "5");
        assert_eq!(map.get("RateLimit-Remaining").unwrap(), "3");
        assert_eq!(map.get("RateLimit-Reset").unwrap(), "12");
    }
}
