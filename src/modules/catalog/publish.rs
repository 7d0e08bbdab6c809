//! Applying a catalog to the route matcher and the quota store.

use super::model::Catalog;
use crate::modules::path_matcher::SharedRouteMatcher;
use crate::modules::rate_limiting::{RateLimitResult, WindowCounter};
use tracing::{debug, info, warn};

/// Outcome of a quota publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Quota records written.
    pub published: usize,
    /// Entries skipped because an index was out of range.
    pub skipped: usize,
}

/// Quota bucket name of an API key on an endpoint.
#[must_use]
pub fn quota_bucket(api_key: &str, method: &str, path: &str) -> String {
    format!("{api_key}_{}_{path}", method.to_ascii_uppercase())
}

/// Replace the matcher's routes with the catalog's endpoints.
///
/// Runs as a single change set, so readers see either the previous routes
/// or the new ones. Endpoints with dangling indices are left out.
///
/// Returns the number of routes now live.
pub fn update_route_matcher(catalog: &Catalog, matcher: &SharedRouteMatcher) -> usize {
    let mut change_set = matcher.start_change_set();
    change_set.remove_all();

    let mut skipped = 0usize;
    for (idx, endpoint) in catalog.endpoints.iter().enumerate() {
        match catalog.resolve_endpoint(endpoint) {
            Some((method, path)) => {
                if !change_set.add_route(method, path) {
                    debug!(method, path, "duplicate route ignored");
                }
            },
            None => {
                skipped += 1;
                warn!(endpoint = idx, "skipping endpoint with out of range index");
            },
        }
    }

    let routes = change_set.commit();
    info!(routes, skipped, "route matcher updated");
    routes
}

/// Quota records for every resolvable `(api key, endpoint)` pair.
///
/// Returns the records and the number of skipped entries.
#[must_use]
pub fn collect_quotas(catalog: &Catalog) -> (Vec<(String, i64)>, usize) {
    let mut quotas = Vec::with_capacity(catalog.limit_count());
    let mut skipped = 0usize;

    for (api_idx, key_limits) in catalog.api_limits.iter().enumerate() {
        for (limit_idx, limit) in key_limits.limits.iter().enumerate() {
            match catalog.resolve_endpoint_idx(limit.endpoint_idx) {
                Some((method, path)) => {
                    quotas.push((quota_bucket(&key_limits.api_key, method, path), limit.rate_limit));
                },
                None => {
                    skipped += 1;
                    warn!(
                        api_limit = api_idx,
                        limit = limit_idx,
                        endpoint = limit.endpoint_idx,
                        "skipping quota with out of range endpoint"
                    );
                },
            }
        }
    }

    (quotas, skipped)
}

/// Upsert the catalog's quotas through the counter.
///
/// # Errors
///
/// Returns an error if the counter cannot store the quotas. Out of range
/// entries are skipped, never an error.
pub async fn publish_quotas(
    catalog: &Catalog,
    counter: &dyn WindowCounter,
) -> RateLimitResult<PublishReport> {
    let (quotas, skipped) = collect_quotas(catalog);
    counter.set_quotas(&quotas).await?;

    let report = PublishReport {
        published: quotas.len(),
        skipped,
    };
    info!(
        published = report.published,
        skipped = report.skipped,
        version = %catalog.version.semver,
        "quotas published"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::catalog::{ApiKeyLimits, Endpoint, EndpointLimit};
    use crate::modules::rate_limiting::LocalWindowCounter;

    fn scenario_catalog() -> Catalog {
        Catalog {
            methods: vec!["GET".to_string()],
            paths: vec!["/a/{id}".to_string()],
            endpoints: vec![Endpoint { path_idx: 0, method_idx: 0 }],
            api_limits: vec![ApiKeyLimits {
                api_key: "K".to_string(),
                limits: vec![EndpointLimit { endpoint_idx: 0, rate_limit: 5 }],
            }],
            ..Catalog::default()
        }
    }

    #[test]
    fn test_update_route_matcher() {
        let catalog = scenario_catalog();
        assert!(catalog.validate().is_empty());

        let matcher = SharedRouteMatcher::new();
        assert_eq!(update_route_matcher(&catalog, &matcher), 1);

        let entry = matcher.lookup("GET", "/a/123").unwrap();
        assert_eq!(entry.bucket_key(), "GET_/a/{id}");
        assert!(matcher.lookup("POST", "/a/123").is_none());
    }

    #[test]
    fn test_update_replaces_previous_routes() {
        let matcher = SharedRouteMatcher::new();
        update_route_matcher(&scenario_catalog(), &matcher);

        let mut next = scenario_catalog();
        next.paths = vec!["/b".to_string()];
        update_route_matcher(&next, &matcher);

        assert!(matcher.lookup("GET", "/a/123").is_none());
        assert!(matcher.lookup("GET", "/b").is_some());
        assert_eq!(matcher.route_count(), 1);
    }

    #[test]
    fn test_update_skips_dangling_endpoints() {
        let mut catalog = scenario_catalog();
        catalog.endpoints.push(Endpoint { path_idx: 4, method_idx: 0 });
        let matcher = SharedRouteMatcher::new();
        assert_eq!(update_route_matcher(&catalog, &matcher), 1);
    }

    #[test]
    fn test_collect_quotas() {
        let mut catalog = scenario_catalog();
        catalog.methods = vec!["get".to_string()];
        catalog.api_limits[0].limits.push(EndpointLimit { endpoint_idx: 3, rate_limit: 1 });

        let (quotas, skipped) = collect_quotas(&catalog);
        assert_eq!(quotas, vec![("K_GET_/a/{id}".to_string(), 5)]);
        assert_eq!(skipped, 1);
    }

    #[tokio::test]
    async fn test_publish_quotas() {
        let counter = LocalWindowCounter::new();
        let report = publish_quotas(&scenario_catalog(), &counter).await.unwrap();
        assert_eq!(report, PublishReport { published: 1, skipped: 0 });

        let snapshot = counter.fetch("K_GET_/a/{id}", 100).await.unwrap();
        assert_eq!(snapshot.quota, 5);
    }
}
