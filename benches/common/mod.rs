#![allow(missing_docs, dead_code)]
//! Shared benchmark support: runtimes and catalog data generators.

use r0n_dynlimits::modules::catalog::{ApiKeyLimits, Catalog, Endpoint, EndpointLimit};

/// Create a current-thread Tokio runtime for async benchmarks.
pub fn bench_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime for benchmarks")
}

/// Templated paths shaped like a typical REST API.
pub fn route_templates(count: usize) -> Vec<String> {
    let resources = ["users", "orders", "products", "invoices", "teams"];
    (0..count)
        .map(|i| {
            let resource = resources[i % resources.len()];
            match i % 4 {
                0 => format!("/v{}/{resource}", i / 4),
                1 => format!("/v{}/{resource}/{{id}}", i / 4),
                2 => format!("/v{}/{resource}/{{id}}/items", i / 4),
                _ => format!("/v{}/{resource}/{{id}}/items/{{item}}", i / 4),
            }
        })
        .collect()
}

/// A concrete request path for a template.
pub fn concrete_path(template: &str) -> String {
    template.replace("{id}", "4711").replace("{item}", "9")
}

/// A catalog with `routes` GET endpoints and `keys` API keys limited on each.
pub fn catalog(routes: usize, keys: usize) -> Catalog {
    Catalog {
        methods: vec!["GET".to_string()],
        paths: route_templates(routes),
        endpoints: (0..routes as i64)
            .map(|p| Endpoint {
                path_idx: p,
                method_idx: 0,
            })
            .collect(),
        api_limits: (0..keys)
            .map(|k| ApiKeyLimits {
                api_key: format!("key-{k}"),
                limits: (0..routes as i64)
                    .map(|ep| EndpointLimit {
                        endpoint_idx: ep,
                        rate_limit: 1_000,
                    })
                    .collect(),
            })
            .collect(),
        ..Catalog::default()
    }
}
