//! Route entries derived from templated catalog paths.

use regex::Regex;
use std::sync::LazyLock;

/// `{name}` placeholder with an optional literal suffix up to the next `/`.
static TEMPLATE_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(.+?)\}([^/]*)").expect("template placeholder regex"));

/// Rewrite `{name}` placeholders of a templated path into `:name` router
/// parameters. A literal suffix after a placeholder is dropped along with it.
#[must_use]
pub fn router_pattern(template: &str) -> String {
    TEMPLATE_PARAM.replace_all(template, ":$1").into_owned()
}

/// A route known to the matcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteEntry {
    method: String,
    template: String,
    pattern: String,
    bucket_key: String,
}

impl RouteEntry {
    /// Derive an entry from a method and a templated path.
    #[must_use]
    pub fn new(method: &str, template: &str) -> Self {
        let method = method.to_ascii_uppercase();
        let bucket_key = format!("{method}_{template}");
        Self {
            pattern: router_pattern(template),
            template: template.to_string(),
            method,
            bucket_key,
        }
    }

    /// Uppercase HTTP method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Path as written in the catalog, e.g. `/users/{id}`.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Path in router syntax, e.g. `/users/:id`.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Rate limit bucket for this route, `METHOD_template`.
    #[must_use]
    pub fn bucket_key(&self) -> &str {
        &self.bucket_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_pattern() {
        assert_eq!(router_pattern("/a/{id}"), "/a/:id");
        assert_eq!(router_pattern("/a/{id}/b/{name}"), "/a/:id/b/:name");
        assert_eq!(router_pattern("/files/{name}.json"), "/files/:name");
        assert_eq!(router_pattern("/static/path"), "/static/path");
    }

    #[test]
    fn test_entry_normalizes_method() {
        let entry = RouteEntry::new("get", "/a/{id}");
        assert_eq!(entry.method(), "GET");
        assert_eq!(entry.pattern(), "/a/:id");
        assert_eq!(entry.template(), "/a/{id}");
        assert_eq!(entry.bucket_key(), "GET_/a/{id}");
    }

    #[test]
    fn test_entry_is_pure() {
        assert_eq!(RouteEntry::new("Post", "/x/{y}"), RouteEntry::new("POST", "/x/{y}"));
    }
}
