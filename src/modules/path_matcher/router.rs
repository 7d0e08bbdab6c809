//! Compiled route lookup.

use super::entry::RouteEntry;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A segment of a router pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    /// Literal segment (exact match).
    Literal(String),
    /// Named parameter (`:name`), one non-empty segment.
    Param,
    /// Trailing catch-all (`*name`), any remaining segments.
    CatchAll,
}

impl PathSegment {
    fn parse(part: &str) -> Self {
        if part.starts_with(':') {
            Self::Param
        } else if part.starts_with('*') {
            Self::CatchAll
        } else {
            Self::Literal(part.to_string())
        }
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[derive(Debug, Clone)]
struct Node<T> {
    literals: HashMap<String, Node<T>>,
    param: Option<Box<Node<T>>>,
    catch_all: Option<T>,
    value: Option<T>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            literals: HashMap::new(),
            param: None,
            catch_all: None,
            value: None,
        }
    }
}

impl<T> Node<T> {
    fn find(&self, parts: &[&str]) -> Option<&T> {
        let Some((first, rest)) = parts.split_first() else {
            return self.value.as_ref().or(self.catch_all.as_ref());
        };

        // Literal children win over parameters; fall back when the literal
        // branch dead-ends further down.
        if let Some(found) = self.literals.get(*first).and_then(|child| child.find(rest)) {
            return Some(found);
        }
        if let Some(found) = self.param.as_ref().and_then(|child| child.find(rest)) {
            return Some(found);
        }
        self.catch_all.as_ref()
    }
}

/// Segment trie mapping router patterns to values.
///
/// Patterns are `/`-separated; empty segments are ignored, so `/a/` and `/a`
/// are the same route.
#[derive(Debug, Clone)]
pub struct RouteTree<T> {
    root: Node<T>,
    len: usize,
}

impl<T> Default for RouteTree<T> {
    fn default() -> Self {
        Self {
            root: Node::default(),
            len: 0,
        }
    }
}

impl<T> RouteTree<T> {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` under `pattern`.
    ///
    /// Returns `false` and keeps the existing value when an equivalent
    /// pattern is already present. Segments after a catch-all are ignored.
    pub fn insert(&mut self, pattern: &str, value: T) -> bool {
        let mut node = &mut self.root;
        for part in split_path(pattern) {
            match PathSegment::parse(part) {
                PathSegment::Literal(lit) => node = node.literals.entry(lit).or_default(),
                PathSegment::Param => node = node.param.get_or_insert_with(Box::default).as_mut(),
                PathSegment::CatchAll => {
                    if node.catch_all.is_some() {
                        return false;
                    }
                    node.catch_all = Some(value);
                    self.len += 1;
                    return true;
                },
            }
        }
        if node.value.is_some() {
            return false;
        }
        node.value = Some(value);
        self.len += 1;
        true
    }

    /// Value of the best matching pattern for `path`.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&T> {
        let parts: Vec<&str> = split_path(path).collect();
        self.root.find(&parts)
    }

    /// Number of patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree has no patterns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// One compiled generation of routes, a [`RouteTree`] per method.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    trees: HashMap<String, RouteTree<Arc<RouteEntry>>>,
}

impl RouteTable {
    /// Compile a table from per-method entry lists.
    #[must_use]
    pub fn build(records: &HashMap<String, Vec<Arc<RouteEntry>>>) -> Self {
        let mut trees = HashMap::with_capacity(records.len());
        for (method, entries) in records {
            if entries.is_empty() {
                continue;
            }
            let mut tree = RouteTree::new();
            for entry in entries {
                if !tree.insert(entry.pattern(), Arc::clone(entry)) {
                    debug!(method = %method, pattern = entry.pattern(), "shadowed route pattern ignored");
                }
            }
            trees.insert(method.clone(), tree);
        }
        Self { trees }
    }

    /// Entry matching `method` and `path`.
    #[must_use]
    pub fn lookup(&self, method: &str, path: &str) -> Option<&Arc<RouteEntry>> {
        let method = if method.bytes().any(|b| b.is_ascii_lowercase()) {
            Cow::Owned(method.to_ascii_uppercase())
        } else {
            Cow::Borrowed(method)
        };
        self.trees.get(method.as_ref())?.lookup(path)
    }

    /// Total number of routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.trees.values().map(RouteTree::len).sum()
    }
}
