//! # Path Matcher
//!
//! Maps a request's method and concrete path to the catalog route it belongs
//! to, and from there to the route's rate limit bucket key.
//!
//! Catalog paths are templates such as `/users/{id}`. They are rewritten into
//! router patterns (`/users/:id`) and compiled into one segment trie per
//! method. The compiled [`RouteTable`] is immutable; updates go through a
//! [`ChangeSet`] on the [`SharedRouteMatcher`] and replace the whole table at
//! commit.
//!
//! ## Usage
//!
//! ```ignore
//! let matcher = Arc::new(SharedRouteMatcher::new());
//!
//! let mut changes = matcher.start_change_set();
//! changes.remove_all();
//! changes.add_route("GET", "/users/{id}");
//! changes.commit();
//!
//! let entry = matcher.lookup("GET", "/users/42").unwrap();
//! assert_eq!(entry.bucket_key(), "GET_/users/{id}");
//! ```

mod entry;
mod router;
mod shared;

pub use entry::{router_pattern, RouteEntry};
pub use router::{RouteTable, RouteTree};
pub use shared::{ChangeSet, SharedRouteMatcher};
