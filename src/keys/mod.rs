//! # Key Paths
//!
//! Pure helpers for composing and decomposing store keys, plus the
//! [`KeyLayout`] table that maps every entity family onto the key grammar:
//!
//! ```text
//! <root>/hosts/<hostName>/host
//! <root>/listeners/<listenerId>
//! <root>/frontends/<frontendId>/frontend
//! <root>/frontends/<frontendId>/middlewares/<middlewareId>
//! <root>/backends/<backendId>/backend
//! <root>/backends/<backendId>/servers/<serverId>
//! ```

pub mod layout;

pub use layout::{Family, KeyLayout, KeyMatch};

/// Separator between key segments
pub const SEPARATOR: char = '/';

/// Last segment of `path`, or the whole path when it has no separator.
///
/// A trailing separator yields an empty segment.
pub fn last_segment(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Everything before the last separator, or the whole path when it has none.
pub fn parent_path(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[..idx],
        None => path,
    }
}

/// Join `base` and `segments` with the separator.
///
/// `join(base, [])` returns `base` unchanged; an empty base produces a
/// leading separator, so `join("", ["a"])` is `"/a"`.
pub fn join<I, S>(base: &str, segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut path = String::from(base);
    for segment in segments {
        path.push(SEPARATOR);
        path.push_str(segment.as_ref());
    }
    path
}

/// Ids become single path segments: non-empty and separator free.
pub fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty() && !segment.contains(SEPARATOR)
}

/// `path` turned into a listing prefix that only matches keys strictly below it.
pub fn dir_prefix(path: &str) -> String {
    let mut prefix = String::with_capacity(path.len() + 1);
    prefix.push_str(path);
    prefix.push(SEPARATOR);
    prefix
}
