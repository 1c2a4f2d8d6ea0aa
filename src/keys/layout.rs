//! Per-family key table.
//!
//! Every entity family is described by exactly one row of [`FAMILIES`]. Key
//! builders, listing prefixes and the classifier patterns are all derived
//! from that row, so the id segment and the discriminator segment can never
//! be read from different positions by different components.

use std::fmt;

use regex::Regex;

use super::{dir_prefix, join};
use crate::errors::{Error, Result};

/// Entity families stored under the configuration root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Host,
    Listener,
    Frontend,
    Middleware,
    Backend,
    Server,
}

impl Family {
    /// Name used in logs and errors
    pub fn resource_type(self) -> &'static str {
        match self {
            Family::Host => "host",
            Family::Listener => "listener",
            Family::Frontend => "frontend",
            Family::Middleware => "middleware",
            Family::Backend => "backend",
            Family::Server => "server",
        }
    }

    fn spec(self) -> &'static FamilySpec {
        let row = match self {
            Family::Server => 0,
            Family::Backend => 1,
            Family::Middleware => 2,
            Family::Frontend => 3,
            Family::Host => 4,
            Family::Listener => 5,
        };
        &FAMILIES[row]
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_type())
    }
}

/// One row of the key table.
#[derive(Debug)]
struct FamilySpec {
    family: Family,
    /// Collection segment, under the root or under the parent's id
    collection: &'static str,
    /// Trailing literal of the record holding the entity's own data
    discriminator: Option<&'static str>,
    parent: Option<Family>,
}

/// Classifier order: most frequently mutated families first.
const FAMILIES: [FamilySpec; 6] = [
    FamilySpec {
        family: Family::Server,
        collection: "servers",
        discriminator: None,
        parent: Some(Family::Backend),
    },
    FamilySpec {
        family: Family::Backend,
        collection: "backends",
        discriminator: Some("backend"),
        parent: None,
    },
    FamilySpec {
        family: Family::Middleware,
        collection: "middlewares",
        discriminator: None,
        parent: Some(Family::Frontend),
    },
    FamilySpec {
        family: Family::Frontend,
        collection: "frontends",
        discriminator: Some("frontend"),
        parent: None,
    },
    FamilySpec {
        family: Family::Host,
        collection: "hosts",
        discriminator: Some("host"),
        parent: None,
    },
    FamilySpec {
        family: Family::Listener,
        collection: "listeners",
        discriminator: None,
        parent: None,
    },
];

/// Result of matching a key against the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMatch {
    pub family: Family,
    /// Owning frontend or backend id for middlewares and servers
    pub parent_id: Option<String>,
    pub id: String,
    /// Bare `<collection>/<id>` key without the discriminator (TTL marker)
    pub marker: bool,
}

#[derive(Debug, Clone)]
struct FamilyMatcher {
    family: Family,
    pattern: Regex,
}

/// Key grammar bound to a configuration root.
#[derive(Debug, Clone)]
pub struct KeyLayout {
    root: String,
    matchers: Vec<FamilyMatcher>,
}

impl KeyLayout {
    /// Build the layout for `root` (e.g. `/routeplane`).
    pub fn new(root: impl Into<String>) -> Result<Self> {
        let root = root.into();
        if !root.starts_with('/') || root.ends_with('/') {
            return Err(Error::validation_field(
                format!("root key '{}' must start with '/' and not end with '/'", root),
                "root_key",
            ));
        }

        let escaped_root = regex::escape(&root);
        let matchers = FAMILIES
            .iter()
            .map(|row| {
                let pattern = family_pattern(&escaped_root, row);
                Regex::new(&pattern)
                    .map(|pattern| FamilyMatcher { family: row.family, pattern })
                    .map_err(|e| Error::internal(format!("invalid key pattern {}: {}", pattern, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { root, matchers })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Listing prefix covering the whole configuration tree
    pub fn root_prefix(&self) -> String {
        dir_prefix(&self.root)
    }

    /// `<root>/<collection>` for a top-level family
    pub fn collection_dir(&self, family: Family) -> String {
        let row = family.spec();
        match row.parent {
            None => join(&self.root, [row.collection]),
            Some(parent) => join(&self.root, [parent.spec().collection]),
        }
    }

    /// `<root>/<collection>/<id>`: the subtree owned by one entity
    pub fn entity_dir(&self, family: Family, id: &str) -> String {
        join(&self.collection_dir(family), [id])
    }

    /// Key of the record that holds a top-level entity's own data.
    pub fn record_key(&self, family: Family, id: &str) -> String {
        let dir = self.entity_dir(family, id);
        match family.spec().discriminator {
            Some(discriminator) => join(&dir, [discriminator]),
            None => dir,
        }
    }

    /// Key of a middleware or server below its owner.
    pub fn child_key(&self, family: Family, parent_id: &str, id: &str) -> String {
        join(&self.children_dir(family, parent_id), [id])
    }

    /// `<root>/frontends/<id>/middlewares` or `<root>/backends/<id>/servers`
    pub fn children_dir(&self, family: Family, parent_id: &str) -> String {
        let row = family.spec();
        let parent = row.parent.unwrap_or(row.family);
        join(&self.entity_dir(parent, parent_id), [row.collection])
    }

    pub fn host_key(&self, name: &str) -> String {
        self.record_key(Family::Host, name)
    }

    pub fn listener_key(&self, id: &str) -> String {
        self.record_key(Family::Listener, id)
    }

    pub fn frontend_key(&self, id: &str) -> String {
        self.record_key(Family::Frontend, id)
    }

    pub fn middleware_key(&self, frontend_id: &str, id: &str) -> String {
        self.child_key(Family::Middleware, frontend_id, id)
    }

    pub fn backend_key(&self, id: &str) -> String {
        self.record_key(Family::Backend, id)
    }

    pub fn server_key(&self, backend_id: &str, id: &str) -> String {
        self.child_key(Family::Server, backend_id, id)
    }

    /// Match `key` against the families in classifier order; first hit wins.
    pub fn match_key(&self, key: &str) -> Option<KeyMatch> {
        self.matchers.iter().find_map(|matcher| {
            let captures = matcher.pattern.captures(key)?;
            let row = matcher.family.spec();
            let first = captures.get(1)?.as_str().to_string();
            let key_match = match row.parent {
                Some(_) => KeyMatch {
                    family: matcher.family,
                    parent_id: Some(first),
                    id: captures.get(2)?.as_str().to_string(),
                    marker: false,
                },
                None => KeyMatch {
                    family: matcher.family,
                    parent_id: None,
                    id: first,
                    marker: row.discriminator.is_some() && captures.get(2).is_none(),
                },
            };
            Some(key_match)
        })
    }
}

fn family_pattern(escaped_root: &str, row: &FamilySpec) -> String {
    match (row.parent, row.discriminator) {
        (Some(parent), _) => format!(
            "^{}/{}/([^/]+)/{}/([^/]+)$",
            escaped_root,
            parent.spec().collection,
            row.collection
        ),
        (None, Some(discriminator)) => {
            format!("^{}/{}/([^/]+)(/{})?$", escaped_root, row.collection, discriminator)
        }
        (None, None) => format!("^{}/{}/([^/]+)$", escaped_root, row.collection),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> KeyLayout {
        KeyLayout::new("/vulcand").unwrap()
    }

    #[test]
    fn every_family_resolves_to_its_own_row() {
        for row in &FAMILIES {
            assert_eq!(row.family.spec().family, row.family);
        }
    }

    #[test]
    fn record_keys_follow_grammar() {
        let layout = layout();
        assert_eq!(layout.host_key("h1"), "/vulcand/hosts/h1/host");
        assert_eq!(layout.listener_key("l1"), "/vulcand/listeners/l1");
        assert_eq!(layout.frontend_key("f1"), "/vulcand/frontends/f1/frontend");
        assert_eq!(layout.middleware_key("f1", "m1"), "/vulcand/frontends/f1/middlewares/m1");
        assert_eq!(layout.backend_key("b1"), "/vulcand/backends/b1/backend");
        assert_eq!(layout.server_key("b1", "s1"), "/vulcand/backends/b1/servers/s1");
    }

    #[test]
    fn directories_follow_grammar() {
        let layout = layout();
        assert_eq!(layout.root_prefix(), "/vulcand/");
        assert_eq!(layout.collection_dir(Family::Host), "/vulcand/hosts");
        assert_eq!(layout.collection_dir(Family::Server), "/vulcand/backends");
        assert_eq!(layout.entity_dir(Family::Frontend, "f1"), "/vulcand/frontends/f1");
        assert_eq!(
            layout.children_dir(Family::Middleware, "f1"),
            "/vulcand/frontends/f1/middlewares"
        );
        assert_eq!(layout.children_dir(Family::Server, "b1"), "/vulcand/backends/b1/servers");
    }

    #[test]
    fn id_is_segment_before_discriminator() {
        let layout = layout();
        let cases = [
            ("/vulcand/hosts/h1/host", Family::Host, None, "h1"),
            ("/vulcand/listeners/l1", Family::Listener, None, "l1"),
            ("/vulcand/frontends/f1/frontend", Family::Frontend, None, "f1"),
            ("/vulcand/frontends/f1/middlewares/m1", Family::Middleware, Some("f1"), "m1"),
            ("/vulcand/backends/b1/backend", Family::Backend, None, "b1"),
            ("/vulcand/backends/b1/servers/s1", Family::Server, Some("b1"), "s1"),
        ];

        for (key, family, parent_id, id) in cases {
            let matched = layout.match_key(key).unwrap_or_else(|| panic!("no match for {}", key));
            assert_eq!(matched.family, family, "{}", key);
            assert_eq!(matched.parent_id.as_deref(), parent_id, "{}", key);
            assert_eq!(matched.id, id, "{}", key);
            assert!(!matched.marker, "{}", key);
        }
    }

    #[test]
    fn discriminator_named_ids_are_not_transposed() {
        let layout = layout();
        let matched = layout.match_key("/vulcand/hosts/host/host").unwrap();
        assert_eq!(matched.id, "host");
        assert!(!matched.marker);

        let matched = layout.match_key("/vulcand/backends/backend").unwrap();
        assert_eq!(matched.family, Family::Backend);
        assert_eq!(matched.id, "backend");
        assert!(matched.marker);
    }

    #[test]
    fn bare_entity_keys_are_markers() {
        let layout = layout();
        let matched = layout.match_key("/vulcand/frontends/f1").unwrap();
        assert_eq!(matched.family, Family::Frontend);
        assert_eq!(matched.id, "f1");
        assert!(matched.marker);

        assert!(layout.match_key("/vulcand/hosts/h1").unwrap().marker);
    }

    #[test]
    fn unrelated_keys_do_not_match() {
        let layout = layout();
        for key in [
            "/vulcand",
            "/vulcand/hosts",
            "/vulcand/frontends/f1/middlewares",
            "/vulcand/backends/b1/servers",
            "/vulcand/hosts/h1/host/extra",
            "/vulcand/listeners/l1/extra",
            "/other/hosts/h1/host",
            "/vulcandx/hosts/h1/host",
            "/vulcand/frontends/f1/settings",
        ] {
            assert_eq!(layout.match_key(key), None, "{}", key);
        }
    }

    #[test]
    fn root_is_matched_literally() {
        let layout = KeyLayout::new("/a.b").unwrap();
        assert!(layout.match_key("/a.b/hosts/h1/host").is_some());
        assert!(layout.match_key("/aXb/hosts/h1/host").is_none());
    }

    #[test]
    fn invalid_roots_are_rejected() {
        assert!(KeyLayout::new("vulcand").is_err());
        assert!(KeyLayout::new("/vulcand/").is_err());
        assert!(KeyLayout::new("").is_err());
    }
}
