//! Dotted relation paths such as `orders.items.product`.

#![allow(clippy::result_large_err)]

use ormlink_core::{ConfigErrorKind, Error, Result, validate_identifier};
use ormlink_query::RelationQuery;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A function applied to the query of a path's last segment.
pub type QueryCustomizer = Arc<dyn Fn(RelationQuery) -> RelationQuery + Send + Sync>;

/// A chain of relation names, optionally with a query customizer.
///
/// ```
/// use ormlink_relations::RelationPath;
///
/// let path = RelationPath::parse("orders.items").unwrap();
/// assert_eq!(path.segments(), ["orders", "items"]);
/// assert!(RelationPath::parse("orders..items").is_err());
/// ```
#[derive(Clone)]
pub struct RelationPath {
    segments: Vec<String>,
    customize: Option<QueryCustomizer>,
}

impl RelationPath {
    /// Parse a dotted path. Every segment must be a valid identifier.
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(Error::config(
                ConfigErrorKind::InvalidPath,
                "relation path must not be empty",
            ));
        }
        let mut segments = Vec::new();
        for segment in trimmed.split('.') {
            if segment.is_empty() {
                return Err(Error::config(
                    ConfigErrorKind::InvalidPath,
                    format!("relation path '{}' has an empty segment", trimmed),
                ));
            }
            validate_identifier("relation path segment", segment)?;
            segments.push(segment.to_string());
        }
        Ok(Self {
            segments,
            customize: None,
        })
    }

    /// Parse a path and attach a customizer for its last segment's query.
    ///
    /// ```
    /// use ormlink_query::OrderBy;
    /// use ormlink_relations::RelationPath;
    ///
    /// let path = RelationPath::with("orders", |q| q.order_by(OrderBy::desc("total"))).unwrap();
    /// assert!(path.customizer().is_some());
    /// ```
    pub fn with(
        path: &str,
        customize: impl Fn(RelationQuery) -> RelationQuery + Send + Sync + 'static,
    ) -> Result<Self> {
        Ok(Self::parse(path)?.customize(customize))
    }

    /// Attach (replace) the customizer.
    pub fn customize(
        mut self,
        customize: impl Fn(RelationQuery) -> RelationQuery + Send + Sync + 'static,
    ) -> Self {
        self.customize = Some(Arc::new(customize));
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn first(&self) -> &str {
        self.segments.first().map_or("", String::as_str)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false; parsing rejects empty paths.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_nested(&self) -> bool {
        self.segments.len() > 1
    }

    pub fn customizer(&self) -> Option<&QueryCustomizer> {
        self.customize.as_ref()
    }
}

impl FromStr for RelationPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for RelationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl fmt::Debug for RelationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationPath")
            .field("segments", &self.segments)
            .field("customized", &self.customize.is_some())
            .finish()
    }
}

/// Paths grouped by their first segment, in first-mention order.
#[derive(Clone)]
pub(crate) struct PathNode {
    pub relation: String,
    pub customize: Option<QueryCustomizer>,
    pub children: Vec<PathNode>,
}

impl PathNode {
    fn new(relation: &str) -> Self {
        Self {
            relation: relation.to_string(),
            customize: None,
            children: Vec::new(),
        }
    }

    fn insert(&mut self, rest: &[String], customize: Option<&QueryCustomizer>) {
        match rest.split_first() {
            None => {
                if let Some(f) = customize {
                    self.customize = Some(compose(self.customize.take(), f));
                }
            }
            Some((head, tail)) => child_mut(&mut self.children, head).insert(tail, customize),
        }
    }
}

fn child_mut<'a>(nodes: &'a mut Vec<PathNode>, relation: &str) -> &'a mut PathNode {
    let idx = match nodes.iter().position(|n| n.relation == relation) {
        Some(idx) => idx,
        None => {
            nodes.push(PathNode::new(relation));
            nodes.len() - 1
        }
    };
    &mut nodes[idx]
}

// Two customizers for the same segment run in the order they were given.
fn compose(first: Option<QueryCustomizer>, second: &QueryCustomizer) -> QueryCustomizer {
    match first {
        None => Arc::clone(second),
        Some(first) => {
            let second = Arc::clone(second);
            Arc::new(move |q| second(first(q)))
        }
    }
}

/// Merge paths into a tree so shared prefixes are resolved once.
pub(crate) fn build_tree(paths: &[RelationPath]) -> Vec<PathNode> {
    let mut roots: Vec<PathNode> = Vec::new();
    for path in paths {
        if let Some((head, tail)) = path.segments.split_first() {
            child_mut(&mut roots, head).insert(tail, path.customizer());
        }
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormlink_query::Expr;

    #[test]
    fn test_parse_segments() {
        let path = RelationPath::parse(" orders.items.product ").unwrap();
        assert_eq!(path.segments(), ["orders", "items", "product"]);
        assert_eq!(path.first(), "orders");
        assert!(path.is_nested());
        assert_eq!(path.to_string(), "orders.items.product");
    }

    #[test]
    fn test_parse_rejects_empty() {
        for bad in ["", "  ", ".", "orders.", ".orders", "orders..items"] {
            let err = RelationPath::parse(bad).unwrap_err();
            assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidPath), "{bad:?}");
        }
    }

    #[test]
    fn test_parse_rejects_bad_identifier() {
        let err = RelationPath::parse("orders.it-ems").unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidIdentifier));
    }

    #[test]
    fn test_from_str() {
        let path: RelationPath = "customer".parse().unwrap();
        assert!(!path.is_nested());
        assert_eq!(path.len(), 1);
    }

    #[test]
    fn test_tree_merges_shared_prefixes() {
        let paths = [
            RelationPath::parse("orders.items").unwrap(),
            RelationPath::parse("address").unwrap(),
            RelationPath::parse("orders.customer").unwrap(),
            RelationPath::parse("orders").unwrap(),
        ];
        let tree = build_tree(&paths);
        let names: Vec<_> = tree.iter().map(|n| n.relation.as_str()).collect();
        assert_eq!(names, ["orders", "address"]);
        let children: Vec<_> = tree[0].children.iter().map(|n| n.relation.as_str()).collect();
        assert_eq!(children, ["items", "customer"]);
    }

    #[test]
    fn test_customizer_lands_on_last_segment() {
        let paths = [RelationPath::with("orders.items", |q| q.limit(1)).unwrap()];
        let tree = build_tree(&paths);
        assert!(tree[0].customize.is_none());
        let f = tree[0].children[0].customize.as_ref().unwrap();
        assert_eq!(f(RelationQuery::new("items")).limit, Some(1));
    }

    #[test]
    fn test_customizers_compose_in_order() {
        let paths = [
            RelationPath::with("orders", |q| q.filter(Expr::col("a").eq(1))).unwrap(),
            RelationPath::with("orders", |q| q.limit(5)).unwrap(),
        ];
        let tree = build_tree(&paths);
        let f = tree[0].customize.as_ref().unwrap();
        let q = f(RelationQuery::new("orders"));
        assert!(q.filter.is_some());
        assert_eq!(q.limit, Some(5));
    }
}
