use std::collections::BTreeSet;

use crate::storage::ObjectStore;
use crate::types::Result;

/// A node's child names split by edge kind. The two sets never overlap.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EdgeSets {
    /// Plain child attributes.
    pub attributes: BTreeSet<String>,
    /// Named relationships.
    pub relationships: BTreeSet<String>,
}

/// Partitions the child names of `node` into attributes and relationships.
///
/// A node that cannot list children or has no relationships contributes an
/// empty set for that half.
pub fn classify_edges<S: ObjectStore>(store: &S, node: &S::Node) -> Result<EdgeSets> {
    let relationships = store.relationship_names(node)?.unwrap_or_default();
    let mut attributes = store.child_names(node)?.unwrap_or_default();
    attributes.retain(|name| !relationships.contains(name));
    Ok(EdgeSets {
        attributes,
        relationships,
    })
}
