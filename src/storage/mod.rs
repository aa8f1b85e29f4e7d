//! Object store interface and the snapshot-backed reference store.
//!
//! The audit engine never touches records directly. It navigates through
//! [`ObjectStore`], repairs through [`RepairableStore`] and sweeps catalogs
//! through [`CatalogStore`]. All three take `&self`: a traversal holds a
//! shared borrow of the store while repairs commit between pulls, so
//! implementations are expected to use interior mutability.

use std::collections::BTreeSet;
use std::fmt;

use crate::types::{Address, ObjectPath, Result};

mod builder;
mod memory;
mod snapshot;

/// Builder for [`MemoryStore`] contents, including deliberate corruption.
pub use builder::{StoreBuilder, CONTAINMENT_CLASS, OBJECTS_CLASS, RELATIONSHIP_CLASS};

/// Snapshot-backed store.
pub use memory::{MemoryNode, MemoryStore, DERIVED_INDEX_CLASS};

/// On-disk snapshot format.
pub use snapshot::{ObjectRef, Record, RecordBody, Snapshot, SNAPSHOT_FORMAT_VERSION};

/// Read side of a persistent object graph.
pub trait ObjectStore {
    /// Handle to one object. Cheap to clone; never owns the record.
    type Node: Clone + fmt::Debug + 'static;

    /// Resolves a path from the store root.
    ///
    /// Fails with [`StoreError::PathNotFound`](crate::types::StoreError::PathNotFound)
    /// when nothing lives there.
    fn resolve_path(&self, path: &ObjectPath) -> Result<Self::Node>;

    /// Path of `node` from the store root.
    fn physical_path(&self, node: &Self::Node) -> ObjectPath;

    /// Address of the record behind `node`. Does not load the record.
    fn physical_address(&self, node: &Self::Node) -> Address;

    /// Class recorded on the reference to `node`. Does not load the record.
    fn class_name(&self, node: &Self::Node) -> String;

    /// All child names of `node`, or `None` when the node cannot list children.
    fn child_names(&self, _node: &Self::Node) -> Result<Option<BTreeSet<String>>> {
        Ok(None)
    }

    /// Declared relationship names of `node`, or `None` when the node has no
    /// relationships.
    fn relationship_names(&self, _node: &Self::Node) -> Result<Option<BTreeSet<String>>> {
        Ok(None)
    }

    /// Dereferences the child slot `name` of `node`.
    fn get_child(&self, node: &Self::Node, name: &str) -> Result<Self::Node>;

    /// Invokes a relationship, materializing its members.
    ///
    /// This is how lazily detected corruption of a relationship's backing
    /// collection surfaces.
    fn invoke(&self, node: &Self::Node) -> Result<()>;

    /// Loads `node` and returns its identifier.
    fn identifier(&self, node: &Self::Node) -> Result<String>;

    /// True when `node` is a relationship whose members are themselves graph
    /// nodes to be walked.
    fn is_containment(&self, node: &Self::Node) -> Result<bool>;

    /// Durably persists every mutation since the last commit.
    fn commit(&self) -> Result<()>;
}

/// Mutations used by the repair strategies.
pub trait RepairableStore: ObjectStore {
    /// Address of a relationship's ordered-objects container, or `None` when
    /// `rel` is not a relationship.
    fn objects_container_address(&self, rel: &Self::Node) -> Result<Option<Address>>;

    /// Replaces a relationship's container with a fresh empty one of the same
    /// class.
    fn reset_objects_container(&self, rel: &Self::Node) -> Result<()>;

    /// Flags `node` as carrying unsaved changes.
    fn mark_changed(&self, node: &Self::Node) -> Result<()>;

    /// Removes the child slot `name` from `parent`.
    fn delete_child(&self, parent: &Self::Node, name: &str) -> Result<()>;

    /// Constructs a fresh object of `class` and attaches it as `name`.
    fn attach_fresh(&self, parent: &Self::Node, name: &str, class: &str) -> Result<()>;

    /// Asks `parent` to rebuild the derived structure stored as `name`.
    fn rebuild_derived(&self, parent: &Self::Node, name: &str) -> Result<()>;
}

/// Catalog access used by the catalog sweep.
pub trait CatalogStore: ObjectStore {
    /// Paths indexed by `catalog`.
    fn catalog_entries(&self, catalog: &Self::Node) -> Result<Vec<ObjectPath>>;

    /// Drops `entry` from `catalog`.
    fn uncatalog(&self, catalog: &Self::Node, entry: &ObjectPath) -> Result<()>;

    /// Rebuilds every catalog held directly by `node` from the live objects
    /// below it. Returns how many catalogs were rebuilt.
    fn reindex(&self, node: &Self::Node) -> Result<u64>;
}
