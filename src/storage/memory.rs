use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::snapshot::{ObjectRef, Record, RecordBody, Snapshot};
use super::{CatalogStore, ObjectStore, RepairableStore};
use crate::types::{Address, Failure, ObjectPath, Result, StoreError};

/// Class given to derived structures rebuilt by [`RepairableStore::rebuild_derived`].
pub const DERIVED_INDEX_CLASS: &str = "ComponentSearch";

/// Handle to an object in a [`MemoryStore`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemoryNode {
    oid: Address,
    class: String,
    path: ObjectPath,
}

impl MemoryNode {
    /// Address of the referenced record.
    pub fn address(&self) -> Address {
        self.oid
    }

    /// Class recorded on the reference.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Path from the store root.
    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    fn from_ref(target: &ObjectRef, path: ObjectPath) -> Self {
        Self {
            oid: target.oid,
            class: target.class.clone(),
            path,
        }
    }
}

struct StoreState {
    snapshot: Snapshot,
    base_generation: u64,
    changed: BTreeSet<Address>,
    commits: u64,
}

/// Object store held in memory and optionally persisted to a snapshot file.
///
/// Reads see uncommitted changes made through the same store. With a backing
/// file, [`ObjectStore::commit`] refuses to overwrite a snapshot whose
/// generation moved since this store last loaded or committed it.
pub struct MemoryStore {
    path: Option<PathBuf>,
    state: RwLock<StoreState>,
}

impl MemoryStore {
    /// Wraps a snapshot without a backing file.
    pub fn new(snapshot: Snapshot) -> Self {
        let base_generation = snapshot.generation;
        Self {
            path: None,
            state: RwLock::new(StoreState {
                snapshot,
                base_generation,
                changed: BTreeSet::new(),
                commits: 0,
            }),
        }
    }

    /// Opens a snapshot file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let snapshot = Snapshot::read(path)?;
        debug!(
            path = %path.display(),
            generation = snapshot.generation,
            records = snapshot.records.len(),
            "store.open"
        );
        let mut store = Self::new(snapshot);
        store.path = Some(path.to_path_buf());
        Ok(store)
    }

    /// Writes `snapshot` to `path` and opens it.
    pub fn create(path: impl AsRef<Path>, snapshot: Snapshot) -> Result<Self> {
        let path = path.as_ref();
        snapshot.write_atomic(path)?;
        Self::open(path)
    }

    /// Handle to the root folder.
    pub fn root_node(&self) -> MemoryNode {
        let state = self.state.read();
        let root = state.snapshot.root;
        let class = state
            .snapshot
            .records
            .get(&root)
            .map(|record| record.class.clone())
            .unwrap_or_default();
        MemoryNode {
            oid: root,
            class,
            path: ObjectPath::root(),
        }
    }

    /// Copy of the current contents, including uncommitted changes.
    pub fn snapshot(&self) -> Snapshot {
        self.state.read().snapshot.clone()
    }

    /// Number of successful commits made through this store.
    pub fn commit_count(&self) -> u64 {
        self.state.read().commits
    }

    /// Number of objects flagged as changed since the last commit.
    pub fn pending_changes(&self) -> usize {
        self.state.read().changed.len()
    }

    /// True when a record exists at `oid`.
    pub fn contains(&self, oid: Address) -> bool {
        self.state.read().snapshot.records.contains_key(&oid)
    }
}

fn load(snapshot: &Snapshot, oid: Address) -> Result<&Record> {
    snapshot
        .records
        .get(&oid)
        .ok_or_else(|| Failure::reference_missing(oid).into())
}

fn load_mut(snapshot: &mut Snapshot, oid: Address) -> Result<&mut Record> {
    snapshot
        .records
        .get_mut(&oid)
        .ok_or_else(|| Failure::reference_missing(oid).into())
}

fn container_members<'a>(
    snapshot: &'a Snapshot,
    objects: &ObjectRef,
) -> Result<(&'a [String], &'a BTreeMap<String, ObjectRef>)> {
    match &load(snapshot, objects.oid)?.body {
        RecordBody::Objects { order, members } => Ok((order.as_slice(), members)),
        _ => Err(StoreError::Unsupported(format!(
            "{} at {} is not an objects container",
            objects.class, objects.oid
        ))),
    }
}

fn child_of(snapshot: &Snapshot, node: &MemoryNode, name: &str) -> Result<MemoryNode> {
    let record = load(snapshot, node.oid)?;
    match &record.body {
        RecordBody::Folder { slots, .. } => slots
            .get(name)
            .map(|target| MemoryNode::from_ref(target, node.path.child(name)))
            .ok_or_else(|| Failure::attribute_missing(name).into()),
        RecordBody::Relationship { objects, .. } => {
            let (_, members) = container_members(snapshot, objects)?;
            members
                .get(name)
                .map(|target| MemoryNode::from_ref(target, node.path.child(name)))
                .ok_or_else(|| Failure::key_missing(name).into())
        }
        _ => Err(Failure::attribute_missing(name).into()),
    }
}

fn folder_mut<'a>(
    snapshot: &'a mut Snapshot,
    node: &MemoryNode,
) -> Result<(
    &'a mut Vec<String>,
    &'a mut BTreeMap<String, ObjectRef>,
    &'a mut BTreeSet<String>,
)> {
    let record = load_mut(snapshot, node.oid)?;
    match &mut record.body {
        RecordBody::Folder {
            listing,
            slots,
            relationships,
            ..
        } => Ok((listing, slots, relationships)),
        _ => Err(StoreError::Unsupported(format!(
            "{} at {} cannot hold children",
            node.class, node.path
        ))),
    }
}

impl ObjectStore for MemoryStore {
    type Node = MemoryNode;

    fn resolve_path(&self, path: &ObjectPath) -> Result<MemoryNode> {
        let state = self.state.read();
        let mut node = MemoryNode {
            oid: state.snapshot.root,
            class: String::new(),
            path: ObjectPath::root(),
        };
        for segment in path.segments() {
            node = child_of(&state.snapshot, &node, segment).map_err(|err| match err {
                StoreError::Broken(_) => StoreError::PathNotFound(path.clone()),
                other => other,
            })?;
        }
        if path.is_root() {
            node.class = load(&state.snapshot, node.oid)
                .map(|record| record.class.clone())
                .map_err(|_| StoreError::PathNotFound(path.clone()))?;
        }
        Ok(node)
    }

    fn physical_path(&self, node: &MemoryNode) -> ObjectPath {
        node.path.clone()
    }

    fn physical_address(&self, node: &MemoryNode) -> Address {
        node.oid
    }

    fn class_name(&self, node: &MemoryNode) -> String {
        node.class.clone()
    }

    fn child_names(&self, node: &MemoryNode) -> Result<Option<BTreeSet<String>>> {
        let state = self.state.read();
        let record = load(&state.snapshot, node.oid)?;
        match &record.body {
            RecordBody::Folder { listing, .. } => Ok(Some(listing.iter().cloned().collect())),
            RecordBody::Relationship {
                containment: true,
                objects,
                ..
            } => {
                let (order, _) = container_members(&state.snapshot, objects)?;
                Ok(Some(order.iter().cloned().collect()))
            }
            _ => Ok(None),
        }
    }

    fn relationship_names(&self, node: &MemoryNode) -> Result<Option<BTreeSet<String>>> {
        let state = self.state.read();
        match &load(&state.snapshot, node.oid)?.body {
            RecordBody::Folder { relationships, .. } => Ok(Some(relationships.clone())),
            _ => Ok(None),
        }
    }

    fn get_child(&self, node: &MemoryNode, name: &str) -> Result<MemoryNode> {
        let state = self.state.read();
        child_of(&state.snapshot, node, name)
    }

    fn invoke(&self, node: &MemoryNode) -> Result<()> {
        let state = self.state.read();
        let RecordBody::Relationship { objects, .. } = &load(&state.snapshot, node.oid)?.body
        else {
            return Ok(());
        };
        let (order, members) = container_members(&state.snapshot, objects)?;
        for key in order {
            if !members.contains_key(key) {
                return Err(Failure::key_missing(key.as_str()).into());
            }
        }
        Ok(())
    }

    fn identifier(&self, node: &MemoryNode) -> Result<String> {
        let state = self.state.read();
        let id = match &load(&state.snapshot, node.oid)?.body {
            RecordBody::Folder { id, .. }
            | RecordBody::Relationship { id, .. }
            | RecordBody::Leaf { id }
            | RecordBody::Catalog { id, .. } => id.clone(),
            RecordBody::Objects { .. } => String::new(),
        };
        Ok(id)
    }

    fn is_containment(&self, node: &MemoryNode) -> Result<bool> {
        let state = self.state.read();
        Ok(matches!(
            load(&state.snapshot, node.oid)?.body,
            RecordBody::Relationship {
                containment: true,
                ..
            }
        ))
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.state.write();
        let next = state.base_generation + 1;
        if let Some(path) = &self.path {
            if path.exists() {
                let found = Snapshot::read_generation(path)?;
                if found != state.base_generation {
                    warn!(
                        path = %path.display(),
                        expected = state.base_generation,
                        found,
                        "store.commit_conflict"
                    );
                    return Err(StoreError::CommitConflict {
                        expected: state.base_generation,
                        found,
                    });
                }
            }
            state.snapshot.generation = next;
            if let Err(err) = state.snapshot.write_atomic(path) {
                state.snapshot.generation = state.base_generation;
                return Err(err);
            }
        } else {
            state.snapshot.generation = next;
        }
        state.base_generation = next;
        let changed = state.changed.len();
        state.changed.clear();
        state.commits += 1;
        debug!(generation = next, changed, "store.commit");
        Ok(())
    }
}

impl RepairableStore for MemoryStore {
    fn objects_container_address(&self, rel: &MemoryNode) -> Result<Option<Address>> {
        let state = self.state.read();
        match &load(&state.snapshot, rel.oid)?.body {
            RecordBody::Relationship { objects, .. } => Ok(Some(objects.oid)),
            _ => Ok(None),
        }
    }

    fn reset_objects_container(&self, rel: &MemoryNode) -> Result<()> {
        let mut state = self.state.write();
        let class = match &load(&state.snapshot, rel.oid)?.body {
            RecordBody::Relationship { objects, .. } => objects.class.clone(),
            _ => {
                return Err(StoreError::Unsupported(format!(
                    "{} at {} is not a relationship",
                    rel.class, rel.path
                )))
            }
        };
        let fresh = state.snapshot.allocate();
        state.snapshot.records.insert(
            fresh,
            Record {
                class: class.clone(),
                body: RecordBody::Objects {
                    order: Vec::new(),
                    members: BTreeMap::new(),
                },
            },
        );
        if let RecordBody::Relationship { objects, .. } =
            &mut load_mut(&mut state.snapshot, rel.oid)?.body
        {
            *objects = ObjectRef::new(fresh, class);
        }
        state.changed.insert(rel.oid);
        state.changed.insert(fresh);
        Ok(())
    }

    fn mark_changed(&self, node: &MemoryNode) -> Result<()> {
        self.state.write().changed.insert(node.oid);
        Ok(())
    }

    fn delete_child(&self, parent: &MemoryNode, name: &str) -> Result<()> {
        let mut state = self.state.write();
        let (listing, slots, relationships) = folder_mut(&mut state.snapshot, parent)?;
        if slots.remove(name).is_none() {
            return Err(Failure::attribute_missing(name).into());
        }
        listing.retain(|entry| entry != name);
        relationships.remove(name);
        state.changed.insert(parent.oid);
        Ok(())
    }

    fn attach_fresh(&self, parent: &MemoryNode, name: &str, class: &str) -> Result<()> {
        let mut state = self.state.write();
        folder_mut(&mut state.snapshot, parent)?;
        let fresh = state.snapshot.allocate();
        state.snapshot.records.insert(
            fresh,
            Record {
                class: class.to_string(),
                body: RecordBody::Leaf {
                    id: name.to_string(),
                },
            },
        );
        let (listing, slots, _) = folder_mut(&mut state.snapshot, parent)?;
        slots.insert(name.to_string(), ObjectRef::new(fresh, class));
        if !listing.iter().any(|entry| entry == name) {
            listing.push(name.to_string());
        }
        state.changed.insert(parent.oid);
        state.changed.insert(fresh);
        Ok(())
    }

    fn rebuild_derived(&self, parent: &MemoryNode, name: &str) -> Result<()> {
        let mut state = self.state.write();
        let entries: BTreeSet<ObjectPath> = {
            let (_, slots, relationships) = folder_mut(&mut state.snapshot, parent)?;
            let candidates: Vec<(String, Address)> = slots
                .iter()
                .filter(|(slot, _)| slot.as_str() != name && !relationships.contains(*slot))
                .map(|(slot, target)| (slot.clone(), target.oid))
                .collect();
            candidates
                .into_iter()
                .filter(|(_, oid)| state.snapshot.records.contains_key(oid))
                .map(|(slot, _)| parent.path.child(&slot))
                .collect()
        };
        let fresh = state.snapshot.allocate();
        state.snapshot.records.insert(
            fresh,
            Record {
                class: DERIVED_INDEX_CLASS.to_string(),
                body: RecordBody::Catalog {
                    id: name.to_string(),
                    entries,
                },
            },
        );
        let (listing, slots, _) = folder_mut(&mut state.snapshot, parent)?;
        slots.insert(name.to_string(), ObjectRef::new(fresh, DERIVED_INDEX_CLASS));
        if !listing.iter().any(|entry| entry == name) {
            listing.push(name.to_string());
        }
        state.changed.insert(parent.oid);
        state.changed.insert(fresh);
        Ok(())
    }
}

impl CatalogStore for MemoryStore {
    fn catalog_entries(&self, catalog: &MemoryNode) -> Result<Vec<ObjectPath>> {
        let state = self.state.read();
        match &load(&state.snapshot, catalog.oid)?.body {
            RecordBody::Catalog { entries, .. } => Ok(entries.iter().cloned().collect()),
            _ => Err(StoreError::Unsupported(format!(
                "{} at {} is not a catalog",
                catalog.class, catalog.path
            ))),
        }
    }

    fn uncatalog(&self, catalog: &MemoryNode, entry: &ObjectPath) -> Result<()> {
        let mut state = self.state.write();
        match &mut load_mut(&mut state.snapshot, catalog.oid)?.body {
            RecordBody::Catalog { entries, .. } => {
                entries.remove(entry);
            }
            _ => {
                return Err(StoreError::Unsupported(format!(
                    "{} at {} is not a catalog",
                    catalog.class, catalog.path
                )))
            }
        }
        state.changed.insert(catalog.oid);
        Ok(())
    }

    fn reindex(&self, node: &MemoryNode) -> Result<u64> {
        let mut state = self.state.write();
        let (catalogs, entries) = {
            let snapshot = &state.snapshot;
            let catalogs: Vec<Address> = match &load(snapshot, node.oid)?.body {
                RecordBody::Folder { slots, .. } => slots
                    .values()
                    .filter(|target| {
                        matches!(
                            snapshot.records.get(&target.oid),
                            Some(Record {
                                body: RecordBody::Catalog { .. },
                                ..
                            })
                        )
                    })
                    .map(|target| target.oid)
                    .collect(),
                _ => {
                    return Err(StoreError::Unsupported(format!(
                        "{} at {} cannot hold catalogs",
                        node.class, node.path
                    )))
                }
            };
            let mut entries = BTreeSet::new();
            let mut seen = BTreeSet::new();
            collect_members(snapshot, node.oid, &node.path, &mut entries, &mut seen);
            (catalogs, entries)
        };
        for oid in &catalogs {
            if let Some(Record {
                body: RecordBody::Catalog {
                    entries: indexed, ..
                },
                ..
            }) = state.snapshot.records.get_mut(oid)
            {
                *indexed = entries.clone();
            }
            state.changed.insert(*oid);
        }
        debug!(
            path = %node.path,
            catalogs = catalogs.len(),
            entries = entries.len(),
            "store.reindex"
        );
        Ok(catalogs.len() as u64)
    }
}

/// Collects the paths of live containment-relationship members below `oid`.
fn collect_members(
    snapshot: &Snapshot,
    oid: Address,
    path: &ObjectPath,
    out: &mut BTreeSet<ObjectPath>,
    seen: &mut BTreeSet<Address>,
) {
    if !seen.insert(oid) {
        return;
    }
    let Some(record) = snapshot.records.get(&oid) else {
        return;
    };
    match &record.body {
        RecordBody::Folder { slots, .. } => {
            for (name, target) in slots {
                collect_members(snapshot, target.oid, &path.child(name), out, seen);
            }
        }
        RecordBody::Relationship {
            containment: true,
            objects,
            ..
        } => {
            let Some(Record {
                body: RecordBody::Objects { members, .. },
                ..
            }) = snapshot.records.get(&objects.oid)
            else {
                return;
            };
            for (key, target) in members {
                if !snapshot.records.contains_key(&target.oid) {
                    continue;
                }
                let member = path.child(key);
                out.insert(member.clone());
                collect_members(snapshot, target.oid, &member, out, seen);
            }
        }
        _ => {}
    }
}
