use std::collections::{BTreeMap, BTreeSet};

use super::memory::{MemoryStore, DERIVED_INDEX_CLASS};
use super::snapshot::{ObjectRef, Record, RecordBody, Snapshot};
use crate::types::{Address, ObjectPath, Result, StoreError};

/// Class of the ordered-objects container behind every relationship.
pub const OBJECTS_CLASS: &str = "OrderedObjects";
/// Class of containment relationships.
pub const CONTAINMENT_CLASS: &str = "ToManyContRelationship";
/// Class of plain relationships.
pub const RELATIONSHIP_CLASS: &str = "ToManyRelationship";

/// Assembles store contents record by record.
///
/// Besides regular objects it can introduce each breakage pattern the audit
/// engine recognizes: dropped records, dangling listings and missing
/// container keys.
#[derive(Clone, Debug)]
pub struct StoreBuilder {
    snapshot: Snapshot,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBuilder {
    /// A store holding only an empty root folder.
    pub fn new() -> Self {
        Self {
            snapshot: Snapshot::empty(),
        }
    }

    /// Address of the root folder.
    pub fn root(&self) -> Address {
        self.snapshot.root
    }

    /// Adds a child folder under `parent`.
    pub fn folder(&mut self, parent: Address, name: &str, class: &str) -> Result<Address> {
        let oid = self.insert(
            class,
            RecordBody::Folder {
                id: name.to_string(),
                listing: Vec::new(),
                slots: BTreeMap::new(),
                relationships: BTreeSet::new(),
            },
        );
        self.attach(parent, name, ObjectRef::new(oid, class), false)?;
        Ok(oid)
    }

    /// Adds a childless object under `parent`.
    pub fn leaf(&mut self, parent: Address, name: &str, class: &str) -> Result<Address> {
        let oid = self.insert(
            class,
            RecordBody::Leaf {
                id: name.to_string(),
            },
        );
        self.attach(parent, name, ObjectRef::new(oid, class), false)?;
        Ok(oid)
    }

    /// Adds a relationship with an empty container under `parent`.
    pub fn relationship(
        &mut self,
        parent: Address,
        name: &str,
        containment: bool,
    ) -> Result<Address> {
        let container = self.insert(
            OBJECTS_CLASS,
            RecordBody::Objects {
                order: Vec::new(),
                members: BTreeMap::new(),
            },
        );
        let class = if containment {
            CONTAINMENT_CLASS
        } else {
            RELATIONSHIP_CLASS
        };
        let oid = self.insert(
            class,
            RecordBody::Relationship {
                id: name.to_string(),
                containment,
                objects: ObjectRef::new(container, OBJECTS_CLASS),
            },
        );
        self.attach(parent, name, ObjectRef::new(oid, class), true)?;
        Ok(oid)
    }

    /// Adds a folder as a member of relationship `rel`.
    pub fn member_folder(&mut self, rel: Address, key: &str, class: &str) -> Result<Address> {
        let oid = self.insert(
            class,
            RecordBody::Folder {
                id: key.to_string(),
                listing: Vec::new(),
                slots: BTreeMap::new(),
                relationships: BTreeSet::new(),
            },
        );
        self.add_member(rel, key, ObjectRef::new(oid, class))?;
        Ok(oid)
    }

    /// Links an existing object into relationship `rel` without owning it.
    pub fn link_member(&mut self, rel: Address, key: &str, target: Address) -> Result<()> {
        let class = self.record(target)?.class.clone();
        self.add_member(rel, key, ObjectRef::new(target, class))
    }

    /// Adds a catalog indexing `entries` under `parent`.
    pub fn catalog<I>(&mut self, parent: Address, name: &str, entries: I) -> Result<Address>
    where
        I: IntoIterator<Item = ObjectPath>,
    {
        let oid = self.insert(
            "Catalog",
            RecordBody::Catalog {
                id: name.to_string(),
                entries: entries.into_iter().collect(),
            },
        );
        self.attach(parent, name, ObjectRef::new(oid, "Catalog"), false)?;
        Ok(oid)
    }

    /// Address of the container behind relationship `rel`.
    pub fn container_of(&self, rel: Address) -> Option<Address> {
        match &self.snapshot.records.get(&rel)?.body {
            RecordBody::Relationship { objects, .. } => Some(objects.oid),
            _ => None,
        }
    }

    /// Removes the record at `oid`, leaving every reference to it dangling.
    pub fn drop_record(&mut self, oid: Address) -> &mut Self {
        self.snapshot.records.remove(&oid);
        self
    }

    /// Lists `name` on `parent` without a slot behind it.
    pub fn list_dangling(&mut self, parent: Address, name: &str) -> Result<()> {
        match &mut self.record_mut(parent)?.body {
            RecordBody::Folder { listing, .. } => {
                listing.push(name.to_string());
                Ok(())
            }
            _ => Err(not_a(parent, "folder")),
        }
    }

    /// Removes `key` from the members of `rel` but keeps it in the order.
    pub fn drop_member_key(&mut self, rel: Address, key: &str) -> Result<()> {
        let container = self.container_of(rel).ok_or_else(|| not_a(rel, "relationship"))?;
        match &mut self.record_mut(container)?.body {
            RecordBody::Objects { members, .. } => {
                members.remove(key);
                Ok(())
            }
            _ => Err(not_a(container, "objects container")),
        }
    }

    /// Moves the record at `from` to address `to`, rewriting every reference.
    pub fn relocate(&mut self, from: Address, to: Address) -> Result<()> {
        if self.snapshot.records.contains_key(&to) {
            return Err(StoreError::Unsupported(format!("address {to} is taken")));
        }
        let record = self
            .snapshot
            .records
            .remove(&from)
            .ok_or_else(|| not_a(from, "record"))?;
        self.snapshot.records.insert(to, record);
        for record in self.snapshot.records.values_mut() {
            for target in refs_mut(&mut record.body) {
                if target.oid == from {
                    target.oid = to;
                }
            }
        }
        if self.snapshot.root == from {
            self.snapshot.root = to;
        }
        self.snapshot.next_oid = self.snapshot.next_oid.max(to.0 + 1);
        Ok(())
    }

    /// A small device inventory.
    ///
    /// With `corrupt`, the inventory also carries one instance of every
    /// breakage pattern: a relationship whose container is gone, lost
    /// `SearchManager` and `componentSearch` singletons, a lost device that a
    /// catalog still lists, and a listed child with no slot.
    pub fn demo(corrupt: bool) -> Result<Self> {
        let mut builder = Self::new();
        let root = builder.root();
        let zport = builder.folder(root, "zport", "Portal")?;
        let dmd = builder.folder(zport, "dmd", "DataRoot")?;
        let search_manager = builder.leaf(dmd, "SearchManager", "SearchManager")?;
        let devices = builder.folder(dmd, "Devices", "DeviceClass")?;
        builder.folder(dmd, "Manufacturers", "ManufacturerRoot")?;

        let members = builder.relationship(devices, "devices", true)?;
        let edge1 = builder.member_folder(members, "edge1", "Device")?;
        let edge2 = builder.member_folder(members, "edge2", "Device")?;
        builder.folder(edge1, "os", "OperatingSystem")?;
        builder.folder(edge2, "os", "OperatingSystem")?;
        let dependents = builder.relationship(devices, "dependents", false)?;
        builder.link_member(dependents, "edge1", edge1)?;
        let component_search = builder.leaf(devices, "componentSearch", DERIVED_INDEX_CLASS)?;

        let device_paths = ["edge1", "edge2"].map(|id| {
            ObjectPath::from_segments(["zport", "dmd", "Devices", "devices", id])
        });
        builder.catalog(dmd, "global_catalog", device_paths.clone())?;
        builder.catalog(devices, "deviceSearch", device_paths)?;

        if corrupt {
            if let Some(container) = builder.container_of(dependents) {
                builder.drop_record(container);
            }
            builder
                .drop_record(search_manager)
                .drop_record(component_search)
                .drop_record(edge2);
            builder.list_dangling(devices, "bogus")?;
        }
        Ok(builder)
    }

    /// Finished contents.
    pub fn into_snapshot(self) -> Snapshot {
        self.snapshot
    }

    /// In-memory store over the finished contents.
    pub fn build(self) -> MemoryStore {
        MemoryStore::new(self.snapshot)
    }

    fn insert(&mut self, class: &str, body: RecordBody) -> Address {
        let oid = self.snapshot.allocate();
        self.snapshot.records.insert(
            oid,
            Record {
                class: class.to_string(),
                body,
            },
        );
        oid
    }

    fn attach(
        &mut self,
        parent: Address,
        name: &str,
        target: ObjectRef,
        relationship: bool,
    ) -> Result<()> {
        match &mut self.record_mut(parent)?.body {
            RecordBody::Folder {
                listing,
                slots,
                relationships,
                ..
            } => {
                if !listing.iter().any(|entry| entry == name) {
                    listing.push(name.to_string());
                }
                slots.insert(name.to_string(), target);
                if relationship {
                    relationships.insert(name.to_string());
                }
                Ok(())
            }
            _ => Err(not_a(parent, "folder")),
        }
    }

    fn add_member(&mut self, rel: Address, key: &str, target: ObjectRef) -> Result<()> {
        let container = self.container_of(rel).ok_or_else(|| not_a(rel, "relationship"))?;
        match &mut self.record_mut(container)?.body {
            RecordBody::Objects { order, members } => {
                if !order.iter().any(|entry| entry == key) {
                    order.push(key.to_string());
                }
                members.insert(key.to_string(), target);
                Ok(())
            }
            _ => Err(not_a(container, "objects container")),
        }
    }

    fn record(&self, oid: Address) -> Result<&Record> {
        self.snapshot
            .records
            .get(&oid)
            .ok_or_else(|| not_a(oid, "record"))
    }

    fn record_mut(&mut self, oid: Address) -> Result<&mut Record> {
        self.snapshot
            .records
            .get_mut(&oid)
            .ok_or_else(|| not_a(oid, "record"))
    }
}

fn refs_mut(body: &mut RecordBody) -> Vec<&mut ObjectRef> {
    match body {
        RecordBody::Folder { slots, .. } => slots.values_mut().collect(),
        RecordBody::Relationship { objects, .. } => vec![objects],
        RecordBody::Objects { members, .. } => members.values_mut().collect(),
        RecordBody::Leaf { .. } | RecordBody::Catalog { .. } => Vec::new(),
    }
}

fn not_a(oid: Address, what: &str) -> StoreError {
    StoreError::Unsupported(format!("{oid} is not a {what}"))
}
