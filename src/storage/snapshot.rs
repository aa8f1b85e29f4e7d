use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{Address, ObjectPath, Result, StoreError};

/// Version tag written into every snapshot file.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A persistent reference: the target's address plus the class recorded
/// alongside it, so class checks never need to load the target.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Address of the referenced record.
    pub oid: Address,
    /// Class of the referenced object.
    pub class: String,
}

impl ObjectRef {
    /// Builds a reference.
    pub fn new(oid: Address, class: impl Into<String>) -> Self {
        Self {
            oid,
            class: class.into(),
        }
    }
}

/// One stored object.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Concrete class of the object.
    pub class: String,
    /// Kind-specific state.
    pub body: RecordBody,
}

/// Kind-specific state of a stored object.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordBody {
    /// An object holding named children and relationships.
    Folder {
        /// Identifier of the object inside its parent.
        id: String,
        /// Child names the folder advertises.
        #[serde(default)]
        listing: Vec<String>,
        /// Child slots actually present.
        #[serde(default)]
        slots: BTreeMap<String, ObjectRef>,
        /// Names among the slots that are relationships.
        #[serde(default)]
        relationships: BTreeSet<String>,
    },
    /// A named relationship backed by an ordered-objects container.
    Relationship {
        /// Relationship name.
        id: String,
        /// Whether members are owned, walkable graph nodes.
        containment: bool,
        /// Backing container.
        objects: ObjectRef,
    },
    /// Ordered-objects container behind a relationship.
    Objects {
        /// Member keys in order.
        #[serde(default)]
        order: Vec<String>,
        /// Members by key.
        #[serde(default)]
        members: BTreeMap<String, ObjectRef>,
    },
    /// An object with no children.
    Leaf {
        /// Identifier of the object inside its parent.
        id: String,
    },
    /// Derived index over object paths.
    Catalog {
        /// Identifier of the catalog inside its parent.
        id: String,
        /// Indexed paths.
        #[serde(default)]
        entries: BTreeSet<ObjectPath>,
    },
}

/// Full contents of a store as written to disk.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format version, see [`SNAPSHOT_FORMAT_VERSION`].
    pub format: u32,
    /// Incremented by every commit.
    pub generation: u64,
    /// Address of the root folder.
    pub root: Address,
    /// Next address to hand out.
    pub next_oid: u64,
    /// Records by address.
    pub records: BTreeMap<Address, Record>,
}

#[derive(Deserialize)]
struct SnapshotHeader {
    format: u32,
    generation: u64,
}

impl Snapshot {
    /// A store containing only an empty root folder at address zero.
    pub fn empty() -> Self {
        let mut records = BTreeMap::new();
        records.insert(
            Address(0),
            Record {
                class: "Application".to_string(),
                body: RecordBody::Folder {
                    id: String::new(),
                    listing: Vec::new(),
                    slots: BTreeMap::new(),
                    relationships: BTreeSet::new(),
                },
            },
        );
        Self {
            format: SNAPSHOT_FORMAT_VERSION,
            generation: 0,
            root: Address(0),
            next_oid: 1,
            records,
        }
    }

    /// Reads a snapshot file.
    pub fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let snapshot: Snapshot =
            serde_json::from_str(&contents).map_err(|err| StoreError::Snapshot {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        check_format(path, snapshot.format)?;
        Ok(snapshot)
    }

    /// Reads only the generation of a snapshot file.
    pub fn read_generation(path: &Path) -> Result<u64> {
        let contents = fs::read_to_string(path)?;
        let header: SnapshotHeader =
            serde_json::from_str(&contents).map_err(|err| StoreError::Snapshot {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        check_format(path, header.format)?;
        Ok(header.generation)
    }

    /// Writes the snapshot next to `path` and renames it into place.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|err| StoreError::Io(err.error))?;
        Ok(())
    }

    /// Hands out a fresh address.
    pub fn allocate(&mut self) -> Address {
        let oid = Address(self.next_oid);
        self.next_oid += 1;
        oid
    }
}

fn check_format(path: &Path, format: u32) -> Result<()> {
    if format != SNAPSHOT_FORMAT_VERSION {
        return Err(StoreError::Snapshot {
            path: path.to_path_buf(),
            reason: format!("unsupported format version {format}"),
        });
    }
    Ok(())
}
