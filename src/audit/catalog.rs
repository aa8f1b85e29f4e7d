use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audit::error::Result;
use crate::audit::options::SweepOptions;
use crate::audit::report::ReportSink;
use crate::storage::CatalogStore;
use crate::types::{ObjectPath, StoreError};

/// Catalogs swept when none are named, relative to the store root.
pub const DEFAULT_CATALOGS: [&str; 6] = [
    "zport/dmd/global_catalog",
    "zport/dmd/Devices/deviceSearch",
    "zport/dmd/ZenLinkManager/layer3_catalog",
    "zport/dmd/maintenanceWindowSearch",
    "zport/dmd/zenPackPersistence",
    "zport/dmd/Manufacturers/productSearch",
];

/// Structures reindexed after a fixing sweep, relative to the store root.
pub const DEFAULT_REINDEX_TARGETS: [&str; 4] = [
    "zport/dmd/Devices",
    "zport/dmd/Events",
    "zport/dmd/Manufacturers",
    "zport/dmd/Networks",
];

/// Result of sweeping one catalog.
#[derive(Clone, Debug, Serialize)]
pub struct CatalogSweep {
    /// Catalog location.
    pub path: ObjectPath,
    /// False when the catalog itself does not resolve.
    pub found: bool,
    /// Number of entries checked.
    pub entries: u64,
    /// Entries that no longer resolve.
    pub dangling: Vec<ObjectPath>,
    /// Number of dangling entries removed.
    pub removed: u64,
}

/// Result of reindexing one structure.
#[derive(Clone, Debug, Serialize)]
pub struct Reindex {
    /// Structure location.
    pub path: ObjectPath,
    /// False when the structure does not resolve.
    pub found: bool,
    /// Number of catalogs rebuilt.
    pub catalogs: u64,
}

/// Result of a catalog sweep.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SweepReport {
    /// One entry per requested catalog, in request order.
    pub catalogs: Vec<CatalogSweep>,
    /// One entry per reindex target; empty unless fixing.
    pub reindexed: Vec<Reindex>,
}

impl SweepReport {
    /// Total dangling entries across all catalogs.
    pub fn dangling(&self) -> usize {
        self.catalogs.iter().map(|c| c.dangling.len()).sum()
    }

    /// Total entries removed across all catalogs.
    pub fn removed(&self) -> u64 {
        self.catalogs.iter().map(|c| c.removed).sum()
    }
}

/// Finds catalog entries whose object no longer resolves and, with
/// [`SweepOptions::fix`], removes them and then rebuilds the catalogs of
/// every [`SweepOptions::reindex`] target.
///
/// Each catalog that lost entries is committed separately, and so is each
/// reindexed target. Catalogs and targets that do not resolve are reported
/// and skipped.
///
/// # Errors
///
/// Fails on any store error other than breakage or a missing path, and when
/// the sink fails.
pub fn sweep_catalogs<S, K>(
    store: &S,
    catalogs: &[ObjectPath],
    opts: &SweepOptions,
    sink: &mut K,
) -> Result<SweepReport>
where
    S: CatalogStore,
    K: ReportSink + ?Sized,
{
    let mut report = SweepReport::default();
    for path in catalogs {
        let catalog = match store.resolve_path(path) {
            Ok(node) => node,
            Err(StoreError::PathNotFound(_)) | Err(StoreError::Broken(_)) => {
                warn!(catalog = %path, "sweep.catalog_missing");
                sink.catalog(path, false)?;
                report.catalogs.push(CatalogSweep {
                    path: path.clone(),
                    found: false,
                    entries: 0,
                    dangling: Vec::new(),
                    removed: 0,
                });
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        sink.catalog(path, true)?;

        let entries = store.catalog_entries(&catalog)?;
        let mut dangling = Vec::new();
        for entry in &entries {
            if entry_resolves(store, entry)? {
                continue;
            }
            debug!(catalog = %path, entry = %entry, fix = opts.fix, "sweep.dangling");
            if opts.fix {
                store.uncatalog(&catalog, entry)?;
            }
            sink.dangling_entry(path, entry, opts.fix)?;
            dangling.push(entry.clone());
        }

        let removed = if opts.fix { dangling.len() as u64 } else { 0 };
        if removed > 0 {
            store.commit()?;
            info!(catalog = %path, removed, "sweep.catalog_cleaned");
        }
        report.catalogs.push(CatalogSweep {
            path: path.clone(),
            found: true,
            entries: entries.len() as u64,
            dangling,
            removed,
        });
    }

    if opts.fix {
        for target in &opts.reindex {
            report.reindexed.push(reindex_target(store, target, sink)?);
        }
    }
    Ok(report)
}

fn reindex_target<S, K>(store: &S, target: &ObjectPath, sink: &mut K) -> Result<Reindex>
where
    S: CatalogStore,
    K: ReportSink + ?Sized,
{
    let node = match store.resolve_path(target) {
        Ok(node) => node,
        Err(StoreError::PathNotFound(_)) | Err(StoreError::Broken(_)) => {
            warn!(target = %target, "sweep.reindex_missing");
            sink.reindexed(target, false)?;
            return Ok(Reindex {
                path: target.clone(),
                found: false,
                catalogs: 0,
            });
        }
        Err(err) => return Err(err.into()),
    };
    sink.reindexed(target, true)?;
    let catalogs = store.reindex(&node)?;
    store.commit()?;
    info!(target = %target, catalogs, "sweep.reindexed");
    Ok(Reindex {
        path: target.clone(),
        found: true,
        catalogs,
    })
}

fn entry_resolves<S: CatalogStore>(store: &S, entry: &ObjectPath) -> Result<bool> {
    let resolved = store
        .resolve_path(entry)
        .and_then(|node| store.identifier(&node));
    match resolved {
        Ok(_) => Ok(true),
        Err(StoreError::PathNotFound(_)) | Err(StoreError::Broken(_)) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Parses [`DEFAULT_CATALOGS`].
pub fn default_catalogs() -> Vec<ObjectPath> {
    DEFAULT_CATALOGS
        .iter()
        .map(|raw| ObjectPath::parse(raw, ""))
        .collect()
}

/// Parses [`DEFAULT_REINDEX_TARGETS`].
pub fn default_reindex_targets() -> Vec<ObjectPath> {
    DEFAULT_REINDEX_TARGETS
        .iter()
        .map(|raw| ObjectPath::parse(raw, ""))
        .collect()
}
