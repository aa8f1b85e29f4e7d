#![forbid(unsafe_code)]

//! Reference auditing and repair.
//!
//! A scan walks the object graph breadth-first from a starting path, reports
//! every broken edge it meets and optionally hands each report to a chain of
//! repair strategies. A separate sweep removes catalog entries whose objects
//! are gone.

mod catalog;
mod edges;
mod error;
mod options;
mod record;
mod repair;
mod report;
mod scan;
mod walker;

/// Catalog sweep.
///
/// Checks every entry of a catalog and optionally drops the dangling ones
/// before rebuilding the catalogs of the reindex targets.
pub use catalog::{
    default_catalogs, default_reindex_targets, sweep_catalogs, CatalogSweep, Reindex, SweepReport,
    DEFAULT_CATALOGS, DEFAULT_REINDEX_TARGETS,
};

/// Splits a node's children into attributes and relationships.
pub use edges::{classify_edges, EdgeSets};

/// Error types for audit runs.
pub use error::{AuditError, Result};

/// Options for scans and sweeps.
pub use options::{ScanOptions, StrategyKind, SweepOptions, DEFAULT_ROOT_NAME};

/// One broken edge and where it was found.
pub use record::{DiagnosticRecord, EdgeKind};

/// Repair strategies and the dispatcher that chains them.
///
/// Every strategy compares the address named by the failure against the
/// address stored on the broken slot before it touches anything.
pub use repair::{
    strategy_for, NamedSingletonRepair, RelationshipRepair, RepairAction, RepairDispatcher,
    RepairOutcome, RepairStrategy, COMPONENT_SEARCH_ID, SEARCH_MANAGER_CLASS, SEARCH_MANAGER_ID,
};

/// Report sinks.
pub use report::{CollectingSink, JsonLinesSink, ReportEvent, ReportSink, TextSink};

/// Scan entry points.
pub use scan::{diagnose, scan, ScanReport};

/// Lazy breadth-first traversal.
pub use walker::{GraphWalker, Traversal};
