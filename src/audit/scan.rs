use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::audit::error::{AuditError, Result};
use crate::audit::options::ScanOptions;
use crate::audit::repair::RepairDispatcher;
use crate::audit::report::ReportSink;
use crate::audit::walker::{GraphWalker, Traversal};
use crate::storage::{ObjectStore, RepairableStore};
use crate::types::{FailureKind, ObjectPath};

/// Summary of a scan.
#[derive(Clone, Debug, Serialize)]
pub struct ScanReport {
    /// Starting path, rendered under the configured root name.
    pub start: String,
    /// Whether repairs were enabled.
    pub repair: bool,
    /// Number of nodes expanded.
    pub nodes_visited: u64,
    /// Number of diagnostics reported.
    pub records: u64,
    /// Number of repairs that mutated the store.
    pub repairs_applied: u64,
    /// Diagnostics per failure kind.
    pub by_kind: BTreeMap<FailureKind, u64>,
    /// True when no breakage was found.
    pub success: bool,
}

/// Starts a traversal at `start` without repairing anything.
///
/// # Errors
///
/// Returns [`AuditError::InvalidPath`] when `start` does not resolve.
pub fn diagnose<'s, S: ObjectStore>(store: &'s S, start: &ObjectPath) -> Result<Traversal<'s, S>> {
    let root = store.resolve_path(start).map_err(AuditError::from_resolve)?;
    Ok(GraphWalker::new(store).traverse(root))
}

/// Walks the graph below `start`, reporting every broken edge to `sink`.
///
/// With [`ScanOptions::repair`] set, each diagnostic is first offered to the
/// repair chain; a repair is reported before the diagnostic it belongs to.
/// Repairs commit as they are applied, so the rest of the walk sees the
/// repaired graph.
///
/// # Errors
///
/// Fails on an unresolvable start path, on any store error that is not
/// diagnosable breakage, on a failed repair commit, or when the sink fails.
pub fn scan<S, K>(
    store: &S,
    start: &ObjectPath,
    opts: &ScanOptions,
    sink: &mut K,
) -> Result<ScanReport>
where
    S: RepairableStore,
    K: ReportSink + ?Sized,
{
    let mut traversal = diagnose(store, start)?;
    let dispatcher = opts
        .repair
        .then(|| RepairDispatcher::with_kinds(store, &opts.strategies));
    info!(
        start = %start,
        repair = opts.repair,
        "scan.start"
    );

    let mut records = 0u64;
    let mut repairs_applied = 0u64;
    let mut by_kind = BTreeMap::new();
    for item in traversal.by_ref() {
        let record = item?;
        records += 1;
        *by_kind.entry(record.failure_kind).or_insert(0u64) += 1;
        if let Some(dispatcher) = &dispatcher {
            if let Some(outcome) = dispatcher.dispatch_outcome(&record)? {
                if outcome.applied {
                    repairs_applied += 1;
                }
                sink.repaired(&record, &outcome)?;
            }
        }
        sink.diagnostic(&record)?;
    }

    let report = ScanReport {
        start: start.dotted(&opts.root_name),
        repair: opts.repair,
        nodes_visited: traversal.nodes_visited(),
        records,
        repairs_applied,
        by_kind,
        success: records == 0,
    };
    info!(
        nodes = report.nodes_visited,
        records = report.records,
        repairs = report.repairs_applied,
        "scan.finish"
    );
    Ok(report)
}
