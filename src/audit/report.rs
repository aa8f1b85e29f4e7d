use std::io::{self, Write};

use serde_json::json;

use crate::audit::options::DEFAULT_ROOT_NAME;
use crate::audit::record::DiagnosticRecord;
use crate::audit::repair::RepairOutcome;
use crate::types::ObjectPath;

/// Receives audit results as they are produced.
///
/// A repair is always delivered before the diagnostic it repaired.
pub trait ReportSink {
    /// Called once for every diagnostic.
    fn diagnostic(&mut self, record: &DiagnosticRecord) -> io::Result<()>;

    /// Called when a repair strategy ran for `record`.
    fn repaired(&mut self, _record: &DiagnosticRecord, _outcome: &RepairOutcome) -> io::Result<()> {
        Ok(())
    }

    /// Called before the entries of a catalog are checked. `found` is false
    /// when the catalog itself does not resolve.
    fn catalog(&mut self, _catalog: &ObjectPath, _found: bool) -> io::Result<()> {
        Ok(())
    }

    /// Called for every catalog entry that no longer resolves.
    fn dangling_entry(
        &mut self,
        _catalog: &ObjectPath,
        _entry: &ObjectPath,
        _removed: bool,
    ) -> io::Result<()> {
        Ok(())
    }

    /// Called before a structure's catalogs are rebuilt. `found` is false
    /// when the structure does not resolve.
    fn reindexed(&mut self, _target: &ObjectPath, _found: bool) -> io::Result<()> {
        Ok(())
    }
}

impl<T: ReportSink + ?Sized> ReportSink for &mut T {
    fn diagnostic(&mut self, record: &DiagnosticRecord) -> io::Result<()> {
        (**self).diagnostic(record)
    }

    fn repaired(&mut self, record: &DiagnosticRecord, outcome: &RepairOutcome) -> io::Result<()> {
        (**self).repaired(record, outcome)
    }

    fn catalog(&mut self, catalog: &ObjectPath, found: bool) -> io::Result<()> {
        (**self).catalog(catalog, found)
    }

    fn dangling_entry(
        &mut self,
        catalog: &ObjectPath,
        entry: &ObjectPath,
        removed: bool,
    ) -> io::Result<()> {
        (**self).dangling_entry(catalog, entry, removed)
    }

    fn reindexed(&mut self, target: &ObjectPath, found: bool) -> io::Result<()> {
        (**self).reindexed(target, found)
    }
}

/// Plain text lines, one per event.
pub struct TextSink<W: Write> {
    out: W,
    root_name: String,
}

impl<W: Write> TextSink<W> {
    /// Writes to `out`, rendering paths under the default root name.
    pub fn new(out: W) -> Self {
        Self::with_root_name(out, DEFAULT_ROOT_NAME)
    }

    /// Writes to `out`, rendering paths under `root_name`.
    pub fn with_root_name(out: W, root_name: impl Into<String>) -> Self {
        Self {
            out,
            root_name: root_name.into(),
        }
    }

    /// Mutable access to the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.out
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for TextSink<W> {
    fn diagnostic(&mut self, record: &DiagnosticRecord) -> io::Result<()> {
        writeln!(self.out, "{}", record.report_line(&self.root_name))
    }

    fn repaired(&mut self, record: &DiagnosticRecord, outcome: &RepairOutcome) -> io::Result<()> {
        if outcome.applied {
            writeln!(
                self.out,
                "  ==-- fixing {} at {} ({})",
                record.failure_kind,
                outcome.address,
                outcome.strategy.as_str()
            )
        } else {
            writeln!(
                self.out,
                "  ==-- cannot fix {}; slot changed since diagnosis",
                outcome.address
            )
        }
    }

    fn catalog(&mut self, catalog: &ObjectPath, found: bool) -> io::Result<()> {
        let name = catalog.dotted(&self.root_name);
        if found {
            writeln!(self.out, "  * {name}")
        } else {
            writeln!(self.out, "{name} not found, skipping")
        }
    }

    fn dangling_entry(
        &mut self,
        _catalog: &ObjectPath,
        entry: &ObjectPath,
        removed: bool,
    ) -> io::Result<()> {
        if removed {
            writeln!(self.out, "    - removing {entry}")
        } else {
            writeln!(self.out, "    - should be removed: {entry}")
        }
    }

    fn reindexed(&mut self, target: &ObjectPath, found: bool) -> io::Result<()> {
        let name = target.dotted(&self.root_name);
        if found {
            writeln!(self.out, "Reindexing {name}")
        } else {
            writeln!(self.out, "{name} not found, skipping")
        }
    }
}

/// One JSON object per line, tagged by `type`.
pub struct JsonLinesSink<W: Write> {
    out: W,
    root_name: String,
}

impl<W: Write> JsonLinesSink<W> {
    /// Writes to `out`, rendering report lines under `root_name`.
    pub fn new(out: W, root_name: impl Into<String>) -> Self {
        Self {
            out,
            root_name: root_name.into(),
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, value: serde_json::Value) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, &value)?;
        self.out.write_all(b"\n")
    }
}

impl<W: Write> ReportSink for JsonLinesSink<W> {
    fn diagnostic(&mut self, record: &DiagnosticRecord) -> io::Result<()> {
        let line = record.report_line(&self.root_name);
        self.line(json!({
            "type": "diagnostic",
            "failure_kind": record.failure_kind,
            "failure_detail": record.failure_detail,
            "edge_kind": record.edge_kind,
            "child_name": record.child_name,
            "parent_path": record.parent_path,
            "line": line,
        }))
    }

    fn repaired(&mut self, record: &DiagnosticRecord, outcome: &RepairOutcome) -> io::Result<()> {
        self.line(json!({
            "type": "repair",
            "child_name": record.child_name,
            "parent_path": record.parent_path,
            "strategy": outcome.strategy,
            "address": outcome.address.to_string(),
            "applied": outcome.applied,
        }))
    }

    fn catalog(&mut self, catalog: &ObjectPath, found: bool) -> io::Result<()> {
        self.line(json!({
            "type": "catalog",
            "catalog": catalog,
            "found": found,
        }))
    }

    fn dangling_entry(
        &mut self,
        catalog: &ObjectPath,
        entry: &ObjectPath,
        removed: bool,
    ) -> io::Result<()> {
        self.line(json!({
            "type": "dangling_entry",
            "catalog": catalog,
            "entry": entry,
            "removed": removed,
        }))
    }

    fn reindexed(&mut self, target: &ObjectPath, found: bool) -> io::Result<()> {
        self.line(json!({
            "type": "reindex",
            "target": target,
            "found": found,
        }))
    }
}

/// Everything a run reported, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum ReportEvent {
    /// A diagnostic.
    Diagnostic(DiagnosticRecord),
    /// A repair of the given diagnostic.
    Repaired(DiagnosticRecord, RepairOutcome),
    /// Start of a catalog.
    Catalog(ObjectPath, bool),
    /// A dangling catalog entry.
    DanglingEntry(ObjectPath, ObjectPath, bool),
    /// Start of a reindex.
    Reindexed(ObjectPath, bool),
}

/// Keeps every event in memory.
#[derive(Clone, Debug, Default)]
pub struct CollectingSink {
    /// Events in delivery order.
    pub events: Vec<ReportEvent>,
}

impl CollectingSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Diagnostics only, in delivery order.
    pub fn diagnostics(&self) -> Vec<&DiagnosticRecord> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ReportEvent::Diagnostic(record) => Some(record),
                _ => None,
            })
            .collect()
    }
}

impl ReportSink for CollectingSink {
    fn diagnostic(&mut self, record: &DiagnosticRecord) -> io::Result<()> {
        self.events.push(ReportEvent::Diagnostic(record.clone()));
        Ok(())
    }

    fn repaired(&mut self, record: &DiagnosticRecord, outcome: &RepairOutcome) -> io::Result<()> {
        self.events
            .push(ReportEvent::Repaired(record.clone(), outcome.clone()));
        Ok(())
    }

    fn catalog(&mut self, catalog: &ObjectPath, found: bool) -> io::Result<()> {
        self.events.push(ReportEvent::Catalog(catalog.clone(), found));
        Ok(())
    }

    fn dangling_entry(
        &mut self,
        catalog: &ObjectPath,
        entry: &ObjectPath,
        removed: bool,
    ) -> io::Result<()> {
        self.events.push(ReportEvent::DanglingEntry(
            catalog.clone(),
            entry.clone(),
            removed,
        ));
        Ok(())
    }

    fn reindexed(&mut self, target: &ObjectPath, found: bool) -> io::Result<()> {
        self.events.push(ReportEvent::Reindexed(target.clone(), found));
        Ok(())
    }
}
