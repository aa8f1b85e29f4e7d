use std::fmt;

use serde::Serialize;

use crate::audit::options::DEFAULT_ROOT_NAME;
use crate::types::{Failure, FailureKind, ObjectPath};

/// Which kind of edge a diagnostic was found on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// A named relationship of the parent.
    Relationship,
    /// A plain child attribute of the parent.
    Attribute,
    /// The node itself could not be classified.
    TraversalRoot,
}

impl EdgeKind {
    /// Label used in report lines.
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Relationship => "relationship",
            EdgeKind::Attribute => "attribute",
            EdgeKind::TraversalRoot => "node",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One broken edge found by a traversal.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DiagnosticRecord {
    /// Kind of breakage.
    pub failure_kind: FailureKind,
    /// Raw failure payload.
    pub failure_detail: String,
    /// Kind of edge that broke.
    pub edge_kind: EdgeKind,
    /// Name of the broken edge.
    pub child_name: String,
    /// Path of the node owning the broken edge.
    pub parent_path: ObjectPath,
}

impl DiagnosticRecord {
    pub(crate) fn new(
        failure: Failure,
        edge_kind: EdgeKind,
        child_name: impl Into<String>,
        parent_path: ObjectPath,
    ) -> Self {
        Self {
            failure_kind: failure.kind,
            failure_detail: failure.detail,
            edge_kind,
            child_name: child_name.into(),
            parent_path,
        }
    }

    /// `<kind>: <detail> on <edge> '<child>' of <parent>`, with the parent
    /// path rendered under `root_name`.
    pub fn report_line(&self, root_name: &str) -> String {
        format!(
            "{}: {} on {} '{}' of {}",
            self.failure_kind,
            self.failure_detail,
            self.edge_kind,
            self.child_name,
            self.parent_path.dotted(root_name)
        )
    }
}

impl fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.report_line(DEFAULT_ROOT_NAME))
    }
}
