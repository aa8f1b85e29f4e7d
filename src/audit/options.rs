use serde::{Deserialize, Serialize};

use crate::audit::catalog::default_reindex_targets;
use crate::types::ObjectPath;

/// Name the store root is given in reports and operator-supplied paths.
pub const DEFAULT_ROOT_NAME: &str = "app";

/// Repair strategies, listed in the order the dispatcher tries them.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Reset a relationship whose backing container was lost.
    Relationship,
    /// Recreate a lost `SearchManager` singleton.
    SearchManager,
    /// Rebuild a lost `componentSearch` index.
    ComponentSearch,
}

impl StrategyKind {
    /// Every strategy in priority order.
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::Relationship,
        StrategyKind::SearchManager,
        StrategyKind::ComponentSearch,
    ];

    /// Stable name used in reports and config files.
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Relationship => "relationship",
            StrategyKind::SearchManager => "search-manager",
            StrategyKind::ComponentSearch => "component-search",
        }
    }
}

/// Options controlling a scan.
#[derive(Clone, Debug)]
pub struct ScanOptions {
    /// Whether detected breakage is offered to the repair strategies.
    pub repair: bool,
    /// Strategies the dispatcher may use. Priority order is fixed regardless
    /// of the order given here.
    pub strategies: Vec<StrategyKind>,
    /// Name the store root is rendered as in report lines.
    pub root_name: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            repair: false,
            strategies: StrategyKind::ALL.to_vec(),
            root_name: DEFAULT_ROOT_NAME.to_string(),
        }
    }
}

/// Options controlling a catalog sweep.
#[derive(Clone, Debug)]
pub struct SweepOptions {
    /// Whether dangling entries are removed and the reindex targets rebuilt.
    pub fix: bool,
    /// Structures whose catalogs are rebuilt after a fixing sweep.
    pub reindex: Vec<ObjectPath>,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            fix: false,
            reindex: default_reindex_targets(),
        }
    }
}
