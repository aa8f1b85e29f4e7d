use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audit::options::StrategyKind;
use crate::audit::record::{DiagnosticRecord, EdgeKind};
use crate::primitives::address::{addresses_match, decode_failure_address};
use crate::storage::RepairableStore;
use crate::types::{Address, FailureKind, Result};

/// Name of the search-manager singleton.
pub const SEARCH_MANAGER_ID: &str = "SearchManager";
/// Class of the search-manager singleton.
pub const SEARCH_MANAGER_CLASS: &str = "SearchManager";
/// Name of the derived component-search index.
pub const COMPONENT_SEARCH_ID: &str = "componentSearch";

/// What an applied repair did.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RepairOutcome {
    /// Strategy that ran.
    pub strategy: StrategyKind,
    /// Address named by the failure.
    pub address: Address,
    /// False when the slot changed between diagnosis and repair and nothing
    /// was mutated.
    pub applied: bool,
}

type ApplyFn<'a> = Box<dyn FnOnce() -> Result<bool> + 'a>;

/// Deferred repair bound to one diagnostic and the node that owns it.
pub struct RepairAction<'a> {
    strategy: StrategyKind,
    address: Address,
    apply: ApplyFn<'a>,
}

impl<'a> RepairAction<'a> {
    /// Wraps `apply`, which returns whether it mutated the store.
    pub fn new(
        strategy: StrategyKind,
        address: Address,
        apply: impl FnOnce() -> Result<bool> + 'a,
    ) -> Self {
        Self {
            strategy,
            address,
            apply: Box::new(apply),
        }
    }

    /// Strategy that produced this action.
    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    /// Address the action will repair.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Performs the repair and commits it.
    pub fn apply(self) -> Result<RepairOutcome> {
        let applied = (self.apply)()?;
        Ok(RepairOutcome {
            strategy: self.strategy,
            address: self.address,
            applied,
        })
    }
}

impl fmt::Debug for RepairAction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepairAction")
            .field("strategy", &self.strategy)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// One way of repairing a known breakage pattern.
pub trait RepairStrategy<S: RepairableStore> {
    /// Which strategy this is.
    fn kind(&self) -> StrategyKind;

    /// Returns an action when this strategy can repair `record`, whose
    /// broken edge hangs off `parent`.
    ///
    /// Implementations must not mutate the store here.
    fn applicable<'a>(
        &self,
        store: &'a S,
        record: &DiagnosticRecord,
        parent: &S::Node,
    ) -> Result<Option<RepairAction<'a>>>;
}

/// Resets a relationship whose ordered-objects container was lost.
///
/// The relationship comes back empty; its members are repopulated by normal
/// application activity.
#[derive(Clone, Copy, Debug, Default)]
pub struct RelationshipRepair;

impl<S: RepairableStore> RepairStrategy<S> for RelationshipRepair {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Relationship
    }

    fn applicable<'a>(
        &self,
        store: &'a S,
        record: &DiagnosticRecord,
        parent: &S::Node,
    ) -> Result<Option<RepairAction<'a>>> {
        if record.edge_kind != EdgeKind::Relationship {
            return Ok(None);
        }
        let rel = store.get_child(parent, &record.child_name)?;
        let Some(container) = store.objects_container_address(&rel)? else {
            debug!(child = %record.child_name, "repair.relationship.no_container");
            return Ok(None);
        };
        if !addresses_match(&record.failure_detail, container)? {
            debug!(
                child = %record.child_name,
                detail = %record.failure_detail,
                container = %container,
                "repair.relationship.address_mismatch"
            );
            return Ok(None);
        }
        let failed = decode_failure_address(&record.failure_detail)?;
        let parent = parent.clone();
        let child = record.child_name.clone();
        Ok(Some(RepairAction::new(
            StrategyKind::Relationship,
            failed,
            move || {
                if store.objects_container_address(&rel)? != Some(failed) {
                    warn!(%child, address = %failed, "repair.relationship.slot_moved");
                    return Ok(false);
                }
                info!(%child, address = %failed, "repair.relationship.reset");
                store.reset_objects_container(&rel)?;
                store.mark_changed(&parent)?;
                store.commit()?;
                Ok(true)
            },
        )))
    }
}

#[derive(Clone, Debug)]
enum Rebuild {
    Reattach { class: String },
    Derived,
}

/// Replaces a well-known singleton child whose record was lost.
#[derive(Clone, Debug)]
pub struct NamedSingletonRepair {
    kind: StrategyKind,
    child_name: String,
    expected_class: Option<String>,
    rebuild: Rebuild,
}

impl NamedSingletonRepair {
    /// Deletes a lost `SearchManager` and attaches a fresh one.
    pub fn search_manager() -> Self {
        Self {
            kind: StrategyKind::SearchManager,
            child_name: SEARCH_MANAGER_ID.to_string(),
            expected_class: Some(SEARCH_MANAGER_CLASS.to_string()),
            rebuild: Rebuild::Reattach {
                class: SEARCH_MANAGER_CLASS.to_string(),
            },
        }
    }

    /// Deletes a lost `componentSearch` index and has the parent rebuild it.
    pub fn component_search() -> Self {
        Self {
            kind: StrategyKind::ComponentSearch,
            child_name: COMPONENT_SEARCH_ID.to_string(),
            expected_class: None,
            rebuild: Rebuild::Derived,
        }
    }
}

impl<S: RepairableStore> RepairStrategy<S> for NamedSingletonRepair {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn applicable<'a>(
        &self,
        store: &'a S,
        record: &DiagnosticRecord,
        parent: &S::Node,
    ) -> Result<Option<RepairAction<'a>>> {
        if record.child_name != self.child_name {
            return Ok(None);
        }
        let child = store.get_child(parent, &record.child_name)?;
        if let Some(expected) = &self.expected_class {
            if &store.class_name(&child) != expected {
                return Ok(None);
            }
        }
        let live = store.physical_address(&child);
        if !addresses_match(&record.failure_detail, live)? {
            debug!(
                child = %record.child_name,
                detail = %record.failure_detail,
                live = %live,
                "repair.singleton.address_mismatch"
            );
            return Ok(None);
        }
        let failed = decode_failure_address(&record.failure_detail)?;
        let parent = parent.clone();
        let name = self.child_name.clone();
        let rebuild = self.rebuild.clone();
        let kind = self.kind;
        Ok(Some(RepairAction::new(kind, failed, move || {
            let current = store.get_child(&parent, &name)?;
            if store.physical_address(&current) != failed {
                warn!(child = %name, address = %failed, "repair.singleton.slot_moved");
                return Ok(false);
            }
            info!(child = %name, address = %failed, strategy = kind.as_str(), "repair.singleton.replace");
            store.delete_child(&parent, &name)?;
            match &rebuild {
                Rebuild::Reattach { class } => store.attach_fresh(&parent, &name, class)?,
                Rebuild::Derived => store.rebuild_derived(&parent, &name)?,
            }
            store.commit()?;
            Ok(true)
        })))
    }
}

/// Builds the strategy for `kind`.
pub fn strategy_for<S: RepairableStore>(kind: StrategyKind) -> Box<dyn RepairStrategy<S>> {
    match kind {
        StrategyKind::Relationship => Box::new(RelationshipRepair),
        StrategyKind::SearchManager => Box::new(NamedSingletonRepair::search_manager()),
        StrategyKind::ComponentSearch => Box::new(NamedSingletonRepair::component_search()),
    }
}

/// Offers diagnostics to a fixed-priority chain of strategies.
pub struct RepairDispatcher<'s, S: RepairableStore> {
    store: &'s S,
    strategies: Vec<Box<dyn RepairStrategy<S>>>,
}

impl<'s, S: RepairableStore> RepairDispatcher<'s, S> {
    /// Dispatcher over every known strategy.
    pub fn new(store: &'s S) -> Self {
        Self::with_kinds(store, &StrategyKind::ALL)
    }

    /// Dispatcher over the listed strategies, tried in priority order.
    pub fn with_kinds(store: &'s S, kinds: &[StrategyKind]) -> Self {
        let mut kinds = kinds.to_vec();
        kinds.sort();
        kinds.dedup();
        let strategies = kinds.into_iter().map(strategy_for::<S>).collect();
        Self { store, strategies }
    }

    /// Dispatcher over a custom chain, tried in the given order.
    pub fn with_strategies(store: &'s S, strategies: Vec<Box<dyn RepairStrategy<S>>>) -> Self {
        Self { store, strategies }
    }

    /// Strategies in the order they are tried.
    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Applies the first applicable strategy. Returns true iff it mutated
    /// the store.
    pub fn dispatch(&self, record: &DiagnosticRecord) -> Result<bool> {
        Ok(self
            .dispatch_outcome(record)?
            .is_some_and(|outcome| outcome.applied))
    }

    /// Like [`dispatch`](Self::dispatch) but reports which strategy ran.
    ///
    /// Returns `None` when no strategy was applicable. Errors raised while
    /// checking applicability count as "not applicable"; errors raised while
    /// applying are returned.
    pub fn dispatch_outcome(&self, record: &DiagnosticRecord) -> Result<Option<RepairOutcome>> {
        if record.failure_kind != FailureKind::ReferenceMissing {
            return Ok(None);
        }
        let parent = match self.store.resolve_path(&record.parent_path) {
            Ok(parent) => parent,
            Err(err) => {
                debug!(parent = %record.parent_path, error = %err, "repair.parent_unresolvable");
                return Ok(None);
            }
        };
        for strategy in &self.strategies {
            match strategy.applicable(self.store, record, &parent) {
                Ok(Some(action)) => {
                    debug!(
                        strategy = action.strategy().as_str(),
                        address = %action.address(),
                        "repair.apply"
                    );
                    return action.apply().map(Some);
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(
                        strategy = strategy.kind().as_str(),
                        child = %record.child_name,
                        error = %err,
                        "repair.not_applicable"
                    );
                }
            }
        }
        Ok(None)
    }
}
