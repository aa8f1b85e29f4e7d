#![allow(missing_docs)]

use refcheck::{
    audit::{
        diagnose, scan, CollectingSink, DiagnosticRecord, ReportEvent, RepairDispatcher,
        ScanOptions, StrategyKind, COMPONENT_SEARCH_ID, SEARCH_MANAGER_CLASS, SEARCH_MANAGER_ID,
    },
    storage::{
        CatalogStore, MemoryStore, ObjectStore, StoreBuilder, DERIVED_INDEX_CLASS,
    },
    types::{Address, FailureKind, ObjectPath, Result},
};

fn records(store: &MemoryStore) -> Vec<DiagnosticRecord> {
    diagnose(store, &ObjectPath::root())
        .unwrap()
        .collect::<Result<Vec<_>>>()
        .unwrap()
}

fn single_record(store: &MemoryStore) -> DiagnosticRecord {
    let mut found = records(store);
    assert_eq!(found.len(), 1, "{found:?}");
    found.remove(0)
}

fn with_detail(record: &DiagnosticRecord, detail: &str) -> DiagnosticRecord {
    DiagnosticRecord {
        failure_detail: detail.to_string(),
        ..record.clone()
    }
}

/// `dmd` folder holding a `SearchManager` singleton and a `componentSearch`
/// index next to two devices.
struct Singletons {
    store: MemoryStore,
    search_manager: Address,
    component_search: Address,
}

fn singletons(drop_search_manager: bool, drop_component_search: bool) -> Singletons {
    let mut builder = StoreBuilder::new();
    let root = builder.root();
    let dmd = builder.folder(root, "dmd", "DataRoot").unwrap();
    builder.leaf(dmd, "edge1", "Device").unwrap();
    builder.leaf(dmd, "edge2", "Device").unwrap();
    let search_manager = builder
        .leaf(dmd, SEARCH_MANAGER_ID, SEARCH_MANAGER_CLASS)
        .unwrap();
    let component_search = builder
        .leaf(dmd, COMPONENT_SEARCH_ID, DERIVED_INDEX_CLASS)
        .unwrap();
    if drop_search_manager {
        builder.drop_record(search_manager);
    }
    if drop_component_search {
        builder.drop_record(component_search);
    }
    Singletons {
        store: builder.build(),
        search_manager,
        component_search,
    }
}

#[test]
fn relationship_repair_empties_the_container() {
    let mut builder = StoreBuilder::new();
    let root = builder.root();
    let rel = builder.relationship(root, "devices", true).unwrap();
    builder.member_folder(rel, "edge1", "Device").unwrap();
    let container = builder.container_of(rel).unwrap();
    builder.drop_record(container);
    let store = builder.build();

    let record = single_record(&store);
    let outcome = RepairDispatcher::new(&store)
        .dispatch_outcome(&record)
        .unwrap()
        .expect("a strategy applies");
    assert_eq!(outcome.strategy, StrategyKind::Relationship);
    assert_eq!(outcome.address, container);
    assert!(outcome.applied);
    assert_eq!(store.commit_count(), 1);

    let rel_node = store.get_child(&store.root_node(), "devices").unwrap();
    assert_eq!(store.child_names(&rel_node).unwrap().unwrap().len(), 0);
    assert!(records(&store).is_empty());
}

#[test]
fn search_manager_is_replaced_with_a_fresh_instance() {
    let fixture = singletons(true, false);
    let store = &fixture.store;
    let record = single_record(store);
    assert_eq!(record.child_name, SEARCH_MANAGER_ID);

    assert!(RepairDispatcher::new(store).dispatch(&record).unwrap());
    assert_eq!(store.commit_count(), 1);

    let dmd = store.resolve_path(&ObjectPath::from_segments(["dmd"])).unwrap();
    let fresh = store.get_child(&dmd, SEARCH_MANAGER_ID).unwrap();
    assert_ne!(fresh.address(), fixture.search_manager);
    assert_eq!(store.class_name(&fresh), SEARCH_MANAGER_CLASS);
    assert_eq!(store.identifier(&fresh).unwrap(), SEARCH_MANAGER_ID);
    assert!(records(store).is_empty());
}

#[test]
fn search_manager_of_unexpected_class_is_left_alone() {
    let mut builder = StoreBuilder::new();
    let root = builder.root();
    let impostor = builder.leaf(root, SEARCH_MANAGER_ID, "Leaf").unwrap();
    builder.drop_record(impostor);
    let store = builder.build();

    let record = single_record(&store);
    assert!(!RepairDispatcher::new(&store).dispatch(&record).unwrap());
    assert_eq!(store.commit_count(), 0);
}

#[test]
fn component_search_is_rebuilt_from_its_parent() {
    let fixture = singletons(false, true);
    let store = &fixture.store;
    let record = single_record(store);
    assert_eq!(record.child_name, COMPONENT_SEARCH_ID);

    let outcome = RepairDispatcher::new(store)
        .dispatch_outcome(&record)
        .unwrap()
        .unwrap();
    assert_eq!(outcome.strategy, StrategyKind::ComponentSearch);
    assert_eq!(outcome.address, fixture.component_search);
    assert_eq!(store.commit_count(), 1);

    let dmd = store.resolve_path(&ObjectPath::from_segments(["dmd"])).unwrap();
    let index = store.get_child(&dmd, COMPONENT_SEARCH_ID).unwrap();
    assert_eq!(store.class_name(&index), DERIVED_INDEX_CLASS);
    let entries = store.catalog_entries(&index).unwrap();
    assert_eq!(
        entries,
        vec![
            ObjectPath::from_segments(["dmd", SEARCH_MANAGER_ID]),
            ObjectPath::from_segments(["dmd", "edge1"]),
            ObjectPath::from_segments(["dmd", "edge2"]),
        ]
    );
    assert!(records(store).is_empty());
}

#[test]
fn address_mismatch_never_mutates() {
    let mut builder = StoreBuilder::new();
    let root = builder.root();
    let rel = builder.relationship(root, "devices", true).unwrap();
    let container = builder.container_of(rel).unwrap();
    builder.drop_record(container);
    let search_manager = builder
        .leaf(root, SEARCH_MANAGER_ID, SEARCH_MANAGER_CLASS)
        .unwrap();
    builder.drop_record(search_manager);
    let component_search = builder
        .leaf(root, COMPONENT_SEARCH_ID, DERIVED_INDEX_CLASS)
        .unwrap();
    builder.drop_record(component_search);
    let store = builder.build();

    let found = records(&store);
    assert_eq!(found.len(), 3);
    let before = store.snapshot();
    let dispatcher = RepairDispatcher::new(&store);
    for record in &found {
        let wrong = with_detail(record, "0badf00d");
        assert!(!dispatcher.dispatch(&wrong).unwrap(), "{wrong}");
    }
    assert_eq!(store.commit_count(), 0);
    assert_eq!(store.pending_changes(), 0);
    assert_eq!(store.snapshot(), before);
}

#[test]
fn prefixed_and_bare_details_are_equivalent() {
    let mut builder = StoreBuilder::new();
    let root = builder.root();
    let rel = builder.relationship(root, "r1", false).unwrap();
    let container = builder.container_of(rel).unwrap();
    builder.drop_record(container);
    let store = builder.build();

    let record = single_record(&store);
    let prefixed = with_detail(&record, &format!("0x{:016X}", container.0));
    assert!(RepairDispatcher::new(&store).dispatch(&prefixed).unwrap());
}

#[test]
fn only_reference_failures_reach_the_chain() {
    let mut builder = StoreBuilder::new();
    let root = builder.root();
    builder.list_dangling(root, SEARCH_MANAGER_ID).unwrap();
    let store = builder.build();

    let record = single_record(&store);
    assert_eq!(record.failure_kind, FailureKind::AttributeMissing);
    assert!(!RepairDispatcher::new(&store).dispatch(&record).unwrap());
}

#[test]
fn disabled_strategies_are_skipped() {
    let fixture = singletons(true, true);
    let store = &fixture.store;
    let mut sink = CollectingSink::new();
    let opts = ScanOptions {
        repair: true,
        strategies: vec![StrategyKind::ComponentSearch],
        ..ScanOptions::default()
    };
    let report = scan(store, &ObjectPath::root(), &opts, &mut sink).unwrap();
    assert_eq!(report.records, 2);
    assert_eq!(report.repairs_applied, 1);

    let repaired: Vec<_> = sink
        .events
        .iter()
        .filter_map(|event| match event {
            ReportEvent::Repaired(record, _) => Some(record.child_name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(repaired, [COMPONENT_SEARCH_ID]);
    assert_eq!(records(store).len(), 1);
}

#[test]
fn demo_store_repairs_everything_repairable() {
    let store = StoreBuilder::demo(true).unwrap().build();
    let opts = ScanOptions {
        repair: true,
        ..ScanOptions::default()
    };
    let report = scan(&store, &ObjectPath::root(), &opts, &mut CollectingSink::new()).unwrap();
    assert_eq!(report.records, 5);
    assert_eq!(report.repairs_applied, 3);
    assert_eq!(store.commit_count(), 3);

    let remaining: Vec<_> = records(&store)
        .into_iter()
        .map(|record| record.child_name)
        .collect();
    assert_eq!(remaining, ["bogus", "edge2"]);
}
