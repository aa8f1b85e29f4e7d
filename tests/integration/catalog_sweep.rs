#![allow(missing_docs)]

use refcheck::{
    audit::{
        default_catalogs, sweep_catalogs, CollectingSink, ReportEvent, SweepOptions,
        DEFAULT_REINDEX_TARGETS,
    },
    storage::{CatalogStore, ObjectStore, StoreBuilder},
    types::ObjectPath,
};

fn edge(id: &str) -> ObjectPath {
    ObjectPath::from_segments(["zport", "dmd", "Devices", "devices", id])
}

#[test]
fn report_only_sweep_lists_dangling_entries() {
    let store = StoreBuilder::demo(true).unwrap().build();
    let mut sink = CollectingSink::new();
    let report = sweep_catalogs(
        &store,
        &default_catalogs(),
        &SweepOptions::default(),
        &mut sink,
    )
    .unwrap();

    let found: Vec<_> = report.catalogs.iter().filter(|c| c.found).collect();
    assert_eq!(found.len(), 2);
    for catalog in &found {
        assert_eq!(catalog.entries, 2);
        assert_eq!(catalog.dangling, vec![edge("edge2")]);
        assert_eq!(catalog.removed, 0);
    }
    assert_eq!(report.catalogs.len(), default_catalogs().len());
    assert_eq!(store.commit_count(), 0);

    let dangling = sink
        .events
        .iter()
        .filter(|event| matches!(event, ReportEvent::DanglingEntry(_, _, false)))
        .count();
    assert_eq!(dangling, 2);
}

fn fixing() -> SweepOptions {
    SweepOptions {
        fix: true,
        ..SweepOptions::default()
    }
}

#[test]
fn fix_removes_entries_and_commits_per_catalog() {
    let store = StoreBuilder::demo(true).unwrap().build();
    let catalogs = default_catalogs();
    let opts = fixing();
    let report = sweep_catalogs(&store, &catalogs, &opts, &mut CollectingSink::new()).unwrap();
    assert_eq!(report.removed(), 2);
    // Two catalogs, then Devices and Manufacturers reindexed.
    assert_eq!(store.commit_count(), 4);

    let global = store
        .resolve_path(&ObjectPath::from_segments(["zport", "dmd", "global_catalog"]))
        .unwrap();
    assert_eq!(store.catalog_entries(&global).unwrap(), vec![edge("edge1")]);

    let again = sweep_catalogs(&store, &catalogs, &opts, &mut CollectingSink::new()).unwrap();
    assert_eq!(again.dangling(), 0);
    assert_eq!(store.commit_count(), 6);
}

#[test]
fn missing_catalog_is_skipped() {
    let store = StoreBuilder::new().build();
    let mut sink = CollectingSink::new();
    let missing = ObjectPath::from_segments(["zport", "dmd", "global_catalog"]);
    let report = sweep_catalogs(
        &store,
        std::slice::from_ref(&missing),
        &fixing(),
        &mut sink,
    )
    .unwrap();
    assert!(!report.catalogs[0].found);
    assert_eq!(sink.events[0], ReportEvent::Catalog(missing, false));
    assert_eq!(report.reindexed.len(), DEFAULT_REINDEX_TARGETS.len());
    assert!(report.reindexed.iter().all(|target| !target.found));
    assert!(sink.events[1..]
        .iter()
        .all(|event| matches!(event, ReportEvent::Reindexed(_, false))));
    assert_eq!(store.commit_count(), 0);
}

#[test]
fn clean_store_has_no_dangling_entries() {
    let store = StoreBuilder::demo(false).unwrap().build();
    let report = sweep_catalogs(
        &store,
        &default_catalogs(),
        &fixing(),
        &mut CollectingSink::new(),
    )
    .unwrap();
    assert_eq!(report.dangling(), 0);
    assert_eq!(store.commit_count(), 2);
}

#[test]
fn fix_reindexes_devices_and_skips_missing_structures() {
    let store = StoreBuilder::demo(false).unwrap().build();
    let search = store
        .resolve_path(&ObjectPath::from_segments(["zport", "dmd", "Devices", "deviceSearch"]))
        .unwrap();
    store.uncatalog(&search, &edge("edge1")).unwrap();
    store.commit().unwrap();
    assert_eq!(store.catalog_entries(&search).unwrap(), vec![edge("edge2")]);

    let mut sink = CollectingSink::new();
    let report = sweep_catalogs(&store, &[], &fixing(), &mut sink).unwrap();

    assert_eq!(
        store.catalog_entries(&search).unwrap(),
        vec![edge("edge1"), edge("edge2")]
    );
    let outcome: Vec<_> = report
        .reindexed
        .iter()
        .map(|target| (target.path.last().unwrap_or_default(), target.found, target.catalogs))
        .collect();
    assert_eq!(
        outcome,
        [
            ("Devices", true, 1),
            ("Events", false, 0),
            ("Manufacturers", true, 0),
            ("Networks", false, 0),
        ]
    );
    assert_eq!(
        sink.events[0],
        ReportEvent::Reindexed(ObjectPath::from_segments(["zport", "dmd", "Devices"]), true)
    );
    // One commit for the manual edit, one per structure found.
    assert_eq!(store.commit_count(), 3);
}
