#![allow(missing_docs)]

use refcheck::{
    audit::{
        diagnose, scan, CollectingSink, DiagnosticRecord, EdgeKind, ScanOptions, TextSink,
    },
    storage::{MemoryStore, ObjectStore, RepairableStore, StoreBuilder},
    types::{Address, FailureKind, ObjectPath, Result},
};

fn records(store: &MemoryStore, start: &ObjectPath) -> Vec<DiagnosticRecord> {
    diagnose(store, start)
        .expect("start resolves")
        .collect::<Result<Vec<_>>>()
        .expect("no fatal errors")
}

fn scan_with_repair(store: &MemoryStore) -> CollectingSink {
    let mut sink = CollectingSink::new();
    let opts = ScanOptions {
        repair: true,
        ..ScanOptions::default()
    };
    scan(store, &ObjectPath::root(), &opts, &mut sink).expect("scan");
    sink
}

/// Root with one relationship `r1` whose container lives at 0xdeadbeef and is
/// gone.
fn lost_container_at_deadbeef() -> MemoryStore {
    let mut builder = StoreBuilder::new();
    let root = builder.root();
    let rel = builder.relationship(root, "r1", false).unwrap();
    let container = builder.container_of(rel).unwrap();
    builder.relocate(container, Address(0xdead_beef)).unwrap();
    builder.drop_record(Address(0xdead_beef));
    builder.build()
}

#[test]
fn clean_store_reports_nothing() {
    let store = StoreBuilder::demo(false).unwrap().build();
    assert!(records(&store, &ObjectPath::root()).is_empty());
}

#[test]
fn lost_relationship_container_is_reported_once() {
    let store = lost_container_at_deadbeef();
    let found = records(&store, &ObjectPath::root());
    assert_eq!(found.len(), 1);
    let record = &found[0];
    assert_eq!(record.failure_kind, FailureKind::ReferenceMissing);
    assert_eq!(record.failure_detail, "deadbeef");
    assert_eq!(record.edge_kind, EdgeKind::Relationship);
    assert_eq!(record.child_name, "r1");
    assert_eq!(record.parent_path, ObjectPath::root());
    assert_eq!(
        record.to_string(),
        "ReferenceMissing: deadbeef on relationship 'r1' of app"
    );
}

#[test]
fn lost_relationship_container_is_repaired_with_one_commit() {
    let store = lost_container_at_deadbeef();
    let sink = scan_with_repair(&store);
    assert_eq!(sink.diagnostics().len(), 1);
    assert_eq!(store.commit_count(), 1);

    let rel = store.get_child(&store.root_node(), "r1").unwrap();
    let container = store.objects_container_address(&rel).unwrap().unwrap();
    assert_ne!(container, Address(0xdead_beef));
    assert!(store.contains(container));
    store.invoke(&rel).unwrap();
    assert!(records(&store, &ObjectPath::root()).is_empty());
}

#[test]
fn dangling_attribute_is_reported_and_not_expanded() {
    let mut builder = StoreBuilder::new();
    let root = builder.root();
    builder.list_dangling(root, "bogus").unwrap();
    let store = builder.build();

    let mut traversal = diagnose(&store, &ObjectPath::root()).unwrap();
    let record = traversal.next().unwrap().unwrap();
    assert_eq!(record.failure_kind, FailureKind::AttributeMissing);
    assert_eq!(record.failure_detail, "bogus");
    assert_eq!(record.edge_kind, EdgeKind::Attribute);
    assert_eq!(record.child_name, "bogus");
    assert_eq!(record.parent_path, ObjectPath::root());
    assert!(traversal.next().is_none());
    assert_eq!(traversal.nodes_visited(), 1);
}

#[test]
fn containment_members_are_walked_breadth_first() {
    let mut builder = StoreBuilder::new();
    let root = builder.root();
    let kids = builder.relationship(root, "kids", true).unwrap();
    let k1 = builder.member_folder(kids, "k1", "Device").unwrap();
    builder.list_dangling(k1, "deep").unwrap();
    let shallow = builder.folder(root, "a", "Folder").unwrap();
    builder.list_dangling(shallow, "shallow").unwrap();
    let store = builder.build();

    let mut traversal = diagnose(&store, &ObjectPath::root()).unwrap();
    let found: Vec<_> = traversal.by_ref().map(|item| item.unwrap()).collect();
    let names: Vec<_> = found.iter().map(|r| r.child_name.as_str()).collect();
    assert_eq!(names, ["shallow", "deep"]);
    assert_eq!(
        found[1].parent_path,
        ObjectPath::from_segments(["kids", "k1"])
    );
    // root, kids, a, k1
    assert_eq!(traversal.nodes_visited(), 4);
}

#[test]
fn plain_relationship_members_are_not_walked() {
    let mut builder = StoreBuilder::new();
    let root = builder.root();
    let devices = builder.folder(root, "devices", "Folder").unwrap();
    let edge1 = builder.folder(devices, "edge1", "Device").unwrap();
    builder.list_dangling(edge1, "bogus").unwrap();
    let dependents = builder.relationship(root, "dependents", false).unwrap();
    builder.link_member(dependents, "edge1", edge1).unwrap();
    let store = builder.build();

    let found = records(&store, &ObjectPath::root());
    assert_eq!(found.len(), 1);
    assert_eq!(
        found[0].parent_path,
        ObjectPath::from_segments(["devices", "edge1"])
    );
}

#[test]
fn relationship_is_never_read_as_attribute() {
    let mut builder = StoreBuilder::new();
    let root = builder.root();
    let rel = builder.relationship(root, "devices", true).unwrap();
    let container = builder.container_of(rel).unwrap();
    builder.drop_record(container);
    let store = builder.build();

    let found = records(&store, &ObjectPath::root());
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].edge_kind, EdgeKind::Relationship);
}

#[test]
fn missing_member_key_is_reported_but_not_repaired() {
    let mut builder = StoreBuilder::new();
    let root = builder.root();
    let rel = builder.relationship(root, "devices", true).unwrap();
    builder.member_folder(rel, "edge1", "Device").unwrap();
    builder.drop_member_key(rel, "edge1").unwrap();
    let store = builder.build();

    let sink = scan_with_repair(&store);
    let found = sink.diagnostics();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].failure_kind, FailureKind::KeyMissing);
    assert_eq!(found[0].failure_detail, "edge1");
    assert_eq!(found[0].child_name, "devices");
    assert_eq!(store.commit_count(), 0);
}

#[test]
fn scan_can_start_below_the_root() {
    let store = StoreBuilder::demo(true).unwrap().build();
    let start = ObjectPath::parse("app/zport/dmd/Devices/devices", "app");
    let found = records(&store, &start);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].child_name, "edge2");
    assert_eq!(found[0].edge_kind, EdgeKind::Attribute);
}

#[test]
fn traversal_can_be_abandoned_early() {
    let store = StoreBuilder::demo(true).unwrap().build();
    let mut traversal = diagnose(&store, &ObjectPath::root()).unwrap();
    assert!(traversal.next().is_some());
    drop(traversal);
    assert_eq!(records(&store, &ObjectPath::root()).len(), 5);
}

#[test]
fn text_report_matches_line_format() {
    let store = StoreBuilder::demo(true).unwrap().build();
    let mut sink = TextSink::new(Vec::new());
    let report = scan(
        &store,
        &ObjectPath::root(),
        &ScanOptions::default(),
        &mut sink,
    )
    .unwrap();
    let text = String::from_utf8(sink.into_inner()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len() as u64, report.records);
    assert!(lines.contains(&"AttributeMissing: bogus on attribute 'bogus' of app.zport.dmd.Devices"));
    assert!(lines
        .iter()
        .any(|line| line.ends_with("on attribute 'edge2' of app.zport.dmd.Devices.devices")));
}
