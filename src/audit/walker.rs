use std::collections::{btree_set, HashSet, VecDeque};

use tracing::{debug, trace};

use crate::audit::edges::classify_edges;
use crate::audit::record::{DiagnosticRecord, EdgeKind};
use crate::storage::ObjectStore;
use crate::types::{Address, Failure, ObjectPath, Result, StoreError};

/// Breadth-first walker over the object graph of a store.
pub struct GraphWalker<'s, S: ObjectStore> {
    store: &'s S,
}

impl<'s, S: ObjectStore> GraphWalker<'s, S> {
    /// Creates a walker over `store`.
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Starts a traversal at `root`.
    ///
    /// Nothing is read from the store until the returned iterator is pulled.
    pub fn traverse(&self, root: S::Node) -> Traversal<'s, S> {
        let mut seen = HashSet::new();
        seen.insert(self.store.physical_address(&root));
        let mut queue = VecDeque::new();
        queue.push_back(root);
        Traversal {
            store: self.store,
            queue,
            seen,
            current: None,
            nodes_visited: 0,
            finished: false,
        }
    }
}

struct Expansion<N> {
    node: N,
    path: ObjectPath,
    relationships: btree_set::IntoIter<String>,
    attributes: btree_set::IntoIter<String>,
}

enum EdgeCheck<N> {
    Broken(Failure),
    Enqueue(N),
    Skip,
}

/// Lazy sequence of diagnostics produced by [`GraphWalker::traverse`].
///
/// Each call to `next` checks only as many edges as it takes to find the next
/// broken one. Recognized failures come out as `Ok` records; any other store
/// error comes out once as `Err` and ends the traversal.
pub struct Traversal<'s, S: ObjectStore> {
    store: &'s S,
    queue: VecDeque<S::Node>,
    seen: HashSet<Address>,
    current: Option<Expansion<S::Node>>,
    nodes_visited: u64,
    finished: bool,
}

impl<'s, S: ObjectStore> Traversal<'s, S> {
    /// Number of nodes taken off the queue so far.
    pub fn nodes_visited(&self) -> u64 {
        self.nodes_visited
    }

    fn enqueue(&mut self, node: S::Node) {
        if self.seen.insert(self.store.physical_address(&node)) {
            self.queue.push_back(node);
        }
    }

    fn fail(&mut self, err: StoreError) -> Option<Result<DiagnosticRecord>> {
        self.finished = true;
        self.queue.clear();
        self.current = None;
        Some(Err(err))
    }

    /// Pops the next queued node and starts expanding it.
    ///
    /// Returns a record when the node itself cannot be classified.
    fn open_next(&mut self, node: S::Node) -> Result<Option<DiagnosticRecord>> {
        self.nodes_visited += 1;
        let path = self.store.physical_path(&node);
        match classify_edges(self.store, &node) {
            Ok(edges) => {
                trace!(
                    path = %path,
                    relationships = edges.relationships.len(),
                    attributes = edges.attributes.len(),
                    "walker.expand"
                );
                self.current = Some(Expansion {
                    node,
                    path,
                    relationships: edges.relationships.into_iter(),
                    attributes: edges.attributes.into_iter(),
                });
                Ok(None)
            }
            Err(StoreError::Broken(failure)) => {
                debug!(path = %path, %failure, "walker.unclassifiable");
                let name = path.last().unwrap_or_default().to_string();
                Ok(Some(DiagnosticRecord::new(
                    failure,
                    EdgeKind::TraversalRoot,
                    name,
                    path.parent(),
                )))
            }
            Err(err) => Err(err),
        }
    }
}

fn check_relationship<S: ObjectStore>(
    store: &S,
    node: &S::Node,
    name: &str,
) -> Result<EdgeCheck<S::Node>> {
    let outcome = store.get_child(node, name).and_then(|rel| {
        store.invoke(&rel)?;
        let containment = store.is_containment(&rel)?;
        Ok((rel, containment))
    });
    match outcome {
        Ok((rel, true)) => Ok(EdgeCheck::Enqueue(rel)),
        Ok((_, false)) => Ok(EdgeCheck::Skip),
        Err(StoreError::Broken(failure)) => Ok(EdgeCheck::Broken(failure)),
        Err(err) => Err(err),
    }
}

fn check_attribute<S: ObjectStore>(
    store: &S,
    node: &S::Node,
    name: &str,
) -> Result<EdgeCheck<S::Node>> {
    let outcome = store.get_child(node, name).and_then(|child| {
        store.identifier(&child)?;
        Ok(child)
    });
    match outcome {
        Ok(child) => Ok(EdgeCheck::Enqueue(child)),
        Err(StoreError::Broken(failure)) => Ok(EdgeCheck::Broken(failure)),
        Err(err) => Err(err),
    }
}

impl<'s, S: ObjectStore> Iterator for Traversal<'s, S> {
    type Item = Result<DiagnosticRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let store = self.store;
        loop {
            let step = match self.current.as_mut() {
                Some(exp) => {
                    if let Some(name) = exp.relationships.next() {
                        let checked = check_relationship(store, &exp.node, &name);
                        Some((EdgeKind::Relationship, name, exp.path.clone(), checked))
                    } else if let Some(name) = exp.attributes.next() {
                        let checked = check_attribute(store, &exp.node, &name);
                        Some((EdgeKind::Attribute, name, exp.path.clone(), checked))
                    } else {
                        None
                    }
                }
                None => {
                    let Some(node) = self.queue.pop_front() else {
                        self.finished = true;
                        return None;
                    };
                    match self.open_next(node) {
                        Ok(Some(record)) => return Some(Ok(record)),
                        Ok(None) => continue,
                        Err(err) => return self.fail(err),
                    }
                }
            };

            let Some((edge_kind, name, parent_path, checked)) = step else {
                self.current = None;
                continue;
            };
            match checked {
                Ok(EdgeCheck::Broken(failure)) => {
                    return Some(Ok(DiagnosticRecord::new(
                        failure,
                        edge_kind,
                        name,
                        parent_path,
                    )));
                }
                Ok(EdgeCheck::Enqueue(child)) => self.enqueue(child),
                Ok(EdgeCheck::Skip) => {}
                Err(err) => return self.fail(err),
            }
        }
    }
}
