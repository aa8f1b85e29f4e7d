//! Finds and repairs broken references in a graph-shaped persistent object
//! store.
//!
//! [`audit`] holds the traversal, diagnosis and repair engine; [`storage`]
//! defines the store interface it runs against together with a
//! snapshot-backed reference store.

#![warn(missing_docs)]

pub mod audit;
pub mod primitives;
pub mod storage;
pub mod types;
