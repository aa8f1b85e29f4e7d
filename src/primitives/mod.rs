//! Low-level building blocks shared by the store and the audit engine.

/// Textual address encoding used to compare failure payloads with live
/// object addresses.
pub mod address;
