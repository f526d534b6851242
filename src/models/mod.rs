//! Data models for the cooking school ledger.
//!
//! Field names serialize in camelCase to match the frontend interfaces and the
//! stored documents.

mod course;
mod datastore;
mod student;

pub use course::*;
pub use datastore::*;
pub use student::*;
