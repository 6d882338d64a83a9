//! Relation-level operators.
//!
//! Thin wrappers that compose the heap layer and the catalog: insert one
//! tuple, delete by predicate, and select with projection into a result
//! relation. Tuples are fixed-width byte strings laid out per the
//! catalog's attribute descriptors.

mod dml;
mod error;

pub use dml::{delete_where, insert_tuple, select_into, Filter};
pub use error::QueryError;
