//! Relation operator errors.

use crate::catalog::CatalogError;
use crate::heap::HeapError;

/// Errors from the relation operators.
#[derive(Debug)]
pub enum QueryError {
    /// Operator arguments were rejected: missing or mistyped attribute
    /// value, empty projection, or a tuple/schema mismatch.
    BadOperand(String),

    /// Schema lookup failed.
    Catalog(CatalogError),

    /// Error from the heap layer, surfaced verbatim.
    Heap(HeapError),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::BadOperand(msg) => write!(f, "bad operand: {}", msg),
            QueryError::Catalog(e) => write!(f, "catalog error: {}", e),
            QueryError::Heap(e) => write!(f, "heap error: {}", e),
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueryError::Catalog(e) => Some(e),
            QueryError::Heap(e) => Some(e),
            QueryError::BadOperand(_) => None,
        }
    }
}

impl From<CatalogError> for QueryError {
    fn from(e: CatalogError) -> Self {
        QueryError::Catalog(e)
    }
}

impl From<HeapError> for QueryError {
    fn from(e: HeapError) -> Self {
        QueryError::Heap(e)
    }
}
