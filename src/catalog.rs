//! Relation schemas: attribute names, offsets, widths, and types.
//!
//! The catalog is the schema authority consulted by the relation
//! operators. Every attribute is fixed-width, so a relation's tuples all
//! have the same length and each attribute occupies a fixed byte window
//! within the tuple.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::datum::{Datatype, NUMERIC_WIDTH};

/// Describes one attribute of a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrDesc {
    /// Relation the attribute belongs to.
    pub rel_name: String,
    /// Attribute name, unique within the relation.
    pub attr_name: String,
    /// Byte offset of the attribute within a tuple.
    pub offset: usize,
    /// Width of the attribute in bytes.
    pub len: usize,
    /// Runtime type of the attribute.
    pub datatype: Datatype,
}

/// An attribute as declared at registration time.
#[derive(Debug, Clone)]
pub struct AttrSpec {
    pub name: String,
    pub datatype: Datatype,
    pub len: usize,
}

impl AttrSpec {
    /// A 4-byte integer attribute.
    pub fn integer(name: &str) -> Self {
        Self {
            name: name.to_string(),
            datatype: Datatype::Integer,
            len: NUMERIC_WIDTH,
        }
    }

    /// A 4-byte float attribute.
    pub fn float(name: &str) -> Self {
        Self {
            name: name.to_string(),
            datatype: Datatype::Float,
            len: NUMERIC_WIDTH,
        }
    }

    /// A fixed-width text attribute of `len` bytes.
    pub fn text(name: &str, len: usize) -> Self {
        Self {
            name: name.to_string(),
            datatype: Datatype::Text,
            len,
        }
    }
}

/// Catalog errors.
#[derive(Debug)]
pub enum CatalogError {
    /// No relation registered under this name.
    UnknownRelation(String),
    /// The relation has no attribute of this name.
    UnknownAttribute {
        rel_name: String,
        attr_name: String,
    },
    /// A relation of this name is already registered.
    DuplicateRelation(String),
    /// An attribute declaration was rejected.
    BadAttribute(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::UnknownRelation(name) => write!(f, "unknown relation {:?}", name),
            CatalogError::UnknownAttribute { rel_name, attr_name } => {
                write!(f, "relation {:?} has no attribute {:?}", rel_name, attr_name)
            }
            CatalogError::DuplicateRelation(name) => {
                write!(f, "relation {:?} already registered", name)
            }
            CatalogError::BadAttribute(msg) => write!(f, "bad attribute: {}", msg),
        }
    }
}

impl std::error::Error for CatalogError {}

/// In-process registry of relation schemas.
pub struct Catalog {
    relations: Mutex<HashMap<String, Vec<AttrDesc>>>,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self {
            relations: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a relation's schema, assigning attribute offsets in
    /// declaration order.
    ///
    /// # Errors
    ///
    /// `DuplicateRelation` for a name already registered; `BadAttribute`
    /// for an empty schema, a duplicate attribute name, a numeric
    /// attribute whose width is not 4, or a zero-width text attribute.
    pub fn register(&self, rel_name: &str, attrs: &[AttrSpec]) -> Result<(), CatalogError> {
        if attrs.is_empty() {
            return Err(CatalogError::BadAttribute(format!(
                "relation {:?} declares no attributes",
                rel_name
            )));
        }

        let mut descs = Vec::with_capacity(attrs.len());
        let mut offset = 0;
        for attr in attrs {
            match attr.datatype {
                Datatype::Integer | Datatype::Float if attr.len != NUMERIC_WIDTH => {
                    return Err(CatalogError::BadAttribute(format!(
                        "attribute {:?} must be {} bytes wide",
                        attr.name, NUMERIC_WIDTH
                    )));
                }
                Datatype::Text if attr.len == 0 => {
                    return Err(CatalogError::BadAttribute(format!(
                        "text attribute {:?} must have a nonzero width",
                        attr.name
                    )));
                }
                _ => {}
            }
            if descs.iter().any(|d: &AttrDesc| d.attr_name == attr.name) {
                return Err(CatalogError::BadAttribute(format!(
                    "duplicate attribute {:?}",
                    attr.name
                )));
            }
            descs.push(AttrDesc {
                rel_name: rel_name.to_string(),
                attr_name: attr.name.clone(),
                offset,
                len: attr.len,
                datatype: attr.datatype,
            });
            offset += attr.len;
        }

        let mut relations = self.relations.lock();
        if relations.contains_key(rel_name) {
            return Err(CatalogError::DuplicateRelation(rel_name.to_string()));
        }
        relations.insert(rel_name.to_string(), descs);
        Ok(())
    }

    /// Looks up one attribute of a relation.
    pub fn info(&self, rel_name: &str, attr_name: &str) -> Result<AttrDesc, CatalogError> {
        let relations = self.relations.lock();
        let attrs = relations
            .get(rel_name)
            .ok_or_else(|| CatalogError::UnknownRelation(rel_name.to_string()))?;
        attrs
            .iter()
            .find(|d| d.attr_name == attr_name)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownAttribute {
                rel_name: rel_name.to_string(),
                attr_name: attr_name.to_string(),
            })
    }

    /// Returns all attributes of a relation, in tuple order.
    pub fn relation_info(&self, rel_name: &str) -> Result<Vec<AttrDesc>, CatalogError> {
        self.relations
            .lock()
            .get(rel_name)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownRelation(rel_name.to_string()))
    }

    /// Total tuple length of a relation in bytes.
    pub fn record_len(&self, rel_name: &str) -> Result<usize, CatalogError> {
        Ok(self.relation_info(rel_name)?.iter().map(|d| d.len).sum())
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
