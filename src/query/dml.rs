//! Insert, delete, and select operators.

use log::debug;

use super::error::QueryError;
use crate::catalog::{AttrDesc, Catalog};
use crate::datum::{CompOp, Value};
use crate::heap::{HeapFileScan, InsertFileScan, Predicate, RecordId};
use crate::storage::{BufferPool, Db, Vfs};

/// A selection condition: `attribute op value`.
#[derive(Debug, Clone)]
pub struct Filter {
    /// Attribute of the scanned relation to compare.
    pub attr_name: String,
    /// Comparison operator.
    pub op: CompOp,
    /// Constant to compare against; must match the attribute's type.
    pub value: Value,
}

impl Filter {
    /// Convenience constructor.
    pub fn new(attr_name: &str, op: CompOp, value: Value) -> Self {
        Self {
            attr_name: attr_name.to_string(),
            op,
            value,
        }
    }
}

/// Resolves an optional filter into a scan predicate over `relation`.
fn resolve_predicate(
    catalog: &Catalog,
    relation: &str,
    filter: Option<&Filter>,
) -> Result<Option<Predicate>, QueryError> {
    let Some(filter) = filter else {
        return Ok(None);
    };

    let attr = catalog.info(relation, &filter.attr_name)?;
    if filter.value.datatype() != attr.datatype {
        return Err(QueryError::BadOperand(format!(
            "filter value for {:?} is {:?}, attribute is {:?}",
            attr.attr_name,
            filter.value.datatype(),
            attr.datatype
        )));
    }

    let encoded = filter.value.encode(attr.len);
    let predicate = Predicate::new(attr.offset, attr.len, attr.datatype, &encoded, filter.op)?;
    Ok(Some(predicate))
}

/// Inserts one tuple into a relation.
///
/// Every attribute of the schema must be supplied exactly once, by name,
/// with a value of the attribute's type; there are no NULLs. Returns the
/// record id of the stored tuple.
pub async fn insert_tuple<V: Vfs>(
    db: &Db<V>,
    pool: &BufferPool<V::File>,
    catalog: &Catalog,
    relation: &str,
    values: &[(&str, Value)],
) -> Result<RecordId, QueryError> {
    debug!("insert into {:?}", relation);
    let schema = catalog.relation_info(relation)?;
    if values.len() != schema.len() {
        return Err(QueryError::BadOperand(format!(
            "relation {:?} has {} attributes, {} values supplied",
            relation,
            schema.len(),
            values.len()
        )));
    }

    let record_len: usize = schema.iter().map(|a| a.len).sum();
    let mut record = vec![0u8; record_len];

    for attr in &schema {
        let (_, value) = values
            .iter()
            .find(|(name, _)| *name == attr.attr_name)
            .ok_or_else(|| {
                QueryError::BadOperand(format!("no value for attribute {:?}", attr.attr_name))
            })?;
        if value.datatype() != attr.datatype {
            return Err(QueryError::BadOperand(format!(
                "value for {:?} is {:?}, attribute is {:?}",
                attr.attr_name,
                value.datatype(),
                attr.datatype
            )));
        }
        value.encode_into(&mut record[attr.offset..attr.offset + attr.len]);
    }

    let mut scan = InsertFileScan::open(db, pool, relation).await?;
    let insert_result = scan.insert_record(&record).await;
    scan.close().await?;
    Ok(insert_result?)
}

/// Deletes every tuple matching the filter; `None` deletes all tuples.
///
/// Returns the number of tuples deleted.
pub async fn delete_where<V: Vfs>(
    db: &Db<V>,
    pool: &BufferPool<V::File>,
    catalog: &Catalog,
    relation: &str,
    filter: Option<&Filter>,
) -> Result<usize, QueryError> {
    debug!("delete from {:?}", relation);
    let predicate = resolve_predicate(catalog, relation, filter)?;

    let mut scan = HeapFileScan::open(db, pool, relation).await?;
    scan.start_scan(predicate);

    let mut deleted = 0;
    let scan_result = loop {
        match scan.scan_next().await {
            Ok(Some(_rid)) => match scan.delete_record() {
                Ok(()) => deleted += 1,
                Err(e) => break Err(e),
            },
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    scan.close().await?;
    scan_result?;
    Ok(deleted)
}

/// Copies the projected attribute windows of `record` contiguously into
/// `out`.
fn project(record: &[u8], proj: &[AttrDesc], out: &mut [u8]) -> Result<(), QueryError> {
    let mut out_offset = 0;
    for attr in proj {
        if attr.offset + attr.len > record.len() {
            return Err(QueryError::BadOperand(format!(
                "tuple of {} bytes is shorter than attribute {:?}",
                record.len(),
                attr.attr_name
            )));
        }
        out[out_offset..out_offset + attr.len]
            .copy_from_slice(&record[attr.offset..attr.offset + attr.len]);
        out_offset += attr.len;
    }
    Ok(())
}

/// Selects tuples from `input` and inserts their projection into the
/// `result` relation.
///
/// `proj_names` names the projected attributes of the input relation in
/// output order; the result relation's tuples are the projected windows
/// laid out contiguously. Returns the number of tuples produced.
pub async fn select_into<V: Vfs>(
    db: &Db<V>,
    pool: &BufferPool<V::File>,
    catalog: &Catalog,
    result: &str,
    input: &str,
    proj_names: &[&str],
    filter: Option<&Filter>,
) -> Result<usize, QueryError> {
    debug!("select {:?} from {:?} into {:?}", proj_names, input, result);
    if proj_names.is_empty() {
        return Err(QueryError::BadOperand("empty projection".to_string()));
    }

    let proj: Vec<AttrDesc> = proj_names
        .iter()
        .map(|name| catalog.info(input, name))
        .collect::<Result<_, _>>()?;
    let out_len: usize = proj.iter().map(|a| a.len).sum();

    let predicate = resolve_predicate(catalog, input, filter)?;

    let mut out_scan = InsertFileScan::open(db, pool, result).await?;
    let mut in_scan = HeapFileScan::open(db, pool, input).await?;
    in_scan.start_scan(predicate);

    let mut inserted = 0;
    let mut out = vec![0u8; out_len];
    let scan_result = loop {
        match in_scan.scan_next().await {
            Ok(Some(_rid)) => {
                let projected = match in_scan.record() {
                    Ok(record) => project(record, &proj, &mut out),
                    Err(e) => break Err(QueryError::Heap(e)),
                };
                if let Err(e) = projected {
                    break Err(e);
                }
                match out_scan.insert_record(&out).await {
                    Ok(_) => inserted += 1,
                    Err(e) => break Err(QueryError::Heap(e)),
                }
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(QueryError::Heap(e)),
        }
    };

    in_scan.close().await?;
    out_scan.close().await?;
    scan_result?;
    Ok(inserted)
}
