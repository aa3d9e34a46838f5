//! Remote-store transport
//!
//! [`TransportClient`] is the seam between the modeling layer and the
//! actual store: put, get by key, and key-driven query. The in-memory
//! implementation backs tests and local development; it stores wire
//! records keyed by the table's key schema and evaluates conditions the
//! way the remote store would.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use thiserror::Error;

use crate::planner::{Comparison, Condition, ConditionSet};
use crate::schema::KeySchema;
use crate::wire::{WireRecord, WireValue};

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// The table is not known to the transport
    #[error("unknown table '{0}'")]
    UnknownTable(String),
    /// A record is missing a key attribute or is otherwise unusable
    #[error("malformed record: {0}")]
    MalformedRecord(String),
    /// The store cannot evaluate the request
    #[error("unsupported request: {0}")]
    Unsupported(String),
    /// The store is unreachable or failed mid-request
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Client seam to the remote store.
///
/// Implementations are free to batch, retry, or fan out internally;
/// callers only see the three record-level operations.
pub trait TransportClient: Send + Sync {
    /// Writes one record, replacing any record with the same key
    fn put_record(
        &self,
        table: &str,
        record: WireRecord,
    ) -> impl std::future::Future<Output = TransportResult<()>> + Send;

    /// Reads one record by its full key, if present
    fn get_record(
        &self,
        table: &str,
        key: &WireRecord,
    ) -> impl std::future::Future<Output = TransportResult<Option<WireRecord>>> + Send;

    /// Reads records matching the conditions.
    ///
    /// `projection` limits the attributes returned; `None` returns full
    /// records.
    fn query(
        &self,
        table: &str,
        conditions: &ConditionSet,
        projection: Option<&[String]>,
    ) -> impl std::future::Future<Output = TransportResult<Vec<WireRecord>>> + Send;
}

/// In-memory transport for tests and local development
#[derive(Debug, Default)]
pub struct MemoryTransport {
    tables: Mutex<HashMap<String, Table>>,
}

#[derive(Debug)]
struct Table {
    key: KeySchema,
    // Records ordered by composite key for stable iteration
    records: BTreeMap<String, WireRecord>,
}

impl MemoryTransport {
    /// Creates an empty transport with no tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table and its key schema; idempotent for the same key
    pub fn register_table(&self, name: impl Into<String>, key: KeySchema) {
        let mut tables = match self.tables.lock() {
            Ok(tables) => tables,
            Err(poisoned) => poisoned.into_inner(),
        };
        tables.entry(name.into()).or_insert(Table {
            key,
            records: BTreeMap::new(),
        });
    }

    /// Number of records in a table, for assertions
    pub fn record_count(&self, table: &str) -> usize {
        let tables = match self.tables.lock() {
            Ok(tables) => tables,
            Err(poisoned) => poisoned.into_inner(),
        };
        tables.get(table).map(|t| t.records.len()).unwrap_or(0)
    }
}

impl TransportClient for MemoryTransport {
    async fn put_record(&self, table: &str, record: WireRecord) -> TransportResult<()> {
        let mut tables = match self.tables.lock() {
            Ok(tables) => tables,
            Err(poisoned) => poisoned.into_inner(),
        };
        let table = tables
            .get_mut(table)
            .ok_or_else(|| TransportError::UnknownTable(table.to_string()))?;
        let key = composite_key(&table.key, &record)?;
        table.records.insert(key, record);
        Ok(())
    }

    async fn get_record(
        &self,
        table: &str,
        key: &WireRecord,
    ) -> TransportResult<Option<WireRecord>> {
        let tables = match self.tables.lock() {
            Ok(tables) => tables,
            Err(poisoned) => poisoned.into_inner(),
        };
        let table = tables
            .get(table)
            .ok_or_else(|| TransportError::UnknownTable(table.to_string()))?;
        let key = composite_key(&table.key, key)?;
        Ok(table.records.get(&key).cloned())
    }

    async fn query(
        &self,
        table: &str,
        conditions: &ConditionSet,
        projection: Option<&[String]>,
    ) -> TransportResult<Vec<WireRecord>> {
        let tables = match self.tables.lock() {
            Ok(tables) => tables,
            Err(poisoned) => poisoned.into_inner(),
        };
        let table = tables
            .get(table)
            .ok_or_else(|| TransportError::UnknownTable(table.to_string()))?;

        let mut out = Vec::new();
        for record in table.records.values() {
            let mut matched = true;
            for condition in conditions
                .key_conditions()
                .iter()
                .chain(conditions.filters())
            {
                if !evaluate(condition, record)? {
                    matched = false;
                    break;
                }
            }
            if !matched {
                continue;
            }
            let record = match projection {
                Some(attributes) => record
                    .iter()
                    .filter(|(name, _)| attributes.iter().any(|a| a == *name))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect(),
                None => record.clone(),
            };
            out.push(record);
        }
        Ok(out)
    }
}

/// Builds the composite storage key from the key attributes
fn composite_key(key: &KeySchema, record: &WireRecord) -> TransportResult<String> {
    let hash = key_part(record, &key.hash_key)?;
    match &key.range_key {
        Some(range_key) => {
            let range = key_part(record, range_key)?;
            Ok(format!("{}\u{1f}{}", hash, range))
        }
        None => Ok(hash),
    }
}

fn key_part(record: &WireRecord, attribute: &str) -> TransportResult<String> {
    let value = record.get(attribute).ok_or_else(|| {
        TransportError::MalformedRecord(format!("missing key attribute '{}'", attribute))
    })?;
    match value {
        WireValue::S(s) => Ok(s.clone()),
        WireValue::N(n) => Ok(n.clone()),
        other => Err(TransportError::MalformedRecord(format!(
            "key attribute '{}' has non-scalar tag {}",
            attribute,
            other.type_name()
        ))),
    }
}

/// Evaluates one condition against a record; an absent attribute never
/// matches
fn evaluate(condition: &Condition, record: &WireRecord) -> TransportResult<bool> {
    let Some(value) = record.get(&condition.attribute) else {
        return Ok(false);
    };
    let operands = &condition.values;
    let first = operands.first().ok_or_else(|| {
        TransportError::Unsupported(format!(
            "{} on '{}' has no operand",
            condition.comparison.as_str(),
            condition.attribute
        ))
    })?;

    Ok(match condition.comparison {
        Comparison::Eq => value == first,
        Comparison::Ne => value != first,
        Comparison::Lt => compare(value, first)?.is_lt(),
        Comparison::Le => compare(value, first)?.is_le(),
        Comparison::Gt => compare(value, first)?.is_gt(),
        Comparison::Ge => compare(value, first)?.is_ge(),
        Comparison::Between => {
            let high = operands.get(1).ok_or_else(|| {
                TransportError::Unsupported(format!(
                    "BETWEEN on '{}' needs two operands",
                    condition.attribute
                ))
            })?;
            compare(value, first)?.is_ge() && compare(value, high)?.is_le()
        }
        Comparison::BeginsWith => match (value, first) {
            (WireValue::S(text), WireValue::S(prefix)) => text.starts_with(prefix.as_str()),
            _ => false,
        },
        Comparison::Contains => contains(value, first),
        Comparison::In => operands.iter().any(|operand| operand == value),
    })
}

/// Orders two wire values of the same scalar tag; numbers numerically,
/// strings lexicographically
fn compare(left: &WireValue, right: &WireValue) -> TransportResult<std::cmp::Ordering> {
    match (left, right) {
        (WireValue::N(_), WireValue::N(_)) => {
            let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) else {
                return Err(TransportError::MalformedRecord(
                    "non-decimal N payload".to_string(),
                ));
            };
            l.partial_cmp(&r).ok_or_else(|| {
                TransportError::MalformedRecord("unordered N payload".to_string())
            })
        }
        (WireValue::S(l), WireValue::S(r)) => Ok(l.cmp(r)),
        (l, r) => Err(TransportError::Unsupported(format!(
            "cannot order {} against {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn contains(value: &WireValue, operand: &WireValue) -> bool {
    match value {
        WireValue::S(text) => match operand {
            WireValue::S(needle) => text.contains(needle.as_str()),
            _ => false,
        },
        WireValue::L(items) => items.contains(operand),
        WireValue::SS(set) => matches!(operand, WireValue::S(s) if set.contains(s)),
        WireValue::NS(set) => matches!(operand, WireValue::N(n) if set.contains(n)),
        WireValue::BS(set) => matches!(operand, WireValue::B(b) if set.contains(b)),
        _ => false,
    }
}
