//! Deterministic query planning
//!
//! Given a condition set and a schema, select the access path: the
//! table's own key schema, or a declared secondary index. Selection is
//! deterministic and order-dependent: the table key is considered first,
//! then indexes in declaration order, and the first satisfying path
//! wins. There is no scan fallback; a query no key can serve is an
//! error, not a silent full read.

pub mod condition;
pub mod errors;

pub use condition::{Comparison, Condition, ConditionSet};
pub use errors::{PlannerError, PlannerErrorCode, PlannerResult};

use std::sync::Arc;

use crate::observability::{null_sink, Event, EventSink};
use crate::schema::{IndexDescriptor, KeySchema, Schema};

/// The access path selected for a query
#[derive(Debug, Clone, PartialEq)]
pub enum AccessPath {
    /// The table's own key schema
    Table(KeySchema),
    /// A declared secondary index
    Index(IndexDescriptor),
}

impl AccessPath {
    /// Returns the key schema the path reads through
    pub fn key_schema(&self) -> KeySchema {
        match self {
            AccessPath::Table(key) => key.clone(),
            AccessPath::Index(index) => index.key_schema(),
        }
    }

    /// Returns a diagnostic name for the path
    pub fn name(&self) -> &str {
        match self {
            AccessPath::Table(_) => "table",
            AccessPath::Index(index) => index.name.as_deref().unwrap_or("unnamed-index"),
        }
    }

    /// True iff the path returns partial, keys-only records
    pub fn keys_only(&self) -> bool {
        match self {
            AccessPath::Table(_) => false,
            AccessPath::Index(index) => !index.project,
        }
    }
}

/// Selects access paths for queries against one schema
#[derive(Clone)]
pub struct QueryPlanner {
    sink: Arc<dyn EventSink>,
}

impl Default for QueryPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryPlanner {
    /// Creates a planner with no event sink
    pub fn new() -> Self {
        Self { sink: null_sink() }
    }

    /// Attaches an event sink
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Decides whether a key schema can serve the key conditions.
    ///
    /// The hash key needs exactly one equality condition. Every other
    /// key condition must target the schema's range key; at most one,
    /// and only with a comparator a sorted key serves.
    pub fn can_use_key_schema(&self, key: &KeySchema, conditions: &ConditionSet) -> bool {
        let Some(hash_condition) = conditions.key_condition_for(&key.hash_key) else {
            return false;
        };
        if hash_condition.comparison != Comparison::Eq {
            return false;
        }

        let others: Vec<_> = conditions
            .key_conditions()
            .iter()
            .filter(|condition| condition.attribute != key.hash_key)
            .collect();
        match others.as_slice() {
            [] => true,
            [range_condition] => match &key.range_key {
                Some(range_key) => {
                    range_condition.attribute == *range_key
                        && range_condition.comparison.range_eligible()
                }
                None => false,
            },
            _ => false,
        }
    }

    /// Selects the access path for the given conditions.
    ///
    /// Table key first, then indexes in declaration order; the first
    /// satisfying path wins, so planning is reproducible for a given
    /// schema and condition set.
    pub fn select_access_path(
        &self,
        schema: &Schema,
        conditions: &ConditionSet,
    ) -> PlannerResult<AccessPath> {
        if self.can_use_key_schema(schema.key(), conditions) {
            let path = AccessPath::Table(schema.key().clone());
            self.sink
                .emit(Event::IndexSelected, &[("access_path", path.name())]);
            return Ok(path);
        }

        for index in schema.indexes() {
            if self.can_use_key_schema(&index.key_schema(), conditions) {
                let path = AccessPath::Index(index.clone());
                self.sink
                    .emit(Event::IndexSelected, &[("access_path", path.name())]);
                return Ok(path);
            }
        }

        let attributes: Vec<&str> = conditions
            .key_conditions()
            .iter()
            .map(|condition| condition.attribute.as_str())
            .collect();
        self.sink.emit(
            Event::QueryRejected,
            &[("key_attributes", &attributes.join(","))],
        );
        Err(PlannerError::no_access_path(format!(
            "no table key or index serves key conditions on [{}]",
            attributes.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttributeDef;
    use crate::wire::WireValue;

    fn schema() -> Schema {
        Schema::builder("id")
            .attribute("id", AttributeDef::required_string())
            .attribute("ts", AttributeDef::required_number())
            .attribute("name", AttributeDef::optional_string())
            .attribute("score", AttributeDef::optional_number())
            .range_key("ts")
            .index(
                IndexDescriptor::on("name")
                    .with_range("score")
                    .named("name-score-index"),
            )
            .index(IndexDescriptor::on("name").named("name-index"))
            .build()
            .unwrap()
    }

    fn eq(attribute: &str) -> Condition {
        Condition::eq(attribute, WireValue::S("x".into()))
    }

    #[test]
    fn test_hash_eq_alone_uses_table() {
        let planner = QueryPlanner::new();
        let conditions = ConditionSet::new().key(eq("id")).unwrap();
        let path = planner.select_access_path(&schema(), &conditions).unwrap();
        assert_eq!(path.name(), "table");
    }

    #[test]
    fn test_hash_eq_with_range_comparators() {
        let planner = QueryPlanner::new();
        let schema = schema();
        let range_conditions = [
            Condition::eq("ts", WireValue::N("1".into())),
            Condition::lt("ts", WireValue::N("9".into())),
            Condition::le("ts", WireValue::N("9".into())),
            Condition::gt("ts", WireValue::N("1".into())),
            Condition::ge("ts", WireValue::N("1".into())),
            Condition::between("ts", WireValue::N("1".into()), WireValue::N("9".into())),
            Condition::begins_with("ts", WireValue::S("2024".into())),
        ];
        for range in range_conditions {
            let conditions = ConditionSet::new()
                .key(eq("id"))
                .unwrap()
                .key(range)
                .unwrap();
            let path = planner.select_access_path(&schema, &conditions).unwrap();
            assert_eq!(path.name(), "table");
        }
    }

    #[test]
    fn test_hash_key_requires_equality() {
        let planner = QueryPlanner::new();
        let conditions = ConditionSet::new()
            .key(Condition::gt("id", WireValue::S("a".into())))
            .unwrap();
        let err = planner
            .select_access_path(&schema(), &conditions)
            .unwrap_err();
        assert_eq!(err.code(), PlannerErrorCode::NoAccessPath);
    }

    #[test]
    fn test_range_condition_alone_is_rejected() {
        let planner = QueryPlanner::new();
        let conditions = ConditionSet::new()
            .key(Condition::gt("ts", WireValue::N("1".into())))
            .unwrap();
        assert!(planner.select_access_path(&schema(), &conditions).is_err());
    }

    #[test]
    fn test_condition_on_non_key_disqualifies_path() {
        // score is the index range key, not the table's; the table key
        // cannot serve it, so the declared index wins
        let planner = QueryPlanner::new();
        let conditions = ConditionSet::new()
            .key(eq("name"))
            .unwrap()
            .key(Condition::gt("score", WireValue::N("10".into())))
            .unwrap();
        let path = planner.select_access_path(&schema(), &conditions).unwrap();
        assert_eq!(path.name(), "name-score-index");
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        // Both indexes can serve a bare name equality; the first
        // declared one wins
        let planner = QueryPlanner::new();
        let conditions = ConditionSet::new().key(eq("name")).unwrap();
        let path = planner.select_access_path(&schema(), &conditions).unwrap();
        assert_eq!(path.name(), "name-score-index");
    }

    #[test]
    fn test_table_preferred_over_indexes() {
        let planner = QueryPlanner::new();
        let conditions = ConditionSet::new()
            .key(eq("id"))
            .unwrap()
            .key(Condition::ge("ts", WireValue::N("0".into())))
            .unwrap();
        let path = planner.select_access_path(&schema(), &conditions).unwrap();
        assert!(matches!(path, AccessPath::Table(_)));
    }

    #[test]
    fn test_no_access_path_is_an_error_not_a_scan() {
        let planner = QueryPlanner::new();
        let conditions = ConditionSet::new().key(eq("score")).unwrap();
        let err = planner
            .select_access_path(&schema(), &conditions)
            .unwrap_err();
        assert_eq!(err.code(), PlannerErrorCode::NoAccessPath);
        assert!(err.message().contains("score"));
    }

    #[test]
    fn test_filters_do_not_affect_selection() {
        let planner = QueryPlanner::new();
        let conditions = ConditionSet::new()
            .key(eq("id"))
            .unwrap()
            .filter(Condition::gt("score", WireValue::N("10".into())));
        let path = planner.select_access_path(&schema(), &conditions).unwrap();
        assert_eq!(path.name(), "table");
    }

    #[test]
    fn test_keys_only_flag_surfaces() {
        let keys_only = AccessPath::Index(IndexDescriptor::on("name").keys_only());
        assert!(keys_only.keys_only());
        let projected = AccessPath::Index(IndexDescriptor::on("name"));
        assert!(!projected.keys_only());
        assert!(!AccessPath::Table(KeySchema::hash("id")).keys_only());
    }
}
