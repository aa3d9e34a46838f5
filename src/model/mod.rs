//! The model: schema, conformance, planning, and transport glued into
//! document-level operations
//!
//! A [`Model`] binds one schema to one table on one transport. `save`
//! conforms the document and writes it; `get` reads by key and restores;
//! `query` plans an access path, reads through it, and restores each
//! record. A query served by a keys-only index returns partial records,
//! so the model fetches the full record for each hit and reconciles the
//! two by object combination before restoring.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::conform::{ConformOptions, ConformancePipeline};
use crate::merge::{combine_objects, MergeError};
use crate::observability::{null_sink, Event, EventSink};
use crate::planner::{ConditionSet, PlannerError, QueryPlanner};
use crate::schema::{Schema, SchemaError};
use crate::transport::{TransportClient, TransportError};
use crate::wire::{WireRecord, WireValue};

/// Errors surfaced by model operations
#[derive(Debug, Error)]
pub enum ModelError {
    /// Conformance or schema failure
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// Query planning failure
    #[error(transparent)]
    Planner(#[from] PlannerError),
    /// Store communication failure
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Keys-only reconciliation failure
    #[error(transparent)]
    Merge(#[from] MergeError),
    /// The key document is missing a key attribute
    #[error("key document is missing attribute '{0}'")]
    IncompleteKey(String),
}

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// One table's document model
pub struct Model<C: TransportClient> {
    name: String,
    schema: Arc<Schema>,
    pipeline: ConformancePipeline,
    planner: QueryPlanner,
    client: Arc<C>,
    sink: Arc<dyn EventSink>,
}

impl<C: TransportClient> Model<C> {
    /// Binds a schema to a table on the given transport
    pub fn new(name: impl Into<String>, schema: Schema, client: Arc<C>) -> Self {
        let schema = Arc::new(schema);
        Self {
            name: name.into(),
            pipeline: ConformancePipeline::new(Arc::clone(&schema)),
            planner: QueryPlanner::new(),
            schema,
            client,
            sink: null_sink(),
        }
    }

    /// Attaches an event sink to the model and its stages
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.pipeline = ConformancePipeline::new(Arc::clone(&self.schema))
            .with_sink(Arc::clone(&sink));
        self.planner = QueryPlanner::new().with_sink(Arc::clone(&sink));
        self.sink = sink;
        self
    }

    /// Returns the table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the bound schema
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the conformance pipeline, for direct use
    pub fn pipeline(&self) -> &ConformancePipeline {
        &self.pipeline
    }

    /// Conforms and writes a document
    pub async fn save(&self, document: &Value) -> ModelResult<()> {
        self.sink.emit(Event::SaveBegin, &[("table", &self.name)]);
        let record = self
            .pipeline
            .to_store(document, &ConformOptions::default())
            .await?;
        self.client.put_record(&self.name, record).await?;
        self.sink.emit(Event::SaveComplete, &[("table", &self.name)]);
        Ok(())
    }

    /// Conforms and writes a document, writing applied defaults back
    /// into the caller's copy
    pub async fn save_in_place(&self, document: &mut Value) -> ModelResult<()> {
        self.sink.emit(Event::SaveBegin, &[("table", &self.name)]);
        let record = self
            .pipeline
            .to_store_in_place(document, &ConformOptions::default())
            .await?;
        self.client.put_record(&self.name, record).await?;
        self.sink.emit(Event::SaveComplete, &[("table", &self.name)]);
        Ok(())
    }

    /// Reads one document by its key attributes.
    ///
    /// The key document needs every key attribute of the table; extra
    /// attributes are ignored.
    pub async fn get(&self, key: &Value) -> ModelResult<Option<Value>> {
        self.sink.emit(Event::GetBegin, &[("table", &self.name)]);
        let key_record = self.key_record(key)?;
        let found = self.client.get_record(&self.name, &key_record).await?;
        let document = match found {
            Some(record) => Some(self.pipeline.from_store(&record)?),
            None => None,
        };
        self.sink.emit(
            Event::GetComplete,
            &[
                ("found", if document.is_some() { "true" } else { "false" }),
                ("table", &self.name),
            ],
        );
        Ok(document)
    }

    /// Plans and runs a query, restoring each record.
    ///
    /// When the selected access path is a keys-only index, each hit is a
    /// partial record; the model fetches the full record by key and
    /// combines the two before restoring.
    pub async fn query(&self, conditions: &ConditionSet) -> ModelResult<Vec<Value>> {
        self.sink.emit(Event::QueryBegin, &[("table", &self.name)]);
        let path = self.planner.select_access_path(&self.schema, conditions)?;

        let projection = path.keys_only().then(|| self.keys_only_projection(&path));
        let records = self
            .client
            .query(&self.name, conditions, projection.as_deref())
            .await?;

        let mut documents = Vec::with_capacity(records.len());
        for record in records {
            let document = if path.keys_only() {
                self.reconcile_partial(&record).await?
            } else {
                self.pipeline.from_store(&record)?
            };
            documents.push(document);
        }
        self.sink.emit(
            Event::QueryComplete,
            &[
                ("access_path", path.name()),
                ("results", &documents.len().to_string()),
                ("table", &self.name),
            ],
        );
        Ok(documents)
    }

    /// Attributes a keys-only index returns: table key plus index key
    fn keys_only_projection(&self, path: &crate::planner::AccessPath) -> Vec<String> {
        let table_key = self.schema.key();
        let index_key = path.key_schema();
        let mut attributes = vec![table_key.hash_key.clone()];
        if let Some(range) = &table_key.range_key {
            attributes.push(range.clone());
        }
        for name in [Some(&index_key.hash_key), index_key.range_key.as_ref()]
            .into_iter()
            .flatten()
        {
            if !attributes.iter().any(|a| a == name) {
                attributes.push(name.clone());
            }
        }
        attributes
    }

    /// Fetches the full record behind a partial keys-only hit and
    /// combines the two; index attributes survive only where the full
    /// record lacks them
    async fn reconcile_partial(&self, partial: &WireRecord) -> ModelResult<Value> {
        let key_record = self.key_record_from_wire(partial)?;
        let full = self.client.get_record(&self.name, &key_record).await?;
        let mut partial_document = self.pipeline.from_store(partial)?;
        match full {
            Some(record) => {
                let full_document = self.pipeline.from_store(&record)?;
                // Attributes present on both sides belong to the full
                // record; dropping them first keeps the combine a pure
                // union
                if let (Some(partial_map), Some(full_map)) =
                    (partial_document.as_object_mut(), full_document.as_object())
                {
                    partial_map.retain(|name, _| !full_map.contains_key(name));
                }
                Ok(combine_objects(&partial_document, &full_document)?)
            }
            // The base record vanished between the index read and the
            // follow-up fetch; the partial view is all there is
            None => Ok(partial_document),
        }
    }

    /// Extracts the table key attributes from an application document
    fn key_record(&self, document: &Value) -> ModelResult<WireRecord> {
        let key = self.schema.key();
        let mut record = WireRecord::new();
        for attribute in
            std::iter::once(&key.hash_key).chain(key.range_key.as_ref())
        {
            let value = document
                .get(attribute)
                .ok_or_else(|| ModelError::IncompleteKey(attribute.clone()))?;
            record.insert(attribute.clone(), WireValue::infer(value));
        }
        Ok(record)
    }

    /// Extracts the table key attributes from a wire record
    fn key_record_from_wire(&self, record: &WireRecord) -> ModelResult<WireRecord> {
        let key = self.schema.key();
        let mut out = WireRecord::new();
        for attribute in
            std::iter::once(&key.hash_key).chain(key.range_key.as_ref())
        {
            let value = record
                .get(attribute)
                .ok_or_else(|| ModelError::IncompleteKey(attribute.clone()))?;
            out.insert(attribute.clone(), value.clone());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::Condition;
    use crate::schema::{AttributeDef, IndexDescriptor};
    use crate::transport::MemoryTransport;
    use serde_json::json;

    fn user_model() -> Model<MemoryTransport> {
        let schema = Schema::builder("id")
            .attribute("id", AttributeDef::required_string())
            .attribute("name", AttributeDef::optional_string())
            .attribute("age", AttributeDef::optional_number())
            .index(IndexDescriptor::on("name").named("name-index").keys_only())
            .build()
            .unwrap();
        let transport = Arc::new(MemoryTransport::new());
        transport.register_table("users", schema.key().clone());
        Model::new("users", schema, transport)
    }

    #[tokio::test]
    async fn test_save_then_get_round_trip() {
        let model = user_model();
        model
            .save(&json!({"id": "u1", "name": "Alice", "age": 30}))
            .await
            .unwrap();

        let found = model.get(&json!({"id": "u1"})).await.unwrap();
        assert_eq!(found, Some(json!({"id": "u1", "name": "Alice", "age": 30})));
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let model = user_model();
        assert_eq!(model.get(&json!({"id": "ghost"})).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_requires_full_key() {
        let model = user_model();
        let err = model.get(&json!({"name": "Alice"})).await.unwrap_err();
        assert!(matches!(err, ModelError::IncompleteKey(attr) if attr == "id"));
    }

    #[tokio::test]
    async fn test_save_rejects_nonconforming_document() {
        let model = user_model();
        let err = model.save(&json!({"name": "no-key"})).await.unwrap_err();
        assert!(matches!(err, ModelError::Schema(_)));
    }

    #[tokio::test]
    async fn test_query_by_table_key() {
        let model = user_model();
        model.save(&json!({"id": "u1", "age": 30})).await.unwrap();
        model.save(&json!({"id": "u2", "age": 40})).await.unwrap();

        let conditions = ConditionSet::new()
            .key(Condition::eq("id", WireValue::S("u1".into())))
            .unwrap();
        let results = model.query(&conditions).await.unwrap();
        assert_eq!(results, vec![json!({"id": "u1", "age": 30})]);
    }

    #[tokio::test]
    async fn test_query_without_access_path_fails() {
        let model = user_model();
        let conditions = ConditionSet::new()
            .key(Condition::eq("age", WireValue::N("30".into())))
            .unwrap();
        let err = model.query(&conditions).await.unwrap_err();
        assert!(matches!(err, ModelError::Planner(_)));
    }

    #[tokio::test]
    async fn test_keys_only_query_reconciles_full_record() {
        let model = user_model();
        model
            .save(&json!({"id": "u1", "name": "Alice", "age": 30}))
            .await
            .unwrap();

        // name-index is keys-only; age only exists on the base record
        let conditions = ConditionSet::new()
            .key(Condition::eq("name", WireValue::S("Alice".into())))
            .unwrap();
        let results = model.query(&conditions).await.unwrap();
        assert_eq!(
            results,
            vec![json!({"id": "u1", "name": "Alice", "age": 30})]
        );
    }
}
