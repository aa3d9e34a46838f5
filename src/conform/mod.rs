//! Bidirectional document conformance
//!
//! `to_store` takes an application document and produces a wire-ready
//! record; `from_store` reverses it. Conformance runs as an explicit
//! three-phase pipeline:
//!
//! 1. synchronous structural resolution - which declared paths are
//!    present, which types match, which defaults apply, which undeclared
//!    paths the save-unknown policy admits - producing a plan;
//! 2. an awaited batch of default/validator calls (defaults and
//!    validators may suspend; independent attributes resolve
//!    concurrently, and assembly is deterministic regardless of
//!    completion order);
//! 3. synchronous assembly of the nested wire record.
//!
//! Failure is atomic: if any default or validator fails, no partially
//! conformed record is produced. The caller's document is never mutated;
//! [`ConformancePipeline::to_store_in_place`] is the explicit opt-in that
//! also writes applied defaults back into the caller's copy.

use futures_util::future::join_all;
use futures_util::FutureExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::observability::{null_sink, Event, EventSink};
use crate::path::AttributePath;
use crate::schema::{
    DefaultValue, Schema, SchemaError, SchemaResult, SetKind, TypeDetail, TypeResolver,
};
use crate::wire::{WireRecord, WireValue};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Options controlling one conformance run
#[derive(Debug, Clone)]
pub struct ConformOptions {
    /// Apply declared defaults for absent attributes
    pub apply_defaults: bool,
    /// Run declared validators against conformed values
    pub run_validators: bool,
}

impl Default for ConformOptions {
    fn default() -> Self {
        Self {
            apply_defaults: true,
            run_validators: true,
        }
    }
}

/// Structural plan entry produced by phase 1
#[derive(Debug)]
enum PlanItem {
    /// A declared map/list node; children follow in plan order
    Container {
        doc_path: AttributePath,
        kind: ContainerKind,
    },
    /// A declared leaf with its resolved type, transform pending
    Leaf {
        doc_path: AttributePath,
        schema_path: String,
        detail: TypeDetail,
        value: Value,
    },
    /// An undeclared subtree admitted by the save-unknown policy
    Unknown {
        doc_path: AttributePath,
        value: Value,
    },
    /// An absent attribute whose default resolves in phase 2
    Defaulted {
        doc_path: AttributePath,
        schema_path: String,
        default: DefaultValue,
    },
}

#[derive(Debug, Clone, Copy)]
enum ContainerKind {
    Map,
    List,
}

/// One declared attribute after presence and type resolution, before
/// the descent into its children
enum Resolved<'a> {
    /// Absent with a default pending
    Defaulted {
        doc_path: AttributePath,
        schema_path: String,
        default: DefaultValue,
    },
    /// Present with its authoritative type
    Value {
        schema_path: AttributePath,
        doc_path: AttributePath,
        detail: TypeDetail,
        value: &'a Value,
    },
}

/// Plan entry with all values known, ready for assembly
#[derive(Debug)]
enum ReadyItem {
    Container {
        doc_path: AttributePath,
        kind: ContainerKind,
    },
    Leaf {
        doc_path: AttributePath,
        schema_path: String,
        detail: TypeDetail,
        value: Value,
    },
    Unknown {
        doc_path: AttributePath,
        value: Value,
    },
}

/// The bidirectional conformance pipeline for one schema
#[derive(Clone)]
pub struct ConformancePipeline {
    schema: Arc<Schema>,
    sink: Arc<dyn EventSink>,
}

impl ConformancePipeline {
    /// Creates a pipeline with no event sink
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            sink: null_sink(),
        }
    }

    /// Attaches an event sink; notifications are fire-and-forget
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the schema this pipeline conforms against
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Conforms a document into a wire-ready record.
    ///
    /// The input document is not mutated.
    pub async fn to_store(
        &self,
        document: &Value,
        options: &ConformOptions,
    ) -> SchemaResult<WireRecord> {
        let (record, _defaults) = self.conform_inner(document, options).await.map_err(|e| {
            self.sink
                .emit(Event::DocumentRejected, &[("code", e.code().code())]);
            e
        })?;
        Ok(record)
    }

    /// Conforms a document and writes applied defaults back into it.
    ///
    /// The explicit opt-in for in-place conformance; `to_store` is the
    /// non-mutating default.
    pub async fn to_store_in_place(
        &self,
        document: &mut Value,
        options: &ConformOptions,
    ) -> SchemaResult<WireRecord> {
        let (record, defaults) = self.conform_inner(document, options).await.map_err(|e| {
            self.sink
                .emit(Event::DocumentRejected, &[("code", e.code().code())]);
            e
        })?;
        for (path, value) in defaults {
            write_default(document, &path, value);
        }
        Ok(record)
    }

    async fn conform_inner(
        &self,
        document: &Value,
        options: &ConformOptions,
    ) -> SchemaResult<(WireRecord, Vec<(AttributePath, Value)>)> {
        // Phase 1: synchronous structural resolution
        let plan = self.plan_document(document, options)?;

        // Phase 2a: awaited batch of default resolutions
        let (items, applied_defaults) = self.resolve_defaults(plan).await?;

        // Phase 2b: awaited batch of validators over the final values
        if options.run_validators {
            self.run_validators(&items).await?;
        }

        // Phase 3: synchronous assembly
        let record = self.assemble(items)?;
        self.sink.emit(
            Event::DocumentConformed,
            &[("attributes", &record.len().to_string())],
        );
        Ok((record, applied_defaults))
    }

    fn plan_document(
        &self,
        document: &Value,
        options: &ConformOptions,
    ) -> SchemaResult<Vec<PlanItem>> {
        let root = document.as_object().ok_or_else(|| {
            SchemaError::type_mismatch("$root", shape_name(document), "map")
        })?;

        // Every top-level attribute resolves (presence, required, type)
        // before any descent into nested children, so key attributes
        // fail fast regardless of declaration position
        let mut resolved_top = Vec::new();
        for entry in self.schema.top_level_entries() {
            if let Some(resolved) = self.resolve_attribute(
                &entry.path,
                &entry.path,
                root.get(entry.path.head()),
                options,
            )? {
                resolved_top.push(resolved);
            }
        }

        let mut items = Vec::new();
        for resolved in resolved_top {
            self.descend(resolved, options, &mut items)?;
        }
        // Then undeclared top-level paths, against the policy
        for (key, value) in root {
            if !self.schema.declares(key) {
                let doc_path = AttributePath::from_segments(vec![key.clone()]);
                self.plan_unknown(doc_path, value, &mut items)?;
            }
        }
        Ok(items)
    }

    fn plan_attribute(
        &self,
        schema_path: &AttributePath,
        doc_path: &AttributePath,
        value: Option<&Value>,
        options: &ConformOptions,
        items: &mut Vec<PlanItem>,
    ) -> SchemaResult<()> {
        if let Some(resolved) = self.resolve_attribute(schema_path, doc_path, value, options)? {
            self.descend(resolved, options, items)?;
        }
        Ok(())
    }

    /// Resolves one declared attribute's presence and type without
    /// descending into its children
    fn resolve_attribute<'a>(
        &self,
        schema_path: &AttributePath,
        doc_path: &AttributePath,
        value: Option<&'a Value>,
        options: &ConformOptions,
    ) -> SchemaResult<Option<Resolved<'a>>> {
        let dotted = schema_path.dotted();
        let def = self
            .schema
            .get(&dotted)
            .ok_or_else(|| SchemaError::invalid(format!("undeclared path '{}'", dotted)))?;

        let Some(value) = value else {
            if options.apply_defaults {
                if let Some(default) = &def.default {
                    return Ok(Some(Resolved::Defaulted {
                        doc_path: doc_path.clone(),
                        schema_path: dotted,
                        default: default.clone(),
                    }));
                }
            }
            if def.required {
                return Err(SchemaError::missing_required(doc_path.dotted()));
            }
            return Ok(None);
        };

        let resolver = TypeResolver::new(&self.schema);
        let resolution = resolver
            .resolve(&dotted, value)
            .ok_or_else(|| SchemaError::invalid(format!("undeclared path '{}'", dotted)))?;
        let Some(detail) = resolution.matched().cloned() else {
            return Err(SchemaError::type_mismatch(
                doc_path.dotted(),
                shape_name(value),
                def.declared_names(),
            ));
        };
        self.sink.emit(
            Event::AttributeResolved,
            &[("path", &doc_path.dotted()), ("type", &detail.type_name())],
        );
        Ok(Some(Resolved::Value {
            schema_path: schema_path.clone(),
            doc_path: doc_path.clone(),
            detail,
            value,
        }))
    }

    /// Emits plan items for one resolved attribute, descending into
    /// declared children
    fn descend(
        &self,
        resolved: Resolved<'_>,
        options: &ConformOptions,
        items: &mut Vec<PlanItem>,
    ) -> SchemaResult<()> {
        let (schema_path, doc_path, detail, value) = match resolved {
            Resolved::Defaulted {
                doc_path,
                schema_path,
                default,
            } => {
                items.push(PlanItem::Defaulted {
                    doc_path,
                    schema_path,
                    default,
                });
                return Ok(());
            }
            Resolved::Value {
                schema_path,
                doc_path,
                detail,
                value,
            } => (schema_path, doc_path, detail, value),
        };

        match detail {
            TypeDetail::Map => {
                items.push(PlanItem::Container {
                    doc_path: doc_path.clone(),
                    kind: ContainerKind::Map,
                });
                // Predicate guarantees an object here
                let object = value.as_object().ok_or_else(|| {
                    SchemaError::type_mismatch(doc_path.dotted(), shape_name(value), "map")
                })?;
                for child in self.schema.children_of(&schema_path) {
                    let leaf = child.path.leaf();
                    self.plan_attribute(
                        &child.path,
                        &doc_path.child(leaf),
                        object.get(leaf),
                        options,
                        items,
                    )?;
                }
                for (key, child_value) in object {
                    if !self.schema.declares(&schema_path.child(key).dotted()) {
                        self.plan_unknown(doc_path.child(key), child_value, items)?;
                    }
                }
            }
            TypeDetail::List => {
                items.push(PlanItem::Container {
                    doc_path: doc_path.clone(),
                    kind: ContainerKind::List,
                });
                let array = value.as_array().ok_or_else(|| {
                    SchemaError::type_mismatch(doc_path.dotted(), shape_name(value), "list")
                })?;
                let element_path = schema_path.child("0");
                let element_declared = self.schema.declares(&element_path.dotted());
                for (i, element) in array.iter().enumerate() {
                    let element_doc_path = doc_path.child(&i.to_string());
                    if element_declared {
                        self.plan_attribute(
                            &element_path,
                            &element_doc_path,
                            Some(element),
                            options,
                            items,
                        )?;
                    } else {
                        // A declared list with no element declaration
                        // admits its content as-is
                        items.push(PlanItem::Unknown {
                            doc_path: element_doc_path,
                            value: element.clone(),
                        });
                    }
                }
            }
            detail => {
                items.push(PlanItem::Leaf {
                    doc_path,
                    schema_path: schema_path.dotted(),
                    detail,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    /// Plans an undeclared subtree. The policy is consulted per path:
    /// a pattern admitting a container does not by itself admit the
    /// container's children, so each level recurses through the policy.
    fn plan_unknown(
        &self,
        doc_path: AttributePath,
        value: &Value,
        items: &mut Vec<PlanItem>,
    ) -> SchemaResult<()> {
        if !self.schema.unknown_allowed(&doc_path) {
            return Err(SchemaError::unknown_attribute(doc_path.dotted()));
        }
        match value {
            Value::Object(object) => {
                items.push(PlanItem::Container {
                    doc_path: doc_path.clone(),
                    kind: ContainerKind::Map,
                });
                for (key, child) in object {
                    self.plan_unknown(doc_path.child(key), child, items)?;
                }
            }
            Value::Array(array) => {
                items.push(PlanItem::Container {
                    doc_path: doc_path.clone(),
                    kind: ContainerKind::List,
                });
                for (i, element) in array.iter().enumerate() {
                    self.plan_unknown(doc_path.child(&i.to_string()), element, items)?;
                }
            }
            _ => {
                items.push(PlanItem::Unknown {
                    doc_path,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    /// Awaits all planned defaults concurrently, then re-plans each
    /// resolved value so compound defaults conform structurally too.
    async fn resolve_defaults(
        &self,
        plan: Vec<PlanItem>,
    ) -> SchemaResult<(Vec<ReadyItem>, Vec<(AttributePath, Value)>)> {
        let mut pending = Vec::new();
        for (index, item) in plan.iter().enumerate() {
            if let PlanItem::Defaulted { default, .. } = item {
                pending.push(default.resolve().map(move |result| (index, result)));
            }
        }
        let mut resolved: BTreeMap<usize, Value> = BTreeMap::new();
        for (index, result) in join_all(pending).await {
            resolved.insert(index, result?);
        }

        let no_defaults = ConformOptions {
            apply_defaults: false,
            run_validators: false,
        };
        let mut items = Vec::with_capacity(plan.len());
        let mut applied = Vec::new();
        for (index, item) in plan.into_iter().enumerate() {
            match item {
                PlanItem::Container { doc_path, kind } => {
                    items.push(ReadyItem::Container { doc_path, kind });
                }
                PlanItem::Leaf {
                    doc_path,
                    schema_path,
                    detail,
                    value,
                } => {
                    items.push(ReadyItem::Leaf {
                        doc_path,
                        schema_path,
                        detail,
                        value,
                    });
                }
                PlanItem::Unknown { doc_path, value } => {
                    items.push(ReadyItem::Unknown { doc_path, value });
                }
                PlanItem::Defaulted {
                    doc_path,
                    schema_path,
                    ..
                } => {
                    // join_all returned every index; this lookup cannot miss
                    let value = resolved.remove(&index).ok_or_else(|| {
                        SchemaError::invalid(format!("default for '{}' did not resolve", doc_path))
                    })?;
                    let mut sub_items = Vec::new();
                    self.plan_attribute(
                        &AttributePath::parse(&schema_path),
                        &doc_path,
                        Some(&value),
                        &no_defaults,
                        &mut sub_items,
                    )?;
                    for sub in self.finalize_sub_items(sub_items)? {
                        items.push(sub);
                    }
                    applied.push((doc_path, value));
                }
            }
        }
        Ok((items, applied))
    }

    /// Converts sub-plan items for a resolved default; defaults were
    /// disabled for the sub-plan, so no `Defaulted` item can appear
    fn finalize_sub_items(&self, sub_items: Vec<PlanItem>) -> SchemaResult<Vec<ReadyItem>> {
        sub_items
            .into_iter()
            .map(|item| match item {
                PlanItem::Container { doc_path, kind } => Ok(ReadyItem::Container { doc_path, kind }),
                PlanItem::Leaf {
                    doc_path,
                    schema_path,
                    detail,
                    value,
                } => Ok(ReadyItem::Leaf {
                    doc_path,
                    schema_path,
                    detail,
                    value,
                }),
                PlanItem::Unknown { doc_path, value } => Ok(ReadyItem::Unknown { doc_path, value }),
                PlanItem::Defaulted { doc_path, .. } => Err(SchemaError::invalid(format!(
                    "nested default under defaulted '{}'",
                    doc_path
                ))),
            })
            .collect()
    }

    /// Awaits every declared validator concurrently; any rejection fails
    /// the whole conformance
    async fn run_validators(&self, items: &[ReadyItem]) -> SchemaResult<()> {
        let mut pending = Vec::new();
        for item in items {
            let ReadyItem::Leaf {
                doc_path,
                schema_path,
                value,
                ..
            } = item
            else {
                continue;
            };
            let Some(def) = self.schema.get(schema_path) else {
                continue;
            };
            if let Some(validator) = &def.validator {
                let path = doc_path.dotted();
                pending.push(validator(value).map(move |result| (path, result)));
            }
        }
        for (path, result) in join_all(pending).await {
            result.map_err(|reason| SchemaError::validator_rejected(path, reason))?;
        }
        Ok(())
    }

    fn assemble(&self, items: Vec<ReadyItem>) -> SchemaResult<WireRecord> {
        let mut root = WireValue::M(BTreeMap::new());
        for item in items {
            match item {
                ReadyItem::Container { doc_path, kind } => {
                    let container = match kind {
                        ContainerKind::Map => WireValue::M(BTreeMap::new()),
                        ContainerKind::List => WireValue::L(Vec::new()),
                    };
                    insert_wire(&mut root, &doc_path, container)?;
                }
                ReadyItem::Leaf {
                    doc_path,
                    detail,
                    value,
                    ..
                } => {
                    let wire = forward_transform(&detail, &value, &doc_path, &self.schema)?;
                    insert_wire(&mut root, &doc_path, wire)?;
                }
                ReadyItem::Unknown { doc_path, value } => {
                    insert_wire(&mut root, &doc_path, WireValue::infer(&value))?;
                }
            }
        }
        match root {
            WireValue::M(map) => Ok(map),
            _ => Err(SchemaError::invalid("conformance produced a non-map root")),
        }
    }

    /// Restores a stored record to its application shape.
    ///
    /// Resolution is driven by the wire value's tag. Undeclared
    /// attributes the save-unknown policy admits come back in their
    /// natural JSON shape; other undeclared attributes are dropped
    /// (stored data may predate the schema).
    pub fn from_store(&self, record: &WireRecord) -> SchemaResult<Value> {
        let mut root = serde_json::Map::new();
        for (key, wire) in record {
            let path = AttributePath::from_segments(vec![key.clone()]);
            if let Some(value) = self.restore_value(&path, &path, wire)? {
                root.insert(key.clone(), value);
            }
        }
        self.sink.emit(
            Event::DocumentRestored,
            &[("attributes", &root.len().to_string())],
        );
        Ok(Value::Object(root))
    }

    fn restore_value(
        &self,
        schema_path: &AttributePath,
        doc_path: &AttributePath,
        wire: &WireValue,
    ) -> SchemaResult<Option<Value>> {
        let dotted = schema_path.dotted();
        if !self.schema.declares(&dotted) {
            return Ok(self.restore_unknown(doc_path, wire));
        }

        let resolver = TypeResolver::new(&self.schema);
        let resolution = resolver
            .resolve_wire(&dotted, wire)
            .ok_or_else(|| SchemaError::invalid(format!("undeclared path '{}'", dotted)))?;
        let Some(detail) = resolution.matched() else {
            let def = self
                .schema
                .get(&dotted)
                .ok_or_else(|| SchemaError::invalid(format!("undeclared path '{}'", dotted)))?;
            return Err(SchemaError::type_mismatch(
                doc_path.dotted(),
                wire.type_name(),
                def.declared_names(),
            ));
        };

        match detail {
            TypeDetail::Map => {
                let WireValue::M(entries) = wire else {
                    return Err(SchemaError::type_mismatch(doc_path.dotted(), wire.type_name(), "M"));
                };
                let mut object = serde_json::Map::new();
                for (key, child) in entries {
                    let child_schema = schema_path.child(key);
                    let child_doc = doc_path.child(key);
                    if let Some(value) = self.restore_value(&child_schema, &child_doc, child)? {
                        object.insert(key.clone(), value);
                    }
                }
                Ok(Some(Value::Object(object)))
            }
            TypeDetail::List => {
                let WireValue::L(elements) = wire else {
                    return Err(SchemaError::type_mismatch(doc_path.dotted(), wire.type_name(), "L"));
                };
                let element_schema = schema_path.child("0");
                let element_declared = self.schema.declares(&element_schema.dotted());
                let mut array = Vec::with_capacity(elements.len());
                for (i, element) in elements.iter().enumerate() {
                    let element_doc = doc_path.child(&i.to_string());
                    let value = if element_declared {
                        self.restore_value(&element_schema, &element_doc, element)?
                    } else {
                        Some(element.to_json())
                    };
                    if let Some(value) = value {
                        array.push(value);
                    }
                }
                Ok(Some(Value::Array(array)))
            }
            TypeDetail::Custom(name) => {
                let custom = self.schema.registry().get(name).ok_or_else(|| {
                    SchemaError::invalid(format!("unregistered custom type '{}'", name))
                })?;
                custom.apply_from_store(wire).map(Some)
            }
            _ => Ok(Some(wire.to_json())),
        }
    }

    /// Restores an undeclared subtree, consulting the policy per path
    /// and dropping what it does not admit
    fn restore_unknown(&self, doc_path: &AttributePath, wire: &WireValue) -> Option<Value> {
        if !self.schema.unknown_allowed(doc_path) {
            return None;
        }
        match wire {
            WireValue::M(entries) => Some(Value::Object(
                entries
                    .iter()
                    .filter_map(|(key, child)| {
                        self.restore_unknown(&doc_path.child(key), child)
                            .map(|value| (key.clone(), value))
                    })
                    .collect(),
            )),
            WireValue::L(elements) => Some(Value::Array(
                elements
                    .iter()
                    .enumerate()
                    .filter_map(|(i, element)| {
                        self.restore_unknown(&doc_path.child(&i.to_string()), element)
                    })
                    .collect(),
            )),
            other => Some(other.to_json()),
        }
    }
}

/// Applies the forward transform for one resolved leaf
fn forward_transform(
    detail: &TypeDetail,
    value: &Value,
    doc_path: &AttributePath,
    schema: &Schema,
) -> SchemaResult<WireValue> {
    let mismatch =
        || SchemaError::type_mismatch(doc_path.dotted(), shape_name(value), detail.type_name());
    match detail {
        TypeDetail::String => value
            .as_str()
            .map(|s| WireValue::S(s.to_string()))
            .ok_or_else(mismatch),
        TypeDetail::Number => match value {
            Value::Number(n) => Ok(WireValue::number(n)),
            _ => Err(mismatch()),
        },
        TypeDetail::Boolean => value.as_bool().map(WireValue::Bool).ok_or_else(mismatch),
        TypeDetail::Null => value
            .is_null()
            .then(|| WireValue::Null(true))
            .ok_or_else(mismatch),
        TypeDetail::Binary => {
            let text = value.as_str().ok_or_else(mismatch)?;
            let bytes = BASE64
                .decode(text)
                .map_err(|e| SchemaError::transform_failed(doc_path.dotted(), e.to_string()))?;
            Ok(WireValue::B(bytes))
        }
        TypeDetail::Set(kind) => {
            let items = value.as_array().ok_or_else(mismatch)?;
            set_transform(*kind, items, doc_path)
        }
        TypeDetail::Custom(name) => {
            let custom = schema.registry().get(name).ok_or_else(|| {
                SchemaError::invalid(format!("unregistered custom type '{}'", name))
            })?;
            custom
                .apply_to_store(value)
                .map_err(|e| SchemaError::transform_failed(doc_path.dotted(), e.message()))
        }
        TypeDetail::Map | TypeDetail::List => Err(SchemaError::invalid(format!(
            "container '{}' reached the leaf transform",
            doc_path
        ))),
    }
}

/// Builds a set wire value, deduplicating while preserving first
/// occurrence order
fn set_transform(
    kind: SetKind,
    items: &[Value],
    doc_path: &AttributePath,
) -> SchemaResult<WireValue> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    let mut bytes_out: Vec<Vec<u8>> = Vec::new();
    for item in items {
        match kind {
            SetKind::String => {
                let text = item.as_str().ok_or_else(|| {
                    SchemaError::type_mismatch(doc_path.dotted(), shape_name(item), "set<string>")
                })?;
                if !out.iter().any(|existing| existing == text) {
                    out.push(text.to_string());
                }
            }
            SetKind::Number => {
                let number = match item {
                    Value::Number(n) => n.to_string(),
                    _ => {
                        return Err(SchemaError::type_mismatch(
                            doc_path.dotted(),
                            shape_name(item),
                            "set<number>",
                        ))
                    }
                };
                if !out.contains(&number) {
                    out.push(number);
                }
            }
            SetKind::Binary => {
                let text = item.as_str().ok_or_else(|| {
                    SchemaError::type_mismatch(doc_path.dotted(), shape_name(item), "set<binary>")
                })?;
                let bytes = BASE64
                    .decode(text)
                    .map_err(|e| SchemaError::transform_failed(doc_path.dotted(), e.to_string()))?;
                if !bytes_out.contains(&bytes) {
                    bytes_out.push(bytes);
                }
            }
        }
    }
    Ok(match kind {
        SetKind::String => WireValue::SS(out),
        SetKind::Number => WireValue::NS(out),
        SetKind::Binary => WireValue::BS(bytes_out),
    })
}

/// Inserts a wire value at a nested path; parent containers exist
/// because plan order emits containers before their children
fn insert_wire(root: &mut WireValue, path: &AttributePath, value: WireValue) -> SchemaResult<()> {
    let segments = path.segments();
    let mut current = root;
    for segment in &segments[..segments.len() - 1] {
        current = match current {
            WireValue::M(map) => map.get_mut(segment.as_str()).ok_or_else(|| {
                SchemaError::invalid(format!("missing parent container at '{}'", path))
            })?,
            WireValue::L(list) => {
                let index: usize = segment.parse().map_err(|_| {
                    SchemaError::invalid(format!("non-numeric list segment in '{}'", path))
                })?;
                list.get_mut(index).ok_or_else(|| {
                    SchemaError::invalid(format!("missing list element at '{}'", path))
                })?
            }
            _ => {
                return Err(SchemaError::invalid(format!(
                    "non-container parent at '{}'",
                    path
                )))
            }
        };
    }
    let leaf = path.leaf();
    match current {
        WireValue::M(map) => {
            map.insert(leaf.to_string(), value);
        }
        WireValue::L(list) => {
            let index: usize = leaf.parse().map_err(|_| {
                SchemaError::invalid(format!("non-numeric list segment in '{}'", path))
            })?;
            if index == list.len() {
                list.push(value);
            } else if index < list.len() {
                list[index] = value;
            } else {
                return Err(SchemaError::invalid(format!(
                    "out-of-order list element at '{}'",
                    path
                )));
            }
        }
        _ => {
            return Err(SchemaError::invalid(format!(
                "non-container parent at '{}'",
                path
            )))
        }
    }
    Ok(())
}

/// Writes an applied default back into the caller's document
fn write_default(document: &mut Value, path: &AttributePath, value: Value) {
    let segments = path.segments();
    let mut current = document;
    for segment in &segments[..segments.len() - 1] {
        let Some(next) = current
            .as_object_mut()
            .map(|map| map.entry(segment.clone()).or_insert_with(|| Value::Object(Default::default())))
        else {
            return;
        };
        current = next;
    }
    if let Some(map) = current.as_object_mut() {
        map.insert(path.leaf().to_string(), value);
    }
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::wildcard::AllowList;
    use crate::schema::{AttributeDef, SchemaErrorCode};
    use serde_json::json;

    fn pipeline(schema: Schema) -> ConformancePipeline {
        ConformancePipeline::new(Arc::new(schema))
    }

    fn base_schema() -> Schema {
        Schema::builder("id")
            .attribute("id", AttributeDef::required_string())
            .attribute("age", AttributeDef::optional_number())
            .attribute("active", AttributeDef::new(TypeDetail::Boolean))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_simple_to_store() {
        let pipeline = pipeline(base_schema());
        let record = pipeline
            .to_store(
                &json!({"id": "u1", "age": 30, "active": true}),
                &ConformOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(record["id"], WireValue::S("u1".into()));
        assert_eq!(record["age"], WireValue::N("30".into()));
        assert_eq!(record["active"], WireValue::Bool(true));
    }

    #[tokio::test]
    async fn test_missing_required_fails() {
        let pipeline = pipeline(base_schema());
        let err = pipeline
            .to_store(&json!({"age": 30}), &ConformOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::ValidationFailed);
        assert_eq!(err.path(), Some("id"));
    }

    #[tokio::test]
    async fn test_top_level_attributes_fail_before_nested_children() {
        // The hash key is declared after a map with a required child;
        // its absence must still be the first error reported
        let schema = Schema::builder("id")
            .attribute("address", AttributeDef::new(TypeDetail::Map))
            .attribute("address.city", AttributeDef::required_string())
            .attribute("id", AttributeDef::required_string())
            .build()
            .unwrap();
        let pipeline = pipeline(schema);

        let err = pipeline
            .to_store(&json!({"address": {}}), &ConformOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.path(), Some("id"));

        // With the key present the nested failure surfaces normally
        let err = pipeline
            .to_store(&json!({"id": "u1", "address": {}}), &ConformOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.path(), Some("address.city"));
    }

    #[tokio::test]
    async fn test_type_mismatch_fails() {
        let pipeline = pipeline(base_schema());
        let err = pipeline
            .to_store(&json!({"id": "u1", "age": "thirty"}), &ConformOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::TypeMismatch);
        assert_eq!(err.path(), Some("age"));
    }

    #[tokio::test]
    async fn test_unknown_attribute_rejected_by_default() {
        let pipeline = pipeline(base_schema());
        let err = pipeline
            .to_store(&json!({"id": "u1", "ghost": 1}), &ConformOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::UnknownAttribute);
        assert_eq!(err.path(), Some("ghost"));
    }

    #[tokio::test]
    async fn test_save_unknown_boolean_admits_everything() {
        let schema = Schema::builder("id")
            .attribute("id", AttributeDef::required_string())
            .save_unknown(AllowList::all())
            .build()
            .unwrap();
        let pipeline = pipeline(schema);

        let record = pipeline
            .to_store(
                &json!({"id": "u1", "extra": {"nested": [1, 2]}}),
                &ConformOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(
            record["extra"],
            WireValue::M(
                [(
                    "nested".to_string(),
                    WireValue::L(vec![WireValue::N("1".into()), WireValue::N("2".into())])
                )]
                .into_iter()
                .collect()
            )
        );
    }

    #[tokio::test]
    async fn test_save_unknown_patterns() {
        let schema = Schema::builder("id")
            .attribute("id", AttributeDef::required_string())
            .attribute("meta", AttributeDef::new(TypeDetail::Map))
            .save_unknown(AllowList::patterns(
                ["meta.*"],
                &crate::path::wildcard::MatchSettings::default(),
            ))
            .build()
            .unwrap();
        let pipeline = pipeline(schema);

        // One level under meta is admitted
        let record = pipeline
            .to_store(
                &json!({"id": "u1", "meta": {"color": "red"}}),
                &ConformOptions::default(),
            )
            .await
            .unwrap();
        let WireValue::M(meta) = &record["meta"] else {
            panic!("meta should be a map")
        };
        assert_eq!(meta["color"], WireValue::S("red".into()));

        // A top-level unknown is not
        let err = pipeline
            .to_store(
                &json!({"id": "u1", "meta": {}, "other": 1}),
                &ConformOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::UnknownAttribute);
    }

    #[tokio::test]
    async fn test_nested_map_conformance() {
        let schema = Schema::builder("id")
            .attribute("id", AttributeDef::required_string())
            .attribute("address", AttributeDef::new(TypeDetail::Map))
            .attribute("address.city", AttributeDef::required_string())
            .attribute("address.zip", AttributeDef::optional_string())
            .build()
            .unwrap();
        let pipeline = pipeline(schema);

        let record = pipeline
            .to_store(
                &json!({"id": "u1", "address": {"city": "NYC"}}),
                &ConformOptions::default(),
            )
            .await
            .unwrap();
        let WireValue::M(address) = &record["address"] else {
            panic!("address should be a map")
        };
        assert_eq!(address["city"], WireValue::S("NYC".into()));

        // Required nested child enforced when the parent is present
        let err = pipeline
            .to_store(
                &json!({"id": "u1", "address": {"zip": "10001"}}),
                &ConformOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.path(), Some("address.city"));
    }

    #[tokio::test]
    async fn test_list_element_conformance() {
        let schema = Schema::builder("id")
            .attribute("id", AttributeDef::required_string())
            .attribute("scores", AttributeDef::new(TypeDetail::List))
            .attribute("scores.0", AttributeDef::optional_number())
            .build()
            .unwrap();
        let pipeline = pipeline(schema);

        let record = pipeline
            .to_store(
                &json!({"id": "u1", "scores": [1, 2, 3]}),
                &ConformOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(
            record["scores"],
            WireValue::L(vec![
                WireValue::N("1".into()),
                WireValue::N("2".into()),
                WireValue::N("3".into()),
            ])
        );

        // Element mismatch carries the real index
        let err = pipeline
            .to_store(
                &json!({"id": "u1", "scores": [1, "two"]}),
                &ConformOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.path(), Some("scores.1"));
    }

    #[tokio::test]
    async fn test_static_and_provider_defaults() {
        let schema = Schema::builder("id")
            .attribute(
                "id",
                AttributeDef::required_string().with_default(DefaultValue::uuid()),
            )
            .attribute(
                "retries",
                AttributeDef::required_number().with_default(DefaultValue::Value(json!(0))),
            )
            .build()
            .unwrap();
        let pipeline = pipeline(schema);

        let record = pipeline
            .to_store(&json!({}), &ConformOptions::default())
            .await
            .unwrap();
        assert!(matches!(&record["id"], WireValue::S(s) if !s.is_empty()));
        assert_eq!(record["retries"], WireValue::N("0".into()));
    }

    #[tokio::test]
    async fn test_default_skipped_when_disabled() {
        let schema = Schema::builder("id")
            .attribute(
                "id",
                AttributeDef::required_string().with_default(DefaultValue::uuid()),
            )
            .build()
            .unwrap();
        let pipeline = pipeline(schema);

        let options = ConformOptions {
            apply_defaults: false,
            ..ConformOptions::default()
        };
        let err = pipeline.to_store(&json!({}), &options).await.unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn test_validator_rejection_is_atomic() {
        let schema = Schema::builder("id")
            .attribute("id", AttributeDef::required_string())
            .attribute(
                "age",
                AttributeDef::required_number().with_validator(Arc::new(|value: &Value| {
                    let ok = value.as_f64().map(|n| n >= 0.0).unwrap_or(false);
                    async move {
                        if ok {
                            Ok(())
                        } else {
                            Err("age must be non-negative".to_string())
                        }
                    }
                    .boxed()
                })),
            )
            .build()
            .unwrap();
        let pipeline = pipeline(schema);

        let err = pipeline
            .to_store(&json!({"id": "u1", "age": -4}), &ConformOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::ValidationFailed);
        assert!(err.message().contains("non-negative"));

        let record = pipeline
            .to_store(&json!({"id": "u1", "age": 4}), &ConformOptions::default())
            .await
            .unwrap();
        assert_eq!(record["age"], WireValue::N("4".into()));
    }

    #[tokio::test]
    async fn test_input_not_mutated() {
        let schema = Schema::builder("id")
            .attribute(
                "id",
                AttributeDef::required_string().with_default(DefaultValue::uuid()),
            )
            .build()
            .unwrap();
        let pipeline = pipeline(schema);

        let document = json!({});
        pipeline
            .to_store(&document, &ConformOptions::default())
            .await
            .unwrap();
        assert_eq!(document, json!({}));
    }

    #[tokio::test]
    async fn test_in_place_writes_defaults_back() {
        let schema = Schema::builder("id")
            .attribute(
                "id",
                AttributeDef::required_string()
                    .with_default(DefaultValue::Value(json!("generated"))),
            )
            .build()
            .unwrap();
        let pipeline = pipeline(schema);

        let mut document = json!({});
        pipeline
            .to_store_in_place(&mut document, &ConformOptions::default())
            .await
            .unwrap();
        assert_eq!(document, json!({"id": "generated"}));
    }

    #[tokio::test]
    async fn test_from_store_restores_shapes() {
        let pipeline = pipeline(base_schema());
        let record: WireRecord = [
            ("id".to_string(), WireValue::S("u1".into())),
            ("age".to_string(), WireValue::N("30".into())),
            ("active".to_string(), WireValue::Bool(true)),
        ]
        .into_iter()
        .collect();

        let document = pipeline.from_store(&record).unwrap();
        assert_eq!(document, json!({"id": "u1", "age": 30, "active": true}));
    }

    #[tokio::test]
    async fn test_from_store_drops_undeclared() {
        let pipeline = pipeline(base_schema());
        let record: WireRecord = [
            ("id".to_string(), WireValue::S("u1".into())),
            ("legacy".to_string(), WireValue::S("old".into())),
        ]
        .into_iter()
        .collect();

        let document = pipeline.from_store(&record).unwrap();
        assert_eq!(document, json!({"id": "u1"}));
    }

    #[tokio::test]
    async fn test_from_store_keeps_admitted_unknowns() {
        let schema = Schema::builder("id")
            .attribute("id", AttributeDef::required_string())
            .save_unknown(AllowList::all())
            .build()
            .unwrap();
        let pipeline = pipeline(schema);
        let record: WireRecord = [
            ("id".to_string(), WireValue::S("u1".into())),
            ("legacy".to_string(), WireValue::N("7".into())),
        ]
        .into_iter()
        .collect();

        let document = pipeline.from_store(&record).unwrap();
        assert_eq!(document, json!({"id": "u1", "legacy": 7}));
    }

    #[tokio::test]
    async fn test_custom_type_round_trip() {
        let schema = Schema::builder("id")
            .attribute("id", AttributeDef::required_string())
            .attribute(
                "created",
                AttributeDef::new(TypeDetail::Custom("timestamp".into())),
            )
            .build()
            .unwrap();
        let pipeline = pipeline(schema);

        let record = pipeline
            .to_store(
                &json!({"id": "u1", "created": "2024-05-01T12:00:00Z"}),
                &ConformOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(record["created"], WireValue::N("1714564800000".into()));

        let document = pipeline.from_store(&record).unwrap();
        assert_eq!(document["created"], json!("2024-05-01T12:00:00.000Z"));
    }

    #[tokio::test]
    async fn test_round_trip_primitive_record() {
        // from_store then to_store reproduces the record for declared,
        // non-custom primitive types
        let pipeline = pipeline(base_schema());
        let record: WireRecord = [
            ("id".to_string(), WireValue::S("u1".into())),
            ("age".to_string(), WireValue::N("30".into())),
            ("active".to_string(), WireValue::Bool(false)),
        ]
        .into_iter()
        .collect();

        let document = pipeline.from_store(&record).unwrap();
        let round_tripped = pipeline
            .to_store(&document, &ConformOptions::default())
            .await
            .unwrap();
        assert_eq!(round_tripped, record);
    }

    #[tokio::test]
    async fn test_null_requires_declared_null() {
        let schema = Schema::builder("id")
            .attribute("id", AttributeDef::required_string())
            .attribute(
                "note",
                AttributeDef::one_of(vec![TypeDetail::String, TypeDetail::Null]),
            )
            .build()
            .unwrap();
        let pipeline = pipeline(schema);

        let record = pipeline
            .to_store(&json!({"id": "u1", "note": null}), &ConformOptions::default())
            .await
            .unwrap();
        assert_eq!(record["note"], WireValue::Null(true));

        // A number-only attribute rejects null
        let strict = ConformancePipeline::new(Arc::new(base_schema()));
        let err = strict
            .to_store(&json!({"id": "u1", "age": null}), &ConformOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), SchemaErrorCode::TypeMismatch);
    }

    #[tokio::test]
    async fn test_set_transform_dedupes() {
        let schema = Schema::builder("id")
            .attribute("id", AttributeDef::required_string())
            .attribute("tags", AttributeDef::new(TypeDetail::Set(SetKind::String)))
            .build()
            .unwrap();
        let pipeline = pipeline(schema);

        let record = pipeline
            .to_store(
                &json!({"id": "u1", "tags": ["a", "b", "a"]}),
                &ConformOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(record["tags"], WireValue::SS(vec!["a".into(), "b".into()]));
    }
}
