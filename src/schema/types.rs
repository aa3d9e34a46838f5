//! Schema type declarations
//!
//! An attribute declares one or more admissible types, evaluated in
//! declaration order. Each `TypeDetail` is a primitive kind, a document
//! kind (list/map, with children addressed by path segment - list element
//! types live at segment `0`), a set kind, or a reference into the custom
//! type registry. Multiple details for one path form an ordered
//! alternative list; resolution picks the first structural match.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::custom::CustomTypeRegistry;
use super::errors::SchemaResult;
use crate::wire::{WireKind, WireValue};

/// Element kind of a set attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetKind {
    String,
    Number,
    Binary,
}

impl SetKind {
    /// Returns the wire kind for this set
    pub fn wire_kind(&self) -> WireKind {
        match self {
            SetKind::String => WireKind::StringSet,
            SetKind::Number => WireKind::NumberSet,
            SetKind::Binary => WireKind::BinarySet,
        }
    }

    fn element_matches(&self, element: &Value) -> bool {
        match self {
            SetKind::String => element.is_string(),
            SetKind::Number => element.is_number(),
            SetKind::Binary => element
                .as_str()
                .map(|text| BASE64.decode(text).is_ok())
                .unwrap_or(false),
        }
    }
}

/// One admissible type for an attribute
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDetail {
    /// UTF-8 string, stored as `S`
    String,
    /// Number, stored as `N` (decimal string)
    Number,
    /// Boolean, stored as `BOOL`
    Boolean,
    /// Binary payload, base64 text on the application side, stored as `B`
    Binary,
    /// Explicit null, stored as `NULL`
    Null,
    /// Heterogeneous list; element types declared at segment `0`
    List,
    /// Nested map; children declared at their own paths
    Map,
    /// Homogeneous set, stored as `SS`/`NS`/`BS`
    Set(SetKind),
    /// A named custom type resolved through the registry
    Custom(String),
}

impl TypeDetail {
    /// Returns a display name for error messages
    pub fn type_name(&self) -> String {
        match self {
            TypeDetail::String => "string".into(),
            TypeDetail::Number => "number".into(),
            TypeDetail::Boolean => "boolean".into(),
            TypeDetail::Binary => "binary".into(),
            TypeDetail::Null => "null".into(),
            TypeDetail::List => "list".into(),
            TypeDetail::Map => "map".into(),
            TypeDetail::Set(SetKind::String) => "set<string>".into(),
            TypeDetail::Set(SetKind::Number) => "set<number>".into(),
            TypeDetail::Set(SetKind::Binary) => "set<binary>".into(),
            TypeDetail::Custom(name) => format!("custom<{}>", name),
        }
    }

    /// Built-in membership predicate over the application-shaped value.
    ///
    /// Custom types prefer their registered predicate; an unregistered
    /// custom name never matches.
    pub fn matches_app(&self, value: &Value, registry: &CustomTypeRegistry) -> bool {
        match self {
            TypeDetail::String => value.is_string(),
            TypeDetail::Number => value.is_number(),
            TypeDetail::Boolean => value.is_boolean(),
            TypeDetail::Binary => value
                .as_str()
                .map(|text| BASE64.decode(text).is_ok())
                .unwrap_or(false),
            TypeDetail::Null => value.is_null(),
            TypeDetail::List => value.is_array(),
            TypeDetail::Map => value.is_object(),
            TypeDetail::Set(kind) => value
                .as_array()
                .map(|items| items.iter().all(|item| kind.element_matches(item)))
                .unwrap_or(false),
            TypeDetail::Custom(name) => registry
                .get(name)
                .map(|custom| custom.matches_app(value))
                .unwrap_or(false),
        }
    }

    /// Membership predicate over the wire-shaped value
    pub fn matches_wire(&self, value: &WireValue, registry: &CustomTypeRegistry) -> bool {
        match self {
            TypeDetail::String => value.kind() == WireKind::String,
            TypeDetail::Number => value.kind() == WireKind::Number,
            TypeDetail::Boolean => value.kind() == WireKind::Boolean,
            TypeDetail::Binary => value.kind() == WireKind::Binary,
            TypeDetail::Null => value.kind() == WireKind::Null,
            TypeDetail::List => value.kind() == WireKind::List,
            TypeDetail::Map => value.kind() == WireKind::Map,
            TypeDetail::Set(kind) => value.kind() == kind.wire_kind(),
            TypeDetail::Custom(name) => registry
                .get(name)
                .map(|custom| custom.matches_wire(value))
                .unwrap_or(false),
        }
    }
}

/// A default for an absent attribute: static value or per-document provider
#[derive(Clone)]
pub enum DefaultValue {
    /// A fixed value cloned into each document
    Value(Value),
    /// A zero-argument provider evaluated once per document; may suspend
    Provider(DefaultProvider),
}

/// Async default provider
pub type DefaultProvider =
    Arc<dyn Fn() -> BoxFuture<'static, SchemaResult<Value>> + Send + Sync>;

impl DefaultValue {
    /// Provider generating a fresh v4 UUID string
    pub fn uuid() -> Self {
        DefaultValue::Provider(Arc::new(|| {
            async { Ok(Value::String(uuid::Uuid::new_v4().to_string())) }.boxed()
        }))
    }

    /// Resolves the default for one document
    pub fn resolve(&self) -> BoxFuture<'static, SchemaResult<Value>> {
        match self {
            DefaultValue::Value(value) => {
                let value = value.clone();
                async move { Ok(value) }.boxed()
            }
            DefaultValue::Provider(provider) => provider(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(value) => f.debug_tuple("Value").field(value).finish(),
            DefaultValue::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

/// Async per-attribute validator; `Err(reason)` rejects the document
pub type Validator =
    Arc<dyn Fn(&Value) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Declaration of one attribute path
#[derive(Clone)]
pub struct AttributeDef {
    /// Ordered type alternatives; first structural match wins
    pub types: Vec<TypeDetail>,
    /// Whether the attribute must be present (after defaults)
    pub required: bool,
    /// Default applied when the attribute is absent
    pub default: Option<DefaultValue>,
    /// Validator run against the conformed value
    pub validator: Option<Validator>,
}

impl AttributeDef {
    /// Declares a single-type optional attribute
    pub fn new(detail: TypeDetail) -> Self {
        Self::one_of(vec![detail])
    }

    /// Declares an attribute admitting several alternatives, in order
    pub fn one_of(types: Vec<TypeDetail>) -> Self {
        Self {
            types,
            required: false,
            default: None,
            validator: None,
        }
    }

    /// Marks the attribute required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Attaches a default
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Attaches a validator
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Required string attribute
    pub fn required_string() -> Self {
        Self::new(TypeDetail::String).required()
    }

    /// Optional string attribute
    pub fn optional_string() -> Self {
        Self::new(TypeDetail::String)
    }

    /// Required number attribute
    pub fn required_number() -> Self {
        Self::new(TypeDetail::Number).required()
    }

    /// Optional number attribute
    pub fn optional_number() -> Self {
        Self::new(TypeDetail::Number)
    }

    /// Display form of the alternative list for error messages
    pub fn declared_names(&self) -> String {
        self.types
            .iter()
            .map(TypeDetail::type_name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Debug for AttributeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeDef")
            .field("types", &self.types)
            .field("required", &self.required)
            .field("has_default", &self.default.is_some())
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

/// A table's or index's physical access pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    /// Partition key attribute name
    pub hash_key: String,
    /// Optional sort key attribute name
    pub range_key: Option<String>,
}

impl KeySchema {
    /// Hash-only key schema
    pub fn hash(hash_key: impl Into<String>) -> Self {
        Self {
            hash_key: hash_key.into(),
            range_key: None,
        }
    }

    /// Composite key schema
    pub fn composite(hash_key: impl Into<String>, range_key: impl Into<String>) -> Self {
        Self {
            hash_key: hash_key.into(),
            range_key: Some(range_key.into()),
        }
    }
}

/// A declared secondary index, immutable after schema definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    /// Optional human name
    pub name: Option<String>,
    /// Index partition key attribute
    pub hash_key: String,
    /// Optional index sort key attribute
    pub range_key: Option<String>,
    /// Whether the index projects all attributes; a keys-only index
    /// returns partial records that need a follow-up fetch
    pub project: bool,
}

impl IndexDescriptor {
    /// Index on a single hash key, projecting all attributes
    pub fn on(hash_key: impl Into<String>) -> Self {
        Self {
            name: None,
            hash_key: hash_key.into(),
            range_key: None,
            project: true,
        }
    }

    /// Adds a range key
    pub fn with_range(mut self, range_key: impl Into<String>) -> Self {
        self.range_key = Some(range_key.into());
        self
    }

    /// Names the index
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Marks the index keys-only
    pub fn keys_only(mut self) -> Self {
        self.project = false;
        self
    }

    /// Returns the index key schema
    pub fn key_schema(&self) -> KeySchema {
        KeySchema {
            hash_key: self.hash_key.clone(),
            range_key: self.range_key.clone(),
        }
    }
}
