//! Custom type registry
//!
//! A custom type is a named type descriptor carrying a membership
//! predicate, a declared storage kind, and a bidirectional wire transform.
//! The registry is an explicit value constructed once per schema and shared
//! behind `Arc` - there is no module-level mutable state. `reset` restores
//! the built-in set for test isolation.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::errors::{SchemaError, SchemaResult};
use crate::wire::{WireKind, WireValue};

/// Membership predicate over the application-shaped value
pub type MembershipFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Forward transform: application value to wire value
pub type ToStoreFn = Arc<dyn Fn(&Value) -> SchemaResult<WireValue> + Send + Sync>;

/// Backward transform: wire value to application value
pub type FromStoreFn = Arc<dyn Fn(&WireValue) -> SchemaResult<Value> + Send + Sync>;

/// A user-registered type with its own membership test and wire transforms
#[derive(Clone)]
pub struct CustomType {
    name: String,
    storage: WireKind,
    is_of_type: Option<MembershipFn>,
    to_store: ToStoreFn,
    from_store: FromStoreFn,
}

impl CustomType {
    /// Creates a custom type with the given storage kind and transforms
    pub fn new(
        name: impl Into<String>,
        storage: WireKind,
        to_store: ToStoreFn,
        from_store: FromStoreFn,
    ) -> Self {
        Self {
            name: name.into(),
            storage,
            is_of_type: None,
            to_store,
            from_store,
        }
    }

    /// Attaches a membership predicate.
    ///
    /// When present it takes precedence over the storage kind's built-in
    /// shape check during application-side resolution.
    pub fn with_membership(mut self, predicate: MembershipFn) -> Self {
        self.is_of_type = Some(predicate);
        self
    }

    /// Returns the type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared wire storage kind
    pub fn storage(&self) -> WireKind {
        self.storage
    }

    /// Application-side membership test.
    ///
    /// Prefers the registered predicate; falls back to the natural
    /// application shape of the storage kind.
    pub fn matches_app(&self, value: &Value) -> bool {
        match &self.is_of_type {
            Some(predicate) => predicate(value),
            None => storage_shape_matches(self.storage, value),
        }
    }

    /// Wire-side membership test: the wire value's shape drives resolution
    pub fn matches_wire(&self, value: &WireValue) -> bool {
        value.kind() == self.storage
    }

    /// Applies the forward transform
    pub fn apply_to_store(&self, value: &Value) -> SchemaResult<WireValue> {
        (self.to_store)(value)
    }

    /// Applies the backward transform
    pub fn apply_from_store(&self, value: &WireValue) -> SchemaResult<Value> {
        (self.from_store)(value)
    }
}

impl fmt::Debug for CustomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomType")
            .field("name", &self.name)
            .field("storage", &self.storage)
            .field("has_membership", &self.is_of_type.is_some())
            .finish()
    }
}

/// The natural application-side shape for a wire storage kind
fn storage_shape_matches(kind: WireKind, value: &Value) -> bool {
    match kind {
        WireKind::String => value.is_string(),
        WireKind::Number => value.is_number(),
        WireKind::Binary => value.is_string(),
        WireKind::Boolean => value.is_boolean(),
        WireKind::Null => value.is_null(),
        WireKind::List | WireKind::StringSet | WireKind::NumberSet | WireKind::BinarySet => {
            value.is_array()
        }
        WireKind::Map => value.is_object(),
    }
}

/// Mapping from type name to custom type descriptor
#[derive(Debug, Clone)]
pub struct CustomTypeRegistry {
    types: HashMap<String, CustomType>,
}

impl CustomTypeRegistry {
    /// Registry with no types at all
    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Registry pre-populated with the built-in types
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(timestamp_type());
        registry
    }

    /// Registers a type, replacing any previous type of the same name
    pub fn register(&mut self, custom: CustomType) {
        self.types.insert(custom.name().to_string(), custom);
    }

    /// Looks up a type by name
    pub fn get(&self, name: &str) -> Option<&CustomType> {
        self.types.get(name)
    }

    /// Restores the built-in set, discarding user registrations
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for CustomTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Built-in `timestamp` type.
///
/// Application shape is an RFC 3339 string; wire shape is epoch
/// milliseconds as `N`.
pub fn timestamp_type() -> CustomType {
    CustomType::new(
        "timestamp",
        WireKind::Number,
        Arc::new(|value: &Value| {
            let text = value
                .as_str()
                .ok_or_else(|| SchemaError::transform_failed("timestamp", "expected a string"))?;
            let parsed = DateTime::parse_from_rfc3339(text)
                .map_err(|e| SchemaError::transform_failed("timestamp", e.to_string()))?;
            Ok(WireValue::N(parsed.timestamp_millis().to_string()))
        }),
        Arc::new(|value: &WireValue| {
            let millis = value
                .as_f64()
                .ok_or_else(|| SchemaError::transform_failed("timestamp", "expected a number"))?
                as i64;
            let instant = Utc
                .timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| SchemaError::transform_failed("timestamp", "out of range"))?;
            Ok(Value::String(
                instant.to_rfc3339_opts(SecondsFormat::Millis, true),
            ))
        }),
    )
    .with_membership(Arc::new(|value: &Value| {
        value
            .as_str()
            .map(|text| DateTime::parse_from_rfc3339(text).is_ok())
            .unwrap_or(false)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timestamp_membership() {
        let ts = timestamp_type();
        assert!(ts.matches_app(&json!("2024-05-01T12:00:00Z")));
        assert!(!ts.matches_app(&json!("not a timestamp")));
        assert!(!ts.matches_app(&json!(42)));
    }

    #[test]
    fn test_timestamp_round_trip() {
        let ts = timestamp_type();
        let wire = ts.apply_to_store(&json!("2024-05-01T12:00:00Z")).unwrap();
        assert_eq!(wire, WireValue::N("1714564800000".into()));

        let back = ts.apply_from_store(&wire).unwrap();
        assert_eq!(back, json!("2024-05-01T12:00:00.000Z"));
    }

    #[test]
    fn test_wire_side_matches_storage_kind() {
        let ts = timestamp_type();
        assert!(ts.matches_wire(&WireValue::N("1714564800000".into())));
        assert!(!ts.matches_wire(&WireValue::S("2024-05-01".into())));
    }

    #[test]
    fn test_registry_register_and_reset() {
        let mut registry = CustomTypeRegistry::new();
        assert!(registry.get("timestamp").is_some());

        registry.register(CustomType::new(
            "upper",
            WireKind::String,
            Arc::new(|v: &Value| {
                Ok(WireValue::S(v.as_str().unwrap_or("").to_uppercase()))
            }),
            Arc::new(|v: &WireValue| Ok(json!(v.as_s().unwrap_or("")))),
        ));
        assert!(registry.get("upper").is_some());

        registry.reset();
        assert!(registry.get("upper").is_none());
        assert!(registry.get("timestamp").is_some());
    }

    #[test]
    fn test_membership_falls_back_to_storage_shape() {
        let plain = CustomType::new(
            "plain-number",
            WireKind::Number,
            Arc::new(|v: &Value| Ok(WireValue::N(v.to_string()))),
            Arc::new(|v: &WireValue| Ok(v.to_json())),
        );
        assert!(plain.matches_app(&json!(5)));
        assert!(!plain.matches_app(&json!("5")));
    }
}
