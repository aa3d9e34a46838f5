//! Attribute type resolution
//!
//! Given a declared path and a runtime value, determine which of the
//! ordered type alternatives the value satisfies. Every matching
//! alternative is collected, but the first match (lowest index) is
//! authoritative: this is a deliberate first-match-wins policy, so
//! declaration order in the schema is semantically significant.
//!
//! "No match" is a normal result, never an error - the conformance layer
//! decides whether to escalate.

use serde_json::Value;

use super::types::TypeDetail;
use super::Schema;
use crate::wire::WireValue;

/// Outcome of resolving one attribute's type
#[derive(Debug, Clone)]
pub struct TypeResolution<'a> {
    type_details: &'a [TypeDetail],
    matched_indexes: Vec<usize>,
}

impl<'a> TypeResolution<'a> {
    /// The full ordered alternative list for the path
    pub fn type_details(&self) -> &'a [TypeDetail] {
        self.type_details
    }

    /// Every alternative index whose predicate matched, ascending
    pub fn matched_indexes(&self) -> &[usize] {
        &self.matched_indexes
    }

    /// The authoritative match: always the lowest matching index
    pub fn matched_index(&self) -> Option<usize> {
        self.matched_indexes.first().copied()
    }

    /// The authoritative matched type detail
    pub fn matched(&self) -> Option<&'a TypeDetail> {
        self.matched_index().map(|i| &self.type_details[i])
    }

    /// True iff at least one alternative matched
    pub fn is_valid(&self) -> bool {
        !self.matched_indexes.is_empty()
    }
}

/// Resolves runtime values against a schema's type declarations
#[derive(Debug, Clone, Copy)]
pub struct TypeResolver<'a> {
    schema: &'a Schema,
}

impl<'a> TypeResolver<'a> {
    /// Creates a resolver over the given schema
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Resolves an application-shaped value at the given dotted path.
    ///
    /// Returns `None` when the path is not declared; the caller consults
    /// the save-unknown policy in that case.
    pub fn resolve(&self, path: &str, value: &Value) -> Option<TypeResolution<'a>> {
        let def = self.schema.get(path)?;
        let registry = self.schema.registry();
        let matched_indexes = def
            .types
            .iter()
            .enumerate()
            .filter(|(_, detail)| detail.matches_app(value, registry))
            .map(|(i, _)| i)
            .collect();
        Some(TypeResolution {
            type_details: &def.types,
            matched_indexes,
        })
    }

    /// Resolves a wire-shaped value at the given dotted path.
    ///
    /// The wire value's tag, not the application shape, drives matching;
    /// custom types match by their declared storage kind.
    pub fn resolve_wire(&self, path: &str, value: &WireValue) -> Option<TypeResolution<'a>> {
        let def = self.schema.get(path)?;
        let registry = self.schema.registry();
        let matched_indexes = def
            .types
            .iter()
            .enumerate()
            .filter(|(_, detail)| detail.matches_wire(value, registry))
            .map(|(i, _)| i)
            .collect();
        Some(TypeResolution {
            type_details: &def.types,
            matched_indexes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::AttributeDef;
    use serde_json::json;

    fn schema_with(path: &str, def: AttributeDef) -> Schema {
        Schema::builder("id")
            .attribute("id", AttributeDef::required_string())
            .attribute(path, def)
            .build()
            .unwrap()
    }

    #[test]
    fn test_single_type_normalized_to_list() {
        let schema = schema_with("name", AttributeDef::optional_string());
        let resolver = TypeResolver::new(&schema);

        let resolution = resolver.resolve("name", &json!("Alice")).unwrap();
        assert_eq!(resolution.type_details().len(), 1);
        assert_eq!(resolution.matched_index(), Some(0));
        assert!(resolution.is_valid());
    }

    #[test]
    fn test_first_match_wins_over_later_alternatives() {
        // A base64-decodable string satisfies both String and Binary;
        // the declared order decides
        let schema = schema_with(
            "payload",
            AttributeDef::one_of(vec![TypeDetail::String, TypeDetail::Binary]),
        );
        let resolver = TypeResolver::new(&schema);

        let resolution = resolver.resolve("payload", &json!("3q2+7w==")).unwrap();
        assert_eq!(resolution.matched_indexes(), &[0, 1]);
        assert_eq!(resolution.matched_index(), Some(0));
        assert_eq!(resolution.matched(), Some(&TypeDetail::String));
    }

    #[test]
    fn test_declaration_order_flips_the_winner() {
        let schema = schema_with(
            "payload",
            AttributeDef::one_of(vec![TypeDetail::Binary, TypeDetail::String]),
        );
        let resolver = TypeResolver::new(&schema);

        let resolution = resolver.resolve("payload", &json!("3q2+7w==")).unwrap();
        assert_eq!(resolution.matched(), Some(&TypeDetail::Binary));
    }

    #[test]
    fn test_no_match_is_a_normal_result() {
        let schema = schema_with("age", AttributeDef::optional_number());
        let resolver = TypeResolver::new(&schema);

        let resolution = resolver.resolve("age", &json!("forty")).unwrap();
        assert!(!resolution.is_valid());
        assert_eq!(resolution.matched_index(), None);
    }

    #[test]
    fn test_undeclared_path_returns_none() {
        let schema = schema_with("age", AttributeDef::optional_number());
        let resolver = TypeResolver::new(&schema);
        assert!(resolver.resolve("ghost", &json!(1)).is_none());
    }

    #[test]
    fn test_null_needs_a_null_capable_alternative() {
        let schema = schema_with("age", AttributeDef::optional_number());
        let resolver = TypeResolver::new(&schema);
        assert!(!resolver.resolve("age", &json!(null)).unwrap().is_valid());

        let schema = schema_with(
            "age",
            AttributeDef::one_of(vec![TypeDetail::Number, TypeDetail::Null]),
        );
        let resolver = TypeResolver::new(&schema);
        let resolution = resolver.resolve("age", &json!(null)).unwrap();
        assert_eq!(resolution.matched(), Some(&TypeDetail::Null));
    }

    #[test]
    fn test_custom_predicate_preferred() {
        let schema = schema_with(
            "created",
            AttributeDef::one_of(vec![
                TypeDetail::Custom("timestamp".into()),
                TypeDetail::String,
            ]),
        );
        let resolver = TypeResolver::new(&schema);

        // RFC 3339 text satisfies the custom predicate first
        let resolution = resolver
            .resolve("created", &json!("2024-05-01T12:00:00Z"))
            .unwrap();
        assert_eq!(resolution.matched_index(), Some(0));

        // Arbitrary text falls through to the plain string alternative
        let resolution = resolver.resolve("created", &json!("yesterday")).unwrap();
        assert_eq!(resolution.matched_index(), Some(1));
    }

    #[test]
    fn test_wire_shape_drives_from_store_resolution() {
        let schema = schema_with(
            "created",
            AttributeDef::one_of(vec![
                TypeDetail::Custom("timestamp".into()),
                TypeDetail::String,
            ]),
        );
        let resolver = TypeResolver::new(&schema);

        // A stored N matches the timestamp's storage kind, not String
        let resolution = resolver
            .resolve_wire("created", &WireValue::N("1714564800000".into()))
            .unwrap();
        assert_eq!(resolution.matched_index(), Some(0));

        let resolution = resolver
            .resolve_wire("created", &WireValue::S("yesterday".into()))
            .unwrap();
        assert_eq!(resolution.matched_index(), Some(1));
    }
}
