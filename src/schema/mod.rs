//! Schema definition and type resolution
//!
//! A schema is an ordered mapping from attribute path to one or more
//! admissible type declarations, plus the table's key schema, secondary
//! index declarations, and the save-unknown policy. Declaration order is
//! semantically significant: type alternatives resolve first-match-wins,
//! and documents conform in declared attribute order.

pub mod custom;
pub mod errors;
pub mod resolve;
pub mod types;

pub use custom::{CustomType, CustomTypeRegistry};
pub use errors::{SchemaError, SchemaErrorCode, SchemaResult};
pub use resolve::{TypeResolution, TypeResolver};
pub use types::{
    AttributeDef, DefaultValue, IndexDescriptor, KeySchema, SetKind, TypeDetail, Validator,
};

use std::collections::HashMap;
use std::sync::Arc;

use crate::path::wildcard::{AllowList, MatchSettings};
use crate::path::AttributePath;

/// One declared attribute: path plus definition
#[derive(Debug, Clone)]
pub struct SchemaEntry {
    /// Pre-split attribute path
    pub path: AttributePath,
    /// Type alternatives, requiredness, default, validator
    pub def: AttributeDef,
}

/// A complete, validated schema
#[derive(Debug, Clone)]
pub struct Schema {
    entries: Vec<SchemaEntry>,
    by_path: HashMap<String, usize>,
    key: KeySchema,
    indexes: Vec<IndexDescriptor>,
    save_unknown: AllowList,
    match_settings: MatchSettings,
    registry: Arc<CustomTypeRegistry>,
}

impl Schema {
    /// Starts a schema builder with the given hash key attribute
    pub fn builder(hash_key: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(hash_key)
    }

    /// Looks up an attribute definition by dotted path
    pub fn get(&self, path: &str) -> Option<&AttributeDef> {
        self.by_path.get(path).map(|&i| &self.entries[i].def)
    }

    /// Returns true if the dotted path is declared
    pub fn declares(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    /// All entries in declared order
    pub fn entries(&self) -> &[SchemaEntry] {
        &self.entries
    }

    /// Top-level entries in declared order
    pub fn top_level_entries(&self) -> impl Iterator<Item = &SchemaEntry> {
        self.entries.iter().filter(|entry| entry.path.is_top_level())
    }

    /// Direct children of the given path, in declared order
    pub fn children_of<'a>(
        &'a self,
        parent: &'a AttributePath,
    ) -> impl Iterator<Item = &'a SchemaEntry> {
        self.entries.iter().filter(move |entry| {
            entry.path.depth() == parent.depth() + 1
                && &entry.path.segments()[..parent.depth()] == parent.segments()
        })
    }

    /// Returns the table's own key schema
    pub fn key(&self) -> &KeySchema {
        &self.key
    }

    /// Declared secondary indexes, in declaration order
    pub fn indexes(&self) -> &[IndexDescriptor] {
        &self.indexes
    }

    /// Returns the save-unknown policy
    pub fn save_unknown(&self) -> &AllowList {
        &self.save_unknown
    }

    /// Returns the path-matching settings
    pub fn match_settings(&self) -> &MatchSettings {
        &self.match_settings
    }

    /// Returns the custom type registry bound to this schema
    pub fn registry(&self) -> &CustomTypeRegistry {
        &self.registry
    }

    /// Consults the save-unknown policy for an undeclared path
    pub fn unknown_allowed(&self, path: &AttributePath) -> bool {
        let segments: Vec<&str> = path.segments().iter().map(String::as_str).collect();
        self.save_unknown
            .matches_segments(&segments, &self.match_settings)
    }
}

/// Builder validating schema invariants at `build`
#[derive(Debug)]
pub struct SchemaBuilder {
    entries: Vec<SchemaEntry>,
    hash_key: String,
    range_key: Option<String>,
    indexes: Vec<IndexDescriptor>,
    save_unknown: AllowList,
    match_settings: MatchSettings,
    registry: Option<Arc<CustomTypeRegistry>>,
}

impl SchemaBuilder {
    fn new(hash_key: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            hash_key: hash_key.into(),
            range_key: None,
            indexes: Vec::new(),
            save_unknown: AllowList::none(),
            match_settings: MatchSettings::default(),
            registry: None,
        }
    }

    /// Declares an attribute; declaration order is preserved
    pub fn attribute(mut self, path: &str, def: AttributeDef) -> Self {
        self.entries.push(SchemaEntry {
            path: AttributePath::parse(path),
            def,
        });
        self
    }

    /// Declares the range key attribute name
    pub fn range_key(mut self, name: impl Into<String>) -> Self {
        self.range_key = Some(name.into());
        self
    }

    /// Declares a secondary index
    pub fn index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }

    /// Sets the save-unknown policy
    pub fn save_unknown(mut self, policy: AllowList) -> Self {
        self.save_unknown = policy;
        self
    }

    /// Overrides the path-matching settings
    pub fn match_settings(mut self, settings: MatchSettings) -> Self {
        self.match_settings = settings;
        self
    }

    /// Binds a custom type registry; defaults to the built-in set
    pub fn registry(mut self, registry: Arc<CustomTypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Validates the declarations and produces the schema.
    ///
    /// Enforced invariants: every declared path is unique and carries at
    /// least one type; the hash key (and range key, if any) is a declared
    /// top-level attribute; index keys reference declared top-level
    /// attributes; nested paths have a declared map- or list-capable
    /// parent.
    pub fn build(self) -> SchemaResult<Schema> {
        let mut by_path = HashMap::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.def.types.is_empty() {
                return Err(SchemaError::invalid(format!(
                    "attribute '{}' declares no types",
                    entry.path
                )));
            }
            if by_path.insert(entry.path.dotted(), i).is_some() {
                return Err(SchemaError::invalid(format!(
                    "attribute '{}' declared twice",
                    entry.path
                )));
            }
        }

        let check_key = |name: &str, role: &str| -> SchemaResult<()> {
            match by_path.get(name) {
                Some(&i) if self.entries[i].path.is_top_level() => Ok(()),
                _ => Err(SchemaError::invalid(format!(
                    "{} '{}' is not a declared top-level attribute",
                    role, name
                ))),
            }
        };

        check_key(&self.hash_key, "hash key")?;
        if let Some(range) = &self.range_key {
            if *range == self.hash_key {
                return Err(SchemaError::invalid(
                    "hash key and range key must be distinct attributes",
                ));
            }
            check_key(range, "range key")?;
        }
        for index in &self.indexes {
            check_key(&index.hash_key, "index hash key")?;
            if let Some(range) = &index.range_key {
                check_key(range, "index range key")?;
            }
        }

        // Nested declarations need a parent that can hold them
        for entry in &self.entries {
            let Some(parent) = entry.path.parent() else {
                continue;
            };
            let Some(&parent_index) = by_path.get(&parent.dotted()) else {
                return Err(SchemaError::invalid(format!(
                    "nested attribute '{}' has no declared parent '{}'",
                    entry.path, parent
                )));
            };
            let parent_types = &self.entries[parent_index].def.types;
            let is_index_segment = entry.path.leaf().parse::<usize>().is_ok();
            let admits = parent_types.iter().any(|detail| match detail {
                TypeDetail::Map => !is_index_segment,
                TypeDetail::List => is_index_segment,
                _ => false,
            });
            if !admits {
                return Err(SchemaError::invalid(format!(
                    "parent '{}' of '{}' does not admit {} children",
                    parent,
                    entry.path,
                    if is_index_segment { "list" } else { "map" }
                )));
            }
        }

        Ok(Schema {
            entries: self.entries,
            by_path,
            key: KeySchema {
                hash_key: self.hash_key,
                range_key: self.range_key,
            },
            indexes: self.indexes,
            save_unknown: self.save_unknown,
            match_settings: self.match_settings,
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(CustomTypeRegistry::new())),
        })
    }
}
