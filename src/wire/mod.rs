//! Wire-format attribute encoding
//!
//! The store's native representation is a tagged attribute-value union.
//! Each value carries exactly one type tag: scalar (`S`, `N`, `B`, `BOOL`,
//! `NULL`), document (`L`, `M`), or set (`SS`, `NS`, `BS`). Numbers travel
//! as decimal strings to avoid precision loss in transit.
//!
//! `WireValue` serializes to the externally-tagged JSON form used by the
//! store's API (`{"S": "hello"}`, `{"N": "42"}`), with binary payloads
//! base64-encoded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

mod b64_set {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(set: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        set.iter()
            .map(|bytes| STANDARD.encode(bytes))
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let texts = Vec::<String>::deserialize(deserializer)?;
        texts
            .into_iter()
            .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
            .collect()
    }
}

/// The type tag of a wire value, without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireKind {
    String,
    Number,
    Binary,
    Boolean,
    Null,
    List,
    Map,
    StringSet,
    NumberSet,
    BinarySet,
}

impl WireKind {
    /// Returns the store's tag for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            WireKind::String => "S",
            WireKind::Number => "N",
            WireKind::Binary => "B",
            WireKind::Boolean => "BOOL",
            WireKind::Null => "NULL",
            WireKind::List => "L",
            WireKind::Map => "M",
            WireKind::StringSet => "SS",
            WireKind::NumberSet => "NS",
            WireKind::BinarySet => "BS",
        }
    }
}

/// A single tagged attribute value in the store's encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    /// UTF-8 string
    S(String),
    /// Number as decimal string
    N(String),
    /// Binary payload (base64 on the wire)
    B(#[serde(with = "b64")] Vec<u8>),
    /// Boolean
    #[serde(rename = "BOOL")]
    Bool(bool),
    /// Explicit null marker
    #[serde(rename = "NULL")]
    Null(bool),
    /// Heterogeneous list
    L(Vec<WireValue>),
    /// Nested map
    M(BTreeMap<String, WireValue>),
    /// String set
    SS(Vec<String>),
    /// Number set (decimal strings)
    NS(Vec<String>),
    /// Binary set
    BS(#[serde(with = "b64_set")] Vec<Vec<u8>>),
}

/// A full record: attribute name to tagged value
pub type WireRecord = BTreeMap<String, WireValue>;

impl WireValue {
    /// Returns the type tag of this value
    pub fn kind(&self) -> WireKind {
        match self {
            WireValue::S(_) => WireKind::String,
            WireValue::N(_) => WireKind::Number,
            WireValue::B(_) => WireKind::Binary,
            WireValue::Bool(_) => WireKind::Boolean,
            WireValue::Null(_) => WireKind::Null,
            WireValue::L(_) => WireKind::List,
            WireValue::M(_) => WireKind::Map,
            WireValue::SS(_) => WireKind::StringSet,
            WireValue::NS(_) => WireKind::NumberSet,
            WireValue::BS(_) => WireKind::BinarySet,
        }
    }

    /// Returns the store's tag for this value
    pub fn type_name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Builds a number value from anything JSON considers a number
    pub fn number(n: &serde_json::Number) -> Self {
        WireValue::N(n.to_string())
    }

    /// Returns the string payload, if this is an `S`
    pub fn as_s(&self) -> Option<&str> {
        match self {
            WireValue::S(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns the decimal payload parsed as f64, if this is an `N`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WireValue::N(n) => n.parse().ok(),
            _ => None,
        }
    }

    /// Infers a wire value from a JSON value's natural shape.
    ///
    /// Used for attributes admitted by the save-unknown policy, where no
    /// declared type drives the encoding. Arrays become `L`, objects `M`.
    pub fn infer(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => WireValue::Null(true),
            serde_json::Value::Bool(b) => WireValue::Bool(*b),
            serde_json::Value::Number(n) => WireValue::number(n),
            serde_json::Value::String(s) => WireValue::S(s.clone()),
            serde_json::Value::Array(items) => {
                WireValue::L(items.iter().map(WireValue::infer).collect())
            }
            serde_json::Value::Object(map) => WireValue::M(
                map.iter()
                    .map(|(k, v)| (k.clone(), WireValue::infer(v)))
                    .collect(),
            ),
        }
    }

    /// Converts back to the natural JSON shape.
    ///
    /// Numbers that parse as integers come back as integers; sets come back
    /// as plain arrays (the set-ness lives in the schema, not the document).
    /// An `N` payload outside both `i64` and finite `f64` range has no JSON
    /// number form and comes back as its decimal string, preserving the
    /// digits over the type.
    pub fn to_json(&self) -> serde_json::Value {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine as _;

        match self {
            WireValue::S(s) => serde_json::Value::String(s.clone()),
            WireValue::N(n) => parse_number(n),
            WireValue::B(bytes) => serde_json::Value::String(STANDARD.encode(bytes)),
            WireValue::Bool(b) => serde_json::Value::Bool(*b),
            WireValue::Null(_) => serde_json::Value::Null,
            WireValue::L(items) => {
                serde_json::Value::Array(items.iter().map(WireValue::to_json).collect())
            }
            WireValue::M(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            WireValue::SS(set) => serde_json::Value::Array(
                set.iter()
                    .map(|s| serde_json::Value::String(s.clone()))
                    .collect(),
            ),
            WireValue::NS(set) => serde_json::Value::Array(set.iter().map(|n| parse_number(n)).collect()),
            WireValue::BS(set) => serde_json::Value::Array(
                set.iter()
                    .map(|bytes| serde_json::Value::String(STANDARD.encode(bytes)))
                    .collect(),
            ),
        }
    }
}

/// Parses a decimal string into the narrowest JSON number
fn parse_number(text: &str) -> serde_json::Value {
    if let Ok(i) = text.parse::<i64>() {
        return serde_json::Value::Number(i.into());
    }
    if let Ok(f) = text.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return serde_json::Value::Number(n);
        }
    }
    // Out-of-range decimal survives as its string form
    serde_json::Value::String(text.to_string())
}
