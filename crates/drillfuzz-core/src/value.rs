//! Generated parameter values
//!
//! Typed counterpart of [`TypeDescriptor`](crate::TypeDescriptor). Keeps int/long/double
//! apart so mutations stay type-faithful; converts to plain JSON at the wire.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::{PrimitiveKind, TypeDescriptor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    /// RFC 3339 text
    DateTime(String),
    /// Whole seconds
    Duration(i64),
    Guid(String),
    Bytes(Vec<u8>),
    Uri(String),
    Sequence(Vec<Value>),
    /// Insertion-ordered entries; keys are unique
    Map(Vec<(Value, Value)>),
    Record(BTreeMap<String, Value>),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short kind label, used in logs and signatures.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::DateTime(_) => "datetime",
            Self::Duration(_) => "duration",
            Self::Guid(_) => "guid",
            Self::Bytes(_) => "bytes",
            Self::Uri(_) => "uri",
            Self::Sequence(_) => "sequence",
            Self::Map(_) => "map",
            Self::Record(_) => "record",
        }
    }

    /// Plain JSON for request bodies and reports.
    ///
    /// Non-finite doubles have no JSON number form and are sent as their text
    /// (`"NaN"`, `"Infinity"`, `"-Infinity"`).
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) => Json::Number((*i).into()),
            Self::Long(l) => Json::Number((*l).into()),
            Self::Double(d) => serde_json::Number::from_f64(*d)
                .map_or_else(|| Json::String(non_finite_text(*d).to_string()), Json::Number),
            Self::String(s) | Self::DateTime(s) | Self::Guid(s) | Self::Uri(s) => {
                Json::String(s.clone())
            }
            Self::Duration(_) => Json::String(self.to_string()),
            Self::Bytes(bytes) => Json::String(hex(bytes)),
            Self::Sequence(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
            Self::Record(fields) => Json::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Untyped conversion from JSON.
    ///
    /// Integers that fit `i32` become `Int`, other integers `Long`.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    i32::try_from(i).map_or(Self::Long(i), Self::Int)
                } else {
                    Self::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(s) => Self::String(s.clone()),
            Json::Array(items) => Self::Sequence(items.iter().map(Self::from_json).collect()),
            Json::Object(obj) => Self::Record(
                obj.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Conversion from JSON guided by a declared type.
    ///
    /// Numbers take the declared numeric kind and text the declared text kind.
    /// Anything that does not fit the type converts untyped.
    #[must_use]
    pub fn from_json_as(json: &serde_json::Value, ty: &TypeDescriptor) -> Self {
        use serde_json::Value as Json;
        match (ty, json) {
            (_, Json::Null) => Self::Null,
            (TypeDescriptor::Optional { inner }, _) => Self::from_json_as(json, inner),
            (TypeDescriptor::Primitive { primitive }, _) => {
                primitive_from_json(json, *primitive).unwrap_or_else(|| Self::from_json(json))
            }
            (TypeDescriptor::Sequence { element }, Json::Array(items)) => Self::Sequence(
                items
                    .iter()
                    .map(|item| Self::from_json_as(item, element))
                    .collect(),
            ),
            (TypeDescriptor::Map { key, value }, Json::Object(obj)) => Self::Map(
                obj.iter()
                    .map(|(k, v)| {
                        (
                            Self::from_json_as(&Json::String(k.clone()), key),
                            Self::from_json_as(v, value),
                        )
                    })
                    .collect(),
            ),
            (TypeDescriptor::Record { fields, .. }, Json::Object(obj)) => Self::Record(
                obj.iter()
                    .map(|(k, v)| {
                        let value = fields
                            .iter()
                            .find(|f| &f.name == k)
                            .map_or_else(|| Self::from_json(v), |f| Self::from_json_as(v, &f.ty));
                        (k.clone(), value)
                    })
                    .collect(),
            ),
            _ => Self::from_json(json),
        }
    }
}

fn primitive_from_json(json: &serde_json::Value, kind: PrimitiveKind) -> Option<Value> {
    use serde_json::Value as Json;
    Some(match (kind, json) {
        (PrimitiveKind::Int, Json::Number(n)) => Value::Int(i32::try_from(n.as_i64()?).ok()?),
        (PrimitiveKind::Long, Json::Number(n)) => Value::Long(n.as_i64()?),
        (PrimitiveKind::Double, Json::Number(n)) => Value::Double(n.as_f64()?),
        (PrimitiveKind::Duration, Json::Number(n)) => Value::Duration(n.as_i64()?),
        (PrimitiveKind::Bool, Json::Bool(b)) => Value::Bool(*b),
        (PrimitiveKind::String | PrimitiveKind::Email, Json::String(s)) => Value::String(s.clone()),
        (PrimitiveKind::DateTime, Json::String(s)) => Value::DateTime(s.clone()),
        (PrimitiveKind::Guid, Json::String(s)) => Value::Guid(s.clone()),
        (PrimitiveKind::Uri, Json::String(s)) => Value::Uri(s.clone()),
        (PrimitiveKind::Bytes, Json::String(s)) => Value::Bytes(s.as_bytes().to_vec()),
        _ => return None,
    })
}

fn non_finite_text(d: f64) -> &'static str {
    if d.is_nan() {
        "NaN"
    } else if d.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Long(l) => write!(f, "{l}"),
            Self::Double(d) if d.is_finite() => write!(f, "{d}"),
            Self::Double(d) => f.write_str(non_finite_text(*d)),
            Self::String(s) | Self::DateTime(s) | Self::Guid(s) | Self::Uri(s) => f.write_str(s),
            Self::Duration(secs) => {
                let sign = if *secs < 0 { "-" } else { "" };
                let abs = secs.unsigned_abs();
                write!(
                    f,
                    "{sign}{:02}:{:02}:{:02}",
                    abs / 3600,
                    (abs % 3600) / 60,
                    abs % 60
                )
            }
            Self::Bytes(bytes) => f.write_str(&hex(bytes)),
            Self::Sequence(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Self::Record(fields) => {
                f.write_str("{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}
