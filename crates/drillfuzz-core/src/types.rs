//! Parameter type descriptors
//!
//! A closed tagged union the value generator dispatches over. Named records live in a
//! [`TypeRegistry`] so self-referential shapes never need owning cycles.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Leaf kinds a generator knows how to build directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// Double precision float
    Double,
    Bool,
    String,
    /// RFC 3339 timestamp
    DateTime,
    /// Time span in whole seconds
    Duration,
    /// Version-4 shaped GUID
    Guid,
    /// Raw bytes (file uploads, binary bodies)
    Bytes,
    Uri,
    Email,
}

impl PrimitiveKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Long => "long",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::String => "string",
            Self::DateTime => "datetime",
            Self::Duration => "duration",
            Self::Guid => "guid",
            Self::Bytes => "bytes",
            Self::Uri => "uri",
            Self::Email => "email",
        }
    }

    /// Value kinds have a non-null zero value; reference kinds default to null.
    #[must_use]
    pub const fn is_value_kind(self) -> bool {
        !matches!(self, Self::String | Self::Bytes | Self::Uri | Self::Email)
    }

    /// Zero value used when construction is refused.
    #[must_use]
    pub fn default_value(self) -> Value {
        match self {
            Self::Int => Value::Int(0),
            Self::Long => Value::Long(0),
            Self::Double => Value::Double(0.0),
            Self::Bool => Value::Bool(false),
            Self::DateTime => Value::DateTime(MIN_DATE_TIME.to_string()),
            Self::Duration => Value::Duration(0),
            Self::Guid => Value::Guid(NIL_GUID.to_string()),
            Self::String | Self::Bytes | Self::Uri | Self::Email => Value::Null,
        }
    }
}

impl std::fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Zero timestamp for value-kind defaults.
pub const MIN_DATE_TIME: &str = "0001-01-01T00:00:00+00:00";

/// All-zero GUID.
pub const NIL_GUID: &str = "00000000-0000-0000-0000-000000000000";

/// A record field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
    /// Read-only fields are skipped during construction
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
}

impl Field {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            ty,
            read_only: false,
        }
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Shape of a parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDescriptor {
    Primitive { primitive: PrimitiveKind },
    Optional { inner: Box<TypeDescriptor> },
    Enum { values: Vec<String> },
    Sequence { element: Box<TypeDescriptor> },
    Map {
        key: Box<TypeDescriptor>,
        value: Box<TypeDescriptor>,
    },
    Record { name: String, fields: Vec<Field> },
    /// Reference to a record registered in a [`TypeRegistry`]
    Named { name: String },
    /// A type no generator can construct
    Opaque { name: String },
}

impl TypeDescriptor {
    #[must_use]
    pub const fn primitive(primitive: PrimitiveKind) -> Self {
        Self::Primitive { primitive }
    }

    #[must_use]
    pub const fn int() -> Self {
        Self::primitive(PrimitiveKind::Int)
    }

    #[must_use]
    pub const fn long() -> Self {
        Self::primitive(PrimitiveKind::Long)
    }

    #[must_use]
    pub const fn double() -> Self {
        Self::primitive(PrimitiveKind::Double)
    }

    #[must_use]
    pub const fn bool() -> Self {
        Self::primitive(PrimitiveKind::Bool)
    }

    #[must_use]
    pub const fn string() -> Self {
        Self::primitive(PrimitiveKind::String)
    }

    #[must_use]
    pub fn optional(inner: Self) -> Self {
        Self::Optional {
            inner: Box::new(inner),
        }
    }

    #[must_use]
    pub fn sequence(element: Self) -> Self {
        Self::Sequence {
            element: Box::new(element),
        }
    }

    #[must_use]
    pub fn map(key: Self, value: Self) -> Self {
        Self::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    #[must_use]
    pub fn enumeration<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Self::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn record(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self::Record {
            name: name.into(),
            fields,
        }
    }

    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named { name: name.into() }
    }

    #[must_use]
    pub fn opaque(name: impl Into<String>) -> Self {
        Self::Opaque { name: name.into() }
    }

    /// Identity used for cycle detection and display.
    ///
    /// Records and named references share their record name, so a named
    /// reference to a record under construction is recognized as re-entry.
    #[must_use]
    pub fn type_key(&self) -> String {
        match self {
            Self::Primitive { primitive } => primitive.as_str().to_string(),
            Self::Optional { inner } => format!("{}?", inner.type_key()),
            Self::Enum { values } => format!("enum({})", values.join("|")),
            Self::Sequence { element } => format!("[{}]", element.type_key()),
            Self::Map { key, value } => format!("{{{}: {}}}", key.type_key(), value.type_key()),
            Self::Record { name, .. } | Self::Named { name } | Self::Opaque { name } => {
                name.clone()
            }
        }
    }

    /// Zero value: numeric zero / `false` for value kinds, null for everything else.
    #[must_use]
    pub fn default_value(&self) -> Value {
        match self {
            Self::Primitive { primitive } => primitive.default_value(),
            Self::Enum { values } => values
                .first()
                .map_or(Value::Null, |v| Value::String(v.clone())),
            Self::Optional { .. }
            | Self::Sequence { .. }
            | Self::Map { .. }
            | Self::Record { .. }
            | Self::Named { .. }
            | Self::Opaque { .. } => Value::Null,
        }
    }

    /// Primitive kind after unwrapping `Optional`, if any.
    #[must_use]
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self {
            Self::Primitive { primitive } => Some(*primitive),
            Self::Optional { inner } => inner.primitive_kind(),
            _ => None,
        }
    }

    /// Whether `value` has a runtime shape this descriptor accepts.
    ///
    /// Named references are resolved through `registry`; unresolvable names accept nothing
    /// but null.
    #[must_use]
    pub fn accepts(&self, value: &Value, registry: &TypeRegistry) -> bool {
        self.accepts_inner(value, registry, 0)
    }

    fn accepts_inner(&self, value: &Value, registry: &TypeRegistry, depth: u32) -> bool {
        if depth > 32 {
            return true;
        }
        match (self, value) {
            (Self::Primitive { primitive }, v) => match (primitive, v) {
                (PrimitiveKind::Int, Value::Int(_))
                | (PrimitiveKind::Long, Value::Long(_))
                | (PrimitiveKind::Double, Value::Double(_))
                | (PrimitiveKind::Bool, Value::Bool(_))
                | (PrimitiveKind::String, Value::String(_))
                | (PrimitiveKind::Email, Value::String(_))
                | (PrimitiveKind::DateTime, Value::DateTime(_))
                | (PrimitiveKind::Duration, Value::Duration(_))
                | (PrimitiveKind::Guid, Value::Guid(_))
                | (PrimitiveKind::Bytes, Value::Bytes(_))
                | (PrimitiveKind::Uri, Value::Uri(_)) => true,
                (kind, Value::Null) => !kind.is_value_kind(),
                _ => false,
            },
            (Self::Optional { .. }, Value::Null) => true,
            (Self::Optional { inner }, v) => inner.accepts_inner(v, registry, depth + 1),
            (Self::Enum { values }, Value::String(s)) => values.contains(s),
            (Self::Sequence { element }, Value::Sequence(items)) => items
                .iter()
                .all(|item| element.accepts_inner(item, registry, depth + 1)),
            (Self::Map { key, value: val }, Value::Map(entries)) => {
                entries.iter().all(|(k, v)| {
                    key.accepts_inner(k, registry, depth + 1)
                        && val.accepts_inner(v, registry, depth + 1)
                })
            }
            (Self::Record { fields, .. }, Value::Record(map)) => map.iter().all(|(name, v)| {
                fields
                    .iter()
                    .find(|f| &f.name == name)
                    .is_some_and(|f| f.ty.accepts_inner(v, registry, depth + 1))
            }),
            (Self::Named { name }, v) => match (registry.resolve(name), v) {
                (_, Value::Null) => true,
                (Some(resolved), v) => resolved.accepts_inner(v, registry, depth + 1),
                (None, _) => false,
            },
            // Reference shapes accept null
            (
                Self::Sequence { .. } | Self::Map { .. } | Self::Record { .. },
                Value::Null,
            ) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.type_key())
    }
}

/// Named record definitions, resolved lazily by [`TypeDescriptor::Named`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeRegistry {
    types: BTreeMap<String, TypeDescriptor>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a named type.
    pub fn register(&mut self, name: impl Into<String>, ty: TypeDescriptor) {
        self.types.insert(name.into(), ty);
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.register(name, ty);
        self
    }

    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}
