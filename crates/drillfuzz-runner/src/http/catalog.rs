//! OpenAPI document → operation catalog
//!
//! Component schemas become named entries in a [`TypeRegistry`], so `$ref`
//! cycles stay as [`TypeDescriptor::Named`] links instead of being expanded.

use std::path::Path;

use drillfuzz_core::{
    Catalog, Field, HttpMethod, Operation, ParamLocation, Parameter, PrimitiveKind, TypeDescriptor,
    TypeRegistry,
};
use serde_json::Value as Json;
use tracing::debug;

/// Parameter name used for JSON request bodies.
pub const BODY_PARAMETER: &str = "body";

const METHODS: [&str; 7] = ["get", "post", "put", "delete", "patch", "head", "options"];

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("No operations found in OpenAPI spec")]
    Empty,
}

/// Read and convert an OpenAPI file.
///
/// # Errors
///
/// Unreadable file, unparsable content, or a document without operations.
pub fn load_catalog(path: &Path) -> Result<Catalog, CatalogError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CatalogError::Io(format!("{}: {e}", path.display())))?;
    let spec = parse_spec(path, &content)?;
    catalog_from_spec(&spec)
}

/// Parse an OpenAPI spec from JSON or YAML.
///
/// `.yaml`/`.yml`/`.json` decide by extension; anything else is sniffed
/// (leading `{` → JSON, otherwise YAML).
///
/// # Errors
///
/// Returns [`CatalogError::Parse`] on invalid content.
pub fn parse_spec(path: &Path, content: &str) -> Result<Json, CatalogError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let yaml = |c: &str| {
        serde_yml::from_str(c).map_err(|e| CatalogError::Parse(format!("Invalid YAML: {e}")))
    };
    let json = |c: &str| {
        serde_json::from_str(c).map_err(|e| CatalogError::Parse(format!("Invalid JSON: {e}")))
    };

    match ext.as_str() {
        "yaml" | "yml" => yaml(content),
        "json" => json(content),
        _ if content.trim_start().starts_with('{') => json(content),
        _ => yaml(content),
    }
}

/// Build a catalog from a parsed OpenAPI document.
///
/// # Errors
///
/// Returns [`CatalogError::Empty`] when the document declares no operations.
pub fn catalog_from_spec(spec: &Json) -> Result<Catalog, CatalogError> {
    let mut registry = TypeRegistry::new();
    if let Some(schemas) = spec
        .pointer("/components/schemas")
        .and_then(Json::as_object)
    {
        for (name, schema) in schemas {
            registry.register(name.clone(), schema_to_type(schema, name));
        }
    }

    let mut operations = Vec::new();
    if let Some(paths) = spec.get("paths").and_then(Json::as_object) {
        for (path, item) in paths {
            for method in METHODS {
                if let Some(op) = item.get(method) {
                    operations.push(extract_operation(path, method, item, op));
                }
            }
        }
    }

    if operations.is_empty() {
        return Err(CatalogError::Empty);
    }
    debug!(operations = operations.len(), types = registry.len(), "catalog built");
    Ok(Catalog::new(operations).with_registry(registry))
}

/// `operationId`, else `{method}_{path with / as _}`.
#[must_use]
pub fn operation_name(method: &str, path: &str, op: &Json) -> String {
    match op.get("operationId").and_then(Json::as_str) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!("{method}_{}", path.replace('/', "_").trim_start_matches('_')),
    }
}

fn extract_operation(path: &str, method: &str, item: &Json, op: &Json) -> Operation {
    let http_method = HttpMethod::parse(method).unwrap_or(HttpMethod::Get);
    let mut operation =
        Operation::new(operation_name(method, path, op), http_method).with_path(path);

    // Path-level first, operation-level may redeclare
    for source in [item.get("parameters"), op.get("parameters")]
        .into_iter()
        .flatten()
    {
        for param in source.as_array().into_iter().flatten() {
            if let Some(p) = parse_parameter(param, &operation.name) {
                operation.parameters.retain(|existing| existing.name != p.name);
                operation.parameters.push(p);
            }
        }
    }

    if let Some(body) = op.get("requestBody") {
        if let Some(schema) = body.pointer("/content/application~1json/schema") {
            let mut ty = schema_to_type(schema, &format!("{}Body", operation.name));
            if !body.get("required").and_then(Json::as_bool).unwrap_or(false) {
                ty = TypeDescriptor::optional(ty);
            }
            operation = operation
                .with_parameter(Parameter::new(BODY_PARAMETER, ty).at(ParamLocation::Body));
        }
    }
    operation
}

fn parse_parameter(param: &Json, hint: &str) -> Option<Parameter> {
    let name = param.get("name")?.as_str()?.to_string();
    let location = match param.get("in")?.as_str()? {
        "path" => ParamLocation::Path,
        "query" => ParamLocation::Query,
        "header" => ParamLocation::Header,
        _ => return None,
    };
    let mut ty = param.get("schema").map_or_else(TypeDescriptor::string, |s| {
        schema_to_type(s, &format!("{hint}_{name}"))
    });
    let required = location == ParamLocation::Path
        || param.get("required").and_then(Json::as_bool).unwrap_or(false);
    if !required && !matches!(ty, TypeDescriptor::Optional { .. }) {
        ty = TypeDescriptor::optional(ty);
    }
    Some(Parameter::new(name, ty).at(location))
}

fn ref_name(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

fn is_nullable(schema: &Json) -> bool {
    schema.get("nullable").and_then(Json::as_bool).unwrap_or(false)
        || schema
            .get("type")
            .and_then(Json::as_array)
            .is_some_and(|types| types.iter().any(|t| t == "null"))
}

/// Declared type name, skipping `"null"` in 3.1 type arrays.
fn type_name(schema: &Json) -> Option<&str> {
    match schema.get("type")? {
        Json::String(s) => Some(s.as_str()),
        Json::Array(types) => types.iter().filter_map(Json::as_str).find(|t| *t != "null"),
        _ => None,
    }
}

/// JSON Schema → type descriptor. `name` labels inline objects.
#[must_use]
pub fn schema_to_type(schema: &Json, name: &str) -> TypeDescriptor {
    let ty = non_null_type(schema, name);
    if is_nullable(schema) {
        TypeDescriptor::optional(ty)
    } else {
        ty
    }
}

fn non_null_type(schema: &Json, name: &str) -> TypeDescriptor {
    if let Some(reference) = schema.get("$ref").and_then(Json::as_str) {
        return TypeDescriptor::named(ref_name(reference));
    }
    if let Some(values) = schema.get("enum").and_then(Json::as_array) {
        return TypeDescriptor::enumeration(values.iter().filter(|v| !v.is_null()).map(|v| {
            v.as_str().map_or_else(|| v.to_string(), str::to_string)
        }));
    }
    for combinator in ["allOf", "oneOf", "anyOf"] {
        if let Some(first) = schema
            .get(combinator)
            .and_then(Json::as_array)
            .and_then(|variants| variants.first())
        {
            return schema_to_type(first, name);
        }
    }

    let format = schema.get("format").and_then(Json::as_str).unwrap_or("");
    match type_name(schema) {
        Some("integer") if format == "int64" => TypeDescriptor::long(),
        Some("integer") => TypeDescriptor::int(),
        Some("number") => TypeDescriptor::double(),
        Some("boolean") => TypeDescriptor::bool(),
        Some("string") => TypeDescriptor::primitive(string_kind(format)),
        Some("array") => {
            let items = schema.get("items").cloned().unwrap_or(Json::Null);
            TypeDescriptor::sequence(schema_to_type(&items, &format!("{name}Item")))
        }
        Some("object") => object_type(schema, name),
        None if schema.get("properties").is_some() => object_type(schema, name),
        None => TypeDescriptor::string(),
        Some(other) => TypeDescriptor::opaque(other),
    }
}

fn string_kind(format: &str) -> PrimitiveKind {
    match format {
        "date-time" | "date" => PrimitiveKind::DateTime,
        "uuid" => PrimitiveKind::Guid,
        "binary" | "byte" => PrimitiveKind::Bytes,
        "uri" | "url" => PrimitiveKind::Uri,
        "email" => PrimitiveKind::Email,
        "duration" => PrimitiveKind::Duration,
        _ => PrimitiveKind::String,
    }
}

fn object_type(schema: &Json, name: &str) -> TypeDescriptor {
    let Some(properties) = schema.get("properties").and_then(Json::as_object) else {
        return match schema.get("additionalProperties") {
            Some(values @ Json::Object(_)) => TypeDescriptor::map(
                TypeDescriptor::string(),
                schema_to_type(values, &format!("{name}Value")),
            ),
            _ => TypeDescriptor::record(name, Vec::new()),
        };
    };

    let fields = properties
        .iter()
        .map(|(field, prop)| {
            let f = Field::new(field.clone(), schema_to_type(prop, &format!("{name}_{field}")));
            if prop.get("readOnly").and_then(Json::as_bool).unwrap_or(false) {
                f.read_only()
            } else {
                f
            }
        })
        .collect();
    TypeDescriptor::record(name, fields)
}
