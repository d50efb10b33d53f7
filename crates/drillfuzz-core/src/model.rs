//! Fuzzing data model: operations, calls, suites and seeds

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scrub::scrub_message;
use crate::types::{TypeDescriptor, TypeRegistry};
use crate::value::Value;

/// HTTP verb of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Case-insensitive parse of a verb name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            "PATCH" => Some(Self::Patch),
            "HEAD" => Some(Self::Head),
            "OPTIONS" => Some(Self::Options),
            _ => None,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an HTTP invoker binds a parameter. Ignored by non-HTTP invokers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ParamLocation {
    Path,
    #[default]
    Query,
    Header,
    Body,
}

/// Declared operation parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
    #[serde(default)]
    pub location: ParamLocation,
}

impl Parameter {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            ty,
            location: ParamLocation::default(),
        }
    }

    #[must_use]
    pub fn at(mut self, location: ParamLocation) -> Self {
        self.location = location;
        self
    }
}

/// One invokable endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    pub http_method: HttpMethod,
    /// URL template for HTTP dispatch, e.g. `/users/{id}`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl Operation {
    #[must_use]
    pub fn new(name: impl Into<String>, http_method: HttpMethod) -> Self {
        Self {
            name: name.into(),
            http_method,
            path: String::new(),
            parameters: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }
}

/// Ordered operation list plus the named types its parameters reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    operations: Vec<Operation>,
    #[serde(default)]
    registry: TypeRegistry,
}

impl Catalog {
    /// Operations are ordered by name so permutation order is stable.
    #[must_use]
    pub fn new(mut operations: Vec<Operation>) -> Self {
        operations.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            operations,
            registry: TypeRegistry::new(),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    #[must_use]
    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.name == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// A parameter bound to a concrete value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ParameterValue {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
    pub value: Value,
}

impl ParameterValue {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: TypeDescriptor, value: Value) -> Self {
        Self {
            name: name.into(),
            ty,
            value,
        }
    }
}

/// Target exception reduced to stable, diffable fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SimplifiedException {
    pub status_code: u16,
    /// Message with trace ids and timestamps removed
    pub message: String,
    pub type_name: String,
}

impl SimplifiedException {
    /// Build from a raw target message; the message is scrubbed.
    #[must_use]
    pub fn new(status_code: u16, message: &str, type_name: impl Into<String>) -> Self {
        Self {
            status_code,
            message: scrub_message(message),
            type_name: type_name.into(),
        }
    }
}

/// Outcome of one executed call: a response or a captured exception, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallResult {
    Response(serde_json::Value),
    Exception(SimplifiedException),
}

impl CallResult {
    #[must_use]
    pub fn exception(&self) -> Option<&SimplifiedException> {
        match self {
            Self::Exception(e) => Some(e),
            Self::Response(_) => None,
        }
    }

    /// Length of the serialized outcome.
    #[must_use]
    pub fn serialized_len(&self) -> usize {
        serde_json::to_string(self).map_or(0, |s| s.len())
    }
}

/// One positioned call inside a test suite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ApiCall {
    pub order_id: u32,
    pub method_name: String,
    pub http_method: HttpMethod,
    pub parameters: Vec<ParameterValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CallResult>,
}

impl ApiCall {
    #[must_use]
    pub fn new(
        order_id: u32,
        method_name: impl Into<String>,
        http_method: HttpMethod,
        parameters: Vec<ParameterValue>,
    ) -> Self {
        Self {
            order_id,
            method_name: method_name.into(),
            http_method,
            parameters,
            result: None,
        }
    }

    /// Unexecuted copy with a new order id and parameter list.
    #[must_use]
    pub fn derive(&self, order_id: u32, parameters: Vec<ParameterValue>) -> Self {
        Self {
            order_id,
            method_name: self.method_name.clone(),
            http_method: self.http_method,
            parameters,
            result: None,
        }
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParameterValue> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Overwrite a parameter value. Returns `false` if the call has no such parameter.
    pub fn set_param(&mut self, name: &str, value: Value) -> bool {
        match self.parameters.iter_mut().find(|p| p.name == name) {
            Some(p) => {
                p.value = value;
                true
            }
            None => false,
        }
    }

    /// Overwrite a parameter from JSON, converted to the parameter's declared type.
    pub fn set_param_json(&mut self, name: &str, json: &serde_json::Value) -> bool {
        match self.parameters.iter_mut().find(|p| p.name == name) {
            Some(p) => {
                p.value = Value::from_json_as(json, &p.ty);
                true
            }
            None => false,
        }
    }

    /// Parameter values keyed by name.
    #[must_use]
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }

    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.result.is_some()
    }

    #[must_use]
    pub fn exception(&self) -> Option<&SimplifiedException> {
        self.result.as_ref().and_then(CallResult::exception)
    }

    #[must_use]
    pub fn response(&self) -> Option<&serde_json::Value> {
        match &self.result {
            Some(CallResult::Response(r)) => Some(r),
            _ => None,
        }
    }
}

/// One permutation of operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TestSuite {
    pub order_id: u32,
    pub api_calls: Vec<ApiCall>,
    #[serde(default)]
    pub coverage_percentage: f64,
}

impl TestSuite {
    #[must_use]
    pub fn new(order_id: u32, api_calls: Vec<ApiCall>) -> Self {
        Self {
            order_id,
            api_calls,
            coverage_percentage: 0.0,
        }
    }

    /// Canonical call order: order id, then method name, then parameter values.
    ///
    /// Derived calls may share an order id; the value tiebreak makes the order
    /// independent of the order calls were appended in.
    pub fn sort_calls(&mut self) {
        self.api_calls.sort_by_cached_key(|c| {
            let args: Vec<String> = c
                .parameters
                .iter()
                .map(|p| format!("{}={}:{}", p.name, p.value.kind_name(), p.value))
                .collect();
            (c.order_id, c.method_name.clone(), args)
        });
    }
}

/// Complete output of one fuzzing pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FuzzerTests {
    pub seed: u64,
    pub test_suites: Vec<TestSuite>,
}

impl FuzzerTests {
    #[must_use]
    pub fn new(seed: u64, test_suites: Vec<TestSuite>) -> Self {
        Self { seed, test_suites }
    }

    /// Sort calls within each suite, then suites by order id.
    pub fn sort(&mut self) {
        for suite in &mut self.test_suites {
            suite.sort_calls();
        }
        self.test_suites.sort_by_key(|s| s.order_id);
    }

    pub fn calls(&self) -> impl Iterator<Item = &ApiCall> {
        self.test_suites.iter().flat_map(|s| s.api_calls.iter())
    }

    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.test_suites.iter().map(|s| s.api_calls.len()).sum()
    }

    #[must_use]
    pub fn exception_count(&self) -> usize {
        self.calls().filter(|c| c.exception().is_some()).count()
    }
}

/// Unit of work for the mutation loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSeed {
    pub id: Uuid,
    /// Operation these values are bound to
    pub operation: String,
    pub values: BTreeMap<String, Value>,
    pub fitness_score: i32,
    pub times_used: u32,
    pub created_at: DateTime<Utc>,
    pub is_interesting: bool,
}

impl InputSeed {
    #[must_use]
    pub fn new(operation: impl Into<String>, values: BTreeMap<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation: operation.into(),
            values,
            fitness_score: 0,
            times_used: 0,
            created_at: Utc::now(),
            is_interesting: false,
        }
    }

    #[must_use]
    pub fn from_call(call: &ApiCall) -> Self {
        Self::new(call.method_name.clone(), call.values())
    }

    #[must_use]
    pub fn with_fitness(mut self, fitness_score: i32) -> Self {
        self.fitness_score = fitness_score;
        self
    }

    /// Copy of the values and fitness under a fresh id.
    #[must_use]
    pub fn clone_fresh(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation: self.operation.clone(),
            values: self.values.clone(),
            fitness_score: self.fitness_score,
            times_used: 0,
            created_at: Utc::now(),
            is_interesting: false,
        }
    }

    /// Canonical `name=value|name=value` form, names sorted.
    #[must_use]
    pub fn canonical_key(&self) -> String {
        serialize_values(&self.values)
    }
}

/// Canonical serialization of a value map, used for deduplication.
#[must_use]
pub fn serialize_values(values: &BTreeMap<String, Value>) -> String {
    values
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("|")
}

/// JSON Schema of [`FuzzerTests`], the result interchange format.
#[must_use]
pub fn generate_schema() -> String {
    let schema = schemars::schema_for!(FuzzerTests);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
