//! HTTP invoker over a reqwest blocking client
//!
//! Binds parameters by their declared location: path segments, query pairs,
//! headers, JSON body. Non-2xx answers are the target's API exceptions.

pub mod catalog;

pub use catalog::{CatalogError, catalog_from_spec, load_catalog, parse_spec, schema_to_type};

use std::collections::HashMap;
use std::time::Duration;

use drillfuzz_core::{Config, HttpMethod, Operation, ParamLocation, ParameterValue, Value};
use reqwest::Url;
use tracing::debug;

use crate::invoker::{InvocationError, Invoker};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Request assembled from an operation and its arguments, before sending.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

pub struct HttpInvoker {
    client: reqwest::blocking::Client,
    base_url: String,
    headers: HashMap<String, String>,
}

impl HttpInvoker {
    /// # Errors
    ///
    /// Returns [`InvocationError::Unexpected`] if the client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, InvocationError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// # Errors
    ///
    /// Returns [`InvocationError::Unexpected`] if the client cannot be built.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, InvocationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InvocationError::Unexpected(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            headers: HashMap::new(),
        })
    }

    /// Client for `config.base_url` sending `config.headers` on every request.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::Unexpected`] if the client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, InvocationError> {
        Ok(Self::new(config.base_url.clone())?.with_headers(config.headers.clone()))
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Bind `args` to the request shape declared by `operation`.
    ///
    /// Null values are left out of the query and headers; undeclared
    /// arguments go to the query string.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::Unexpected`] for an unusable base URL.
    pub fn prepare(
        &self,
        operation: &Operation,
        args: &[ParameterValue],
    ) -> Result<PreparedRequest, InvocationError> {
        let location = |name: &str| {
            operation
                .parameters
                .iter()
                .find(|p| p.name == name)
                .map_or(ParamLocation::Query, |p| p.location)
        };

        let mut url = Url::parse(&self.base_url).map_err(|e| {
            InvocationError::Unexpected(format!("invalid base URL '{}': {e}", self.base_url))
        })?;
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                InvocationError::Unexpected(format!("base URL '{}' cannot carry a path", self.base_url))
            })?;
            segments.pop_if_empty();
            for template in operation.path.split('/').filter(|s| !s.is_empty()) {
                let mut segment = template.to_string();
                for arg in args.iter().filter(|a| location(&a.name) == ParamLocation::Path) {
                    let value = param_string(&arg.value).unwrap_or_default();
                    segment = segment.replace(&format!("{{{}}}", arg.name), &value);
                }
                segments.push(&segment);
            }
        }

        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.sort();
        let mut body = None;
        for arg in args {
            match location(&arg.name) {
                ParamLocation::Path => {}
                ParamLocation::Query => {
                    if let Some(v) = param_string(&arg.value) {
                        url.query_pairs_mut().append_pair(&arg.name, &v);
                    }
                }
                ParamLocation::Header => {
                    if let Some(v) = param_string(&arg.value) {
                        headers.push((arg.name.clone(), v));
                    }
                }
                ParamLocation::Body => body = Some(arg.value.to_json()),
            }
        }

        Ok(PreparedRequest {
            method: operation.http_method,
            url,
            headers,
            body,
        })
    }

    fn send(&self, request: PreparedRequest) -> Result<serde_json::Value, InvocationError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| InvocationError::Unexpected(e.to_string()))?;
        let mut builder = self.client.request(method, request.url.clone());
        for (k, v) in &request.headers {
            // Values like "\r\n" from edge cases cannot be sent as headers at all
            if reqwest::header::HeaderValue::from_str(v).is_ok() {
                builder = builder.header(k, v);
            }
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .map_err(|e| InvocationError::Unexpected(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|e| InvocationError::Unexpected(e.to_string()))?;
        debug!(method = %request.method, url = %request.url, status, "response");
        classify(status, &text)
    }
}

impl Invoker for HttpInvoker {
    fn invoke(
        &self,
        operation: &Operation,
        args: &[ParameterValue],
    ) -> Result<serde_json::Value, InvocationError> {
        let request = self.prepare(operation, args)?;
        self.send(request)
    }
}

/// Text form of a parameter for paths, queries and headers. `None` for null.
#[must_use]
pub fn param_string(value: &Value) -> Option<String> {
    match value.to_json() {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// 2xx → parsed body (text if not JSON, null if empty); otherwise an API exception.
///
/// # Errors
///
/// Returns [`InvocationError::Api`] for non-2xx statuses.
pub fn classify(status: u16, body: &str) -> Result<serde_json::Value, InvocationError> {
    if !(200..300).contains(&status) {
        let message = if body.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            body.to_string()
        };
        return Err(InvocationError::api(status, message));
    }
    if body.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    Ok(serde_json::from_str(body).unwrap_or_else(|_| serde_json::Value::String(body.to_string())))
}
