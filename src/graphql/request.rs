//! Pure request assembly: descriptor + flags + variables in, ready-to-send request out.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use super::{FeatureFlagState, OperationCatalog, OperationKind};
use crate::Result;

/// HTTP verb used to issue an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl From<OperationKind> for HttpMethod {
    fn from(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Query => Self::Get,
            OperationKind::Mutation => Self::Post,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully assembled GraphQL call.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphqlRequest {
    pub operation: String,
    pub method: HttpMethod,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub variables: Value,
    pub query_id: String,
    /// Present only when at least one allowed feature switch resolved.
    pub features: Option<BTreeMap<String, bool>>,
    /// Present only when at least one supplied toggle is allowed.
    pub field_toggles: Option<BTreeMap<String, bool>>,
}

impl GraphqlRequest {
    /// The request body: `variables`, `queryId`, then `features` / `fieldToggles` if set.
    pub fn body(&self) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert("variables".into(), self.variables.clone());
        body.insert("queryId".into(), Value::String(self.query_id.clone()));
        if let Some(ref features) = self.features {
            body.insert("features".into(), json!(features));
        }
        if let Some(ref toggles) = self.field_toggles {
            body.insert("fieldToggles".into(), json!(toggles));
        }
        body
    }

    /// Body entries as query parameters, each value JSON-encoded.
    pub fn query_params(&self) -> BTreeMap<String, String> {
        self.body()
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect()
    }

    /// The argument handed to the web client's dispatcher.
    ///
    /// GET requests carry the body as `params`, POST requests as `data`.
    pub fn dispatch_payload(&self) -> Value {
        let mut payload = json!({
            "headers": self.headers,
            "method": self.method.as_str(),
            "path": self.path,
        });
        match self.method {
            HttpMethod::Get => payload["params"] = json!(self.query_params()),
            HttpMethod::Post => payload["data"] = Value::Object(self.body()),
        }
        payload
    }
}

/// Builds requests against a discovered catalog and flag snapshot.
#[derive(Debug, Clone, Copy)]
pub struct RequestBuilder<'a> {
    catalog: &'a OperationCatalog,
    flags: &'a FeatureFlagState,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(catalog: &'a OperationCatalog, flags: &'a FeatureFlagState) -> Self {
        Self { catalog, flags }
    }

    /// Build a request for `operation`.
    ///
    /// Toggles the operation does not accept are dropped silently.
    pub fn build(
        &self,
        operation: &str,
        variables: Value,
        field_toggles: &BTreeMap<String, bool>,
    ) -> Result<GraphqlRequest> {
        let descriptor = self.catalog.lookup(operation)?;

        let features = self.flags.resolve(&descriptor.feature_switches);
        let toggles: BTreeMap<String, bool> = field_toggles
            .iter()
            .filter(|(name, _)| descriptor.field_toggles.contains(*name))
            .map(|(name, value)| (name.clone(), *value))
            .collect();

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());

        Ok(GraphqlRequest {
            operation: descriptor.name.clone(),
            method: descriptor.kind.into(),
            path: format!("/graphql/{}/{}", descriptor.query_id, descriptor.name),
            headers,
            variables,
            query_id: descriptor.query_id.clone(),
            features: (!features.is_empty()).then_some(features),
            field_toggles: (!toggles.is_empty()).then_some(toggles),
        })
    }
}
