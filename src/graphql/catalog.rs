//! Operation metadata discovered from the platform's bundled web client.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

use crate::{Error, Result};

/// Whether an operation reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "query" => Some(Self::Query),
            "mutation" => Some(Self::Mutation),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => f.write_str("query"),
            Self::Mutation => f.write_str("mutation"),
        }
    }
}

/// Everything needed to address one named operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub name: String,
    pub query_id: String,
    pub kind: OperationKind,
    pub feature_switches: BTreeSet<String>,
    pub field_toggles: BTreeSet<String>,
}

/// Shape of one operation as the web client exposes it.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOperation {
    operation_name: String,
    query_id: String,
    operation_type: String,
    #[serde(default)]
    metadata: RawMetadata,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    #[serde(default)]
    feature_switches: Vec<String>,
    #[serde(default)]
    field_toggles: Vec<String>,
}

/// Immutable snapshot of the operations known to the web client.
#[derive(Debug, Clone, Default)]
pub struct OperationCatalog {
    operations: Vec<OperationDescriptor>,
}

impl OperationCatalog {
    pub fn new(operations: Vec<OperationDescriptor>) -> Self {
        Self { operations }
    }

    /// Decode the operation list read back from the page.
    ///
    /// A non-array value means the client bundle has not populated the list yet
    /// and is reported as a retryable [`Error::Discovery`]. Individual entries
    /// that do not decode, or that have an operation type other than query or
    /// mutation, are dropped.
    pub fn from_snapshot(raw: &Value) -> Result<Self> {
        let entries = raw
            .as_array()
            .ok_or_else(|| Error::Discovery("operation list is not available".into()))?;
        if entries.is_empty() {
            return Err(Error::Discovery("operation list is empty".into()));
        }

        let mut operations = Vec::with_capacity(entries.len());
        for entry in entries {
            let op: RawOperation = match serde_json::from_value(entry.clone()) {
                Ok(op) => op,
                Err(e) => {
                    debug!("skipping undecodable operation: {}", e);
                    continue;
                }
            };
            let Some(kind) = OperationKind::parse(&op.operation_type) else {
                debug!(
                    "skipping {} with operation type '{}'",
                    op.operation_name, op.operation_type
                );
                continue;
            };
            operations.push(OperationDescriptor {
                name: op.operation_name,
                query_id: op.query_id,
                kind,
                feature_switches: op.metadata.feature_switches.into_iter().collect(),
                field_toggles: op.metadata.field_toggles.into_iter().collect(),
            });
        }
        Ok(Self { operations })
    }

    /// Find the single descriptor registered under `name`.
    pub fn lookup(&self, name: &str) -> Result<&OperationDescriptor> {
        let mut matches = self.operations.iter().filter(|op| op.name == name);
        let first = matches
            .next()
            .ok_or_else(|| Error::UnknownOperation(name.to_string()))?;
        let extra = matches.count();
        if extra > 0 {
            return Err(Error::AmbiguousOperation {
                name: name.to_string(),
                count: extra + 1,
            });
        }
        Ok(first)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.operations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> Value {
        json!([
            {
                "operationName": "SearchTimeline",
                "queryId": "q-search",
                "operationType": "query",
                "metadata": {
                    "featureSwitches": ["a", "b"],
                    "fieldToggles": ["withArticleRichContentState"]
                }
            },
            {
                "operationName": "CreateTweet",
                "queryId": "q-create",
                "operationType": "mutation",
                "metadata": { "featureSwitches": [], "fieldToggles": [] }
            },
            {
                "operationName": "Live",
                "queryId": "q-live",
                "operationType": "subscription"
            },
            { "queryId": "no-name" }
        ])
    }

    #[test]
    fn test_from_snapshot() {
        let catalog = OperationCatalog::from_snapshot(&snapshot()).unwrap();
        assert_eq!(catalog.len(), 2);

        let search = catalog.lookup("SearchTimeline").unwrap();
        assert_eq!(search.query_id, "q-search");
        assert_eq!(search.kind, OperationKind::Query);
        assert!(search.feature_switches.contains("b"));
        assert!(search.field_toggles.contains("withArticleRichContentState"));

        let create = catalog.lookup("CreateTweet").unwrap();
        assert_eq!(create.kind, OperationKind::Mutation);
    }

    #[test]
    fn test_missing_metadata_defaults_empty() {
        let raw = json!([{ "operationName": "X", "queryId": "1", "operationType": "query" }]);
        let catalog = OperationCatalog::from_snapshot(&raw).unwrap();
        let op = catalog.lookup("X").unwrap();
        assert!(op.feature_switches.is_empty());
        assert!(op.field_toggles.is_empty());
    }

    #[test]
    fn test_unknown_operation() {
        let catalog = OperationCatalog::from_snapshot(&snapshot()).unwrap();
        assert!(matches!(
            catalog.lookup("Live"),
            Err(Error::UnknownOperation(name)) if name == "Live"
        ));
    }

    #[test]
    fn test_ambiguous_operation() {
        let raw = json!([
            { "operationName": "Dup", "queryId": "1", "operationType": "query" },
            { "operationName": "Dup", "queryId": "2", "operationType": "query" }
        ]);
        let catalog = OperationCatalog::from_snapshot(&raw).unwrap();
        assert!(matches!(
            catalog.lookup("Dup"),
            Err(Error::AmbiguousOperation { count: 2, .. })
        ));
    }

    #[test]
    fn test_absent_globals_are_retryable() {
        let err = OperationCatalog::from_snapshot(&Value::Null).unwrap_err();
        assert!(err.is_retryable());
        let err = OperationCatalog::from_snapshot(&json!([])).unwrap_err();
        assert!(err.is_retryable());
    }
}
