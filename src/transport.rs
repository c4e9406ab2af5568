//! The "execute one GraphQL call" capability the collector depends on.

use async_trait::async_trait;
use serde_json::Value;

use crate::graphql::GraphqlRequest;
use crate::Result;

/// Executes an assembled request and returns the parsed JSON response.
///
/// Implementations must not retry or time out on their own; the collector
/// owns both. Failures should be reported as [`crate::Error::Transport`].
#[async_trait]
pub trait GraphqlTransport: Send + Sync {
    async fn execute(&self, request: &GraphqlRequest) -> Result<Value>;
}

