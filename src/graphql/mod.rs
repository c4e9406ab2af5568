//! Operation discovery and request construction for the platform's internal GraphQL API.

pub mod catalog;
pub mod flags;
pub mod request;

pub use catalog::{OperationCatalog, OperationDescriptor, OperationKind};
pub use flags::FeatureFlagState;
pub use request::{GraphqlRequest, HttpMethod, RequestBuilder};
