//! dnslb Core - Object model shared by the dnslb controller and binary
//!
//! This crate provides:
//! - Accessors over the core/v1 Service, Pod and Node fields dnslb reads
//! - The closed `Object` union used for kind dispatch
//! - Change event types fed to the relevance filter
//! - Error types with miette diagnostics

pub mod error;
pub mod events;
pub mod resources;
pub mod types;

// Re-export commonly used types
pub use error::{DnslbError, Result};
pub use events::ChangeEvent;
pub use resources::{Object, Resource, StringMap, NODE_ADDRESS_ANNOTATION};
pub use types::{ObjectKey, ReconcileRequest, ResourceKind};

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::{Node, Pod, Service};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Serialize a resource to the JSON body of a write
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| {
        DnslbError::serialization_error(
            format!("Failed to serialize to JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}
