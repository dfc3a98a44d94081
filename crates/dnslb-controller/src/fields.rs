//! Field predicates for list calls
//!
//! Services are selected by `spec.type` and pods by `status.phase`, the same
//! two fields the platform accepts in a `fieldSelector`.

use dnslb_core::resources::{pod_phase, service_type};
use dnslb_core::{Node, Pod, Resource, Service};

/// Fields a list call can be narrowed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexedField {
    ServiceType,
    PodPhase,
}

impl IndexedField {
    /// Field path as used in `fieldSelector`
    pub fn path(&self) -> &'static str {
        match self {
            IndexedField::ServiceType => "spec.type",
            IndexedField::PodPhase => "status.phase",
        }
    }
}

/// An equality predicate on one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelector {
    pub field: IndexedField,
    pub value: String,
}

impl FieldSelector {
    pub fn service_type(value: impl Into<String>) -> Self {
        Self {
            field: IndexedField::ServiceType,
            value: value.into(),
        }
    }

    pub fn pod_phase(value: impl Into<String>) -> Self {
        Self {
            field: IndexedField::PodPhase,
            value: value.into(),
        }
    }

    /// A selector on a field the object's kind does not carry never matches
    pub fn matches<R: Indexable>(&self, object: &R) -> bool {
        match object.index_value() {
            Some((field, value)) => field == self.field && value == self.value,
            None => false,
        }
    }
}

impl std::fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.field.path(), self.value)
    }
}

/// Kinds that carry a selectable field
pub trait Indexable: Resource {
    /// The field this kind carries, with the object's value for it
    fn index_value(&self) -> Option<(IndexedField, &str)>;
}

impl Indexable for Service {
    fn index_value(&self) -> Option<(IndexedField, &str)> {
        Some((IndexedField::ServiceType, service_type(self)))
    }
}

impl Indexable for Pod {
    fn index_value(&self) -> Option<(IndexedField, &str)> {
        Some((IndexedField::PodPhase, pod_phase(self)))
    }
}

impl Indexable for Node {
    fn index_value(&self) -> Option<(IndexedField, &str)> {
        None
    }
}
