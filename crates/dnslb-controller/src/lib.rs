// Allow unused assignments for diagnostic fields - they're used by the thiserror/miette macros
#![allow(unused_assignments)]

pub mod context;
pub mod controller;
pub mod error;
pub mod fields;
pub mod filter;
pub mod kube_client;
pub mod mapper;
pub mod mock;
pub mod reconciler;
pub mod traits;
pub mod watch;

// Re-export primary types
pub use context::Deadline;
pub use error::{ControllerError, Result};
pub use fields::{FieldSelector, IndexedField};
pub use filter::{admits, is_relevant, is_relevant_update};
pub use mock::{MockCluster, MockOperation};
pub use traits::{ClusterClient, ListParams};

// Re-export the dispatch layer
pub use controller::{ControllerConfig, ServiceController};
pub use kube_client::KubeClient;
pub use mapper::{NodeMapper, PodMapper};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use watch::{admitted, ChangeTracker, Reflected, Stores, Watches};
