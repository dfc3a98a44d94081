use crate::{DnslbError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The core/v1 kinds the controller watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Service,
    Pod,
    Node,
}

impl ResourceKind {
    /// Kind name as it appears in `kind:` fields
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Service => "Service",
            ResourceKind::Pod => "Pod",
            ResourceKind::Node => "Node",
        }
    }

    /// Nodes are cluster-scoped, everything else lives in a namespace
    pub fn is_namespaced(&self) -> bool {
        !matches!(self, ResourceKind::Node)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = DnslbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Service" => Ok(ResourceKind::Service),
            "Pod" => Ok(ResourceKind::Pod),
            "Node" => Ok(ResourceKind::Node),
            other => Err(DnslbError::invalid_kind(other)),
        }
    }
}

/// ObjectKey identifies one object within its kind
///
/// Ordering is by namespace, then name, which is the order the platform
/// lists objects in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Namespace (empty for cluster-scoped objects)
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self {
            namespace: String::new(),
            name: name.into(),
        }
    }

    pub fn is_namespaced(&self) -> bool {
        !self.namespace.is_empty()
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_namespaced() {
            write!(f, "{}/{}", self.namespace, self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// A unit of work naming one Service to re-evaluate
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReconcileRequest {
    pub namespace: String,
    pub name: String,
}

impl ReconcileRequest {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// The key of the Service this request names
    pub fn object_key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }
}

impl From<ObjectKey> for ReconcileRequest {
    fn from(key: ObjectKey) -> Self {
        Self {
            namespace: key.namespace,
            name: key.name,
        }
    }
}

impl fmt::Display for ReconcileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_key_is_cluster_scoped() {
        assert!(!ResourceKind::Node.is_namespaced());
        assert!(ResourceKind::Pod.is_namespaced());
        let key = ObjectKey::cluster_scoped("node-1");
        assert!(!key.is_namespaced());
        assert_eq!(key.to_string(), "node-1");
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("Pod".parse::<ResourceKind>().unwrap(), ResourceKind::Pod);
        assert!("Deployment".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_object_key_ordering() {
        let mut keys = vec![
            ObjectKey::new("b", "a"),
            ObjectKey::new("a", "z"),
            ObjectKey::new("a", "b"),
        ];
        keys.sort();
        assert_eq!(keys[0], ObjectKey::new("a", "b"));
        assert_eq!(keys[2], ObjectKey::new("b", "a"));
    }

    #[test]
    fn test_reconcile_request_display() {
        let req = ReconcileRequest::new("ns", "web");
        assert_eq!(req.to_string(), "ns/web");
        assert_eq!(req.object_key(), ObjectKey::new("ns", "web"));
    }
}
