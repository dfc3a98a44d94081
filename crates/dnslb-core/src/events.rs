use crate::resources::Object;

/// A change to one object, as handed to the relevance filter
///
/// `Updated` carries both snapshots; the old one is the last version seen on
/// the same watch. `Resynced` is the generic event of a forced resync.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Created(Object),
    Updated { old: Object, new: Object },
    Deleted(Object),
    Resynced(Object),
}

impl ChangeEvent {
    /// The post-change object (the last known state for deletions)
    pub fn object(&self) -> &Object {
        match self {
            ChangeEvent::Created(obj) | ChangeEvent::Deleted(obj) | ChangeEvent::Resynced(obj) => {
                obj
            }
            ChangeEvent::Updated { new, .. } => new,
        }
    }

    /// Consume the event, keeping the post-change object
    pub fn into_object(self) -> Object {
        match self {
            ChangeEvent::Created(obj) | ChangeEvent::Deleted(obj) | ChangeEvent::Resynced(obj) => {
                obj
            }
            ChangeEvent::Updated { new, .. } => new,
        }
    }

    /// Short name for log lines
    pub fn action(&self) -> &'static str {
        match self {
            ChangeEvent::Created(_) => "created",
            ChangeEvent::Updated { .. } => "updated",
            ChangeEvent::Deleted(_) => "deleted",
            ChangeEvent::Resynced(_) => "resynced",
        }
    }
}
