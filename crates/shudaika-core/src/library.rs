use crate::error::CoreError;
use crate::models::{LibraryItem, ProviderIds};

/// Source of the folders a sync runs over.
///
/// Implementations hand out only enabled entries and persist whatever
/// provider identifiers the sync resolves, so later runs skip the lookups.
pub trait MediaLibrary {
    fn entries(&self) -> Result<Vec<LibraryItem>, CoreError>;

    fn set_provider_ids(&self, item_id: i64, ids: &ProviderIds) -> Result<(), CoreError>;
}
