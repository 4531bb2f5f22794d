mod library;

pub use library::{DesiredFile, LibraryItem, MediaKind, OutputAxis, ProviderIds};
