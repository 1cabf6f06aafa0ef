//! Local persistence: the metadata index

mod metadata;

pub use metadata::{MetadataIndex, MetadataStats};
