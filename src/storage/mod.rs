pub mod metadata;

pub use metadata::{IndexLogEntry, MetadataStore};
