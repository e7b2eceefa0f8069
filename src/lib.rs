pub mod config;
pub mod core;
pub mod index;
pub mod source;
pub mod storage;

pub use crate::config::SessionConf;
pub use crate::core::{
    fingerprint, signature, FileDescriptor, FileIdTracker, Relation, SignatureComputer,
    SourceError, SourceResult,
};
pub use crate::index::{check_freshness, refresh_entry, Freshness};
pub use crate::source::{
    BuilderCatalog, DatasetHandle, DefaultFileBasedSource, FileBasedRelationView,
    FileBasedSourceProvider, SourceContext, SourceProvider, SourceProviderRegistry,
};
pub use crate::storage::{IndexLogEntry, MetadataStore};
