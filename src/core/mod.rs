pub mod error;
pub mod fingerprint;
pub mod lineage;
pub mod partition;
pub mod relation;
pub mod schema;
pub mod signature;

pub use error::*;
pub use fingerprint::*;
pub use lineage::*;
pub use partition::*;
pub use relation::*;
pub use schema::*;
pub use signature::*;
