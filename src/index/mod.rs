pub mod freshness;

pub use freshness::{check_freshness, refresh_entry, Freshness};
