//! Read-only facts about the source library.
//!
//! These records are produced by an external scanner and are never mutated
//! during a run. The resolver only reads them.

mod types;

pub use types::{
    Fingerprint, GroupMetadata, ItemFacts, ItemGroup, ItemTags, SourceFormat, TechnicalInfo,
};
