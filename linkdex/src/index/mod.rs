//! Index strategies.
//!
//! Every index lives in a directory tree next to the entity files and uses
//! symbolic links as pointers, so lookups need nothing but the filesystem.
//!
//! # Index Types
//!
//! - **Unique Index**: one link per value, pointing at the owning entity
//! - **Normal Index**: one directory per value, one link per member entity
//! - **Primary Index**: per entity, backlinks to every index entry
//!   referencing it; drives cascading deletes
//!
//! Custom strategies implement [`IndexProvider`] and are registered with the
//! manager through an [`Index`] handle.

mod descriptor;
mod normal_index;
mod primary_index;
mod provider;
pub(crate) mod registry;
mod unique_index;

#[cfg(test)]
pub(crate) mod test_support;

pub use descriptor::*;
pub use normal_index::*;
pub use primary_index::*;
pub use provider::{Index, IndexProvider};
pub use unique_index::*;
