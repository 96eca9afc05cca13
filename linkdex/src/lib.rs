//! # Linkdex - Symlink-backed Secondary Indices
//!
//! Linkdex maintains secondary indices for a store that keeps every entity as
//! one file per primary key. Indices are plain directory trees placed next to
//! the entity files; symbolic links act as pointers, so an index survives a
//! restart without any rebuild and can be inspected with `ls`.
//!
//! ## Key Features
//!
//! - **Unique indices**: one link per value, uniqueness from atomic symlink creation
//! - **Normal indices**: one directory per value holding a link per member
//! - **Backlinks**: a per-type primary index remembers every entry of an entity
//!   and removes all of them in one cascading delete
//! - **Glob search**: `*`, `?` and `[...]` patterns over the indexed values
//! - **Custom strategies**: anything implementing [`IndexProvider`](index::IndexProvider)
//!
//! ## On-disk Layout
//!
//! ```text
//! <data_dir>/
//!   <entity dir>/<primary key>
//!   index.disk/
//!     <Type>By<Field>/<value>                 unique entry
//!     <Type>By<Field>/<value>/<primary key>   normal entry
//!     <Type>Primary/<primary key>/<value>     backlink
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use linkdex::entity::Record;
//! use linkdex::manager::IndexManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = IndexManager::builder()
//!     .data_dir("/var/lib/app/data")
//!     .build()?;
//!
//! manager.add_unique_index("User", "Email", "users")?;
//! manager.add_normal_index("User", "Team", "users")?;
//! manager.add_primary_index("User", "users")?;
//!
//! let user = Record::new("User")
//!     .with("Email", "mikey@example.com")
//!     .with("Team", "core");
//! manager.add("abcdefg-123", &user)?;
//!
//! let id = manager.find("User", "Email", "mikey@example.com")?;
//! let team = manager.find_all("User", "Team", "core")?;
//!
//! manager.delete("User", &id)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`common`] - Constants, filesystem helpers, glob patterns and the lock registry
//! - [`config`] - Manager configuration
//! - [`entity`] - Value accessor implemented by the entity store
//! - [`errors`] - Error types and result definitions
//! - [`index`] - Unique, normal and primary index strategies
//! - [`manager`] - The index manager facade
//! - [`manager_builder`] - Fluent manager builder

pub mod common;
pub mod config;
pub mod entity;
pub mod errors;
pub mod index;
pub mod manager;
pub mod manager_builder;
