//! Shared building blocks: layout constants, filesystem helpers, glob
//! matching and the in-process lock registry.

mod constants;
pub mod fs_utils;
mod glob;
mod lock;

pub use constants::*;
pub use glob::*;
pub use lock::*;
