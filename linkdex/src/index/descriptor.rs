use crate::common::index_dir_name;
use std::path::{Path, PathBuf};

/// Describes where an index lives and what it indexes.
///
/// A descriptor binds one `(type, field)` pair to its entity directory and
/// its index root `<index_base_dir>/<Type>By<Field>`. It is immutable and
/// cheap to clone.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IndexDescriptor {
    index_type: String,
    type_name: String,
    index_by: String,
    files_dir: PathBuf,
    index_root_dir: PathBuf,
}

impl IndexDescriptor {
    /// Creates a descriptor.
    ///
    /// # Arguments
    /// * `index_type` - strategy name, e.g. [`UNIQUE_INDEX`](crate::common::UNIQUE_INDEX)
    /// * `type_name` - entity type, e.g. `"User"`
    /// * `index_by` - indexed field, e.g. `"Email"`
    /// * `files_dir` - directory holding one entity file per primary key
    /// * `index_base_dir` - directory holding all index roots
    pub fn new(
        index_type: &str,
        type_name: &str,
        index_by: &str,
        files_dir: impl Into<PathBuf>,
        index_base_dir: impl AsRef<Path>,
    ) -> Self {
        IndexDescriptor {
            index_type: index_type.to_string(),
            type_name: type_name.to_string(),
            index_by: index_by.to_string(),
            files_dir: files_dir.into(),
            index_root_dir: index_base_dir
                .as_ref()
                .join(index_dir_name(type_name, index_by)),
        }
    }

    pub fn index_type(&self) -> &str {
        &self.index_type
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn index_by(&self) -> &str {
        &self.index_by
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    pub fn index_root_dir(&self) -> &Path {
        &self.index_root_dir
    }

    /// Path of the entity file for `primary_key`.
    pub fn entity_path(&self, primary_key: &str) -> PathBuf {
        self.files_dir.join(primary_key)
    }

    /// Path of the index entry for `value`.
    pub fn entry_path(&self, value: &str) -> PathBuf {
        self.index_root_dir.join(value)
    }
}
