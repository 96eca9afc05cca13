use crate::common::fs_utils::{dir_exists, ensure_dir};
use crate::errors::{ErrorKind, IndexError, IndexResult};
use crate::index::IndexDescriptor;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared handle to an index strategy.
///
/// `Index` wraps any [`IndexProvider`] behind an `Arc` so unique, normal and
/// custom strategies can sit side by side in the manager's registry. Cloning
/// is cheap and all clones operate on the same index. Provider methods are
/// reachable directly through `Deref`.
#[derive(Clone)]
pub struct Index {
    inner: Arc<dyn IndexProvider>,
}

/// Contract every index strategy implements.
///
/// An index is bound to one entity type and one field through its
/// [`IndexDescriptor`]. Values and primary keys are single path components;
/// implementations reject anything else with `InvalidValue` before touching
/// the filesystem.
pub trait IndexProvider: Send + Sync {
    /// Returns the descriptor this index was created with.
    fn descriptor(&self) -> &IndexDescriptor;

    /// Prepares the on-disk structure.
    ///
    /// # Behavior
    /// Must be idempotent: calling it again on a prepared index changes
    /// nothing and succeeds.
    ///
    /// # Errors
    /// `Precondition` when the entity files directory does not exist.
    fn init(&self) -> IndexResult<()>;

    /// Records that `primary_key` has `value` for the indexed field.
    ///
    /// # Returns
    /// The path of the created index entry. The manager records it with the
    /// type's backlink tracker.
    ///
    /// # Errors
    /// `AlreadyExists` when the entry is already present.
    fn add(&self, primary_key: &str, value: &str) -> IndexResult<PathBuf>;

    /// Resolves `value` to the primary keys holding it.
    ///
    /// # Returns
    /// A non-empty list in lexicographic order.
    ///
    /// # Errors
    /// `NotFound` when nothing holds `value`, `Corruption` when the entry is
    /// of the wrong kind.
    fn lookup(&self, value: &str) -> IndexResult<Vec<String>>;

    /// Removes the entry linking `value` to `primary_key`.
    ///
    /// # Errors
    /// `NotFound` when the entry is absent, `Corruption` when it is of the
    /// wrong kind.
    fn remove(&self, primary_key: &str, value: &str) -> IndexResult<()>;

    /// Moves the entry of `primary_key` from `old_value` to `new_value`.
    ///
    /// # Returns
    /// The path of the entry after the move.
    ///
    /// # Errors
    /// `NotFound` when `old_value` has no entry for the key and
    /// `AlreadyExists` when `new_value` already has one. The existing entry
    /// is never overwritten.
    fn update(&self, primary_key: &str, old_value: &str, new_value: &str) -> IndexResult<PathBuf>;

    /// Finds entries whose value matches a shell glob.
    ///
    /// # Returns
    /// Entity file paths ordered by value, then by primary key.
    ///
    /// # Errors
    /// `NotFound` when no value matches, `InvalidValue` for a bad pattern.
    fn search(&self, pattern: &str) -> IndexResult<Vec<PathBuf>>;
}

impl Index {
    pub fn new<T: IndexProvider + 'static>(inner: T) -> Self {
        Index {
            inner: Arc::new(inner),
        }
    }
}

impl Deref for Index {
    type Target = Arc<dyn IndexProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Shared `init` of directory-backed indices: checks the entity directory
/// and creates the index root.
pub(crate) fn init_index_root(descriptor: &IndexDescriptor) -> IndexResult<()> {
    let files_dir = descriptor.files_dir();
    let present = match dir_exists(files_dir) {
        Ok(present) => present,
        Err(err) if err.is_corruption() => false,
        Err(err) => return Err(err),
    };

    if !present {
        log::error!(
            "Cannot initialize index {}By{}: entity directory {} does not exist",
            descriptor.type_name(),
            descriptor.index_by(),
            files_dir.display()
        );
        return Err(IndexError::new(
            &format!(
                "Entity directory {} must exist before the index is initialized",
                files_dir.display()
            ),
            ErrorKind::Precondition,
        ));
    }

    ensure_dir(descriptor.index_root_dir())?;
    log::debug!(
        "Initialized {} index at {}",
        descriptor.index_type(),
        descriptor.index_root_dir().display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::UNIQUE_INDEX;
    use std::fs;
    use tempfile::tempdir;

    struct MockIndex {
        descriptor: IndexDescriptor,
    }

    impl IndexProvider for MockIndex {
        fn descriptor(&self) -> &IndexDescriptor {
            &self.descriptor
        }

        fn init(&self) -> IndexResult<()> {
            Ok(())
        }

        fn add(&self, _primary_key: &str, value: &str) -> IndexResult<PathBuf> {
            Ok(self.descriptor.entry_path(value))
        }

        fn lookup(&self, _value: &str) -> IndexResult<Vec<String>> {
            Ok(vec!["mock-1".to_string()])
        }

        fn remove(&self, _primary_key: &str, _value: &str) -> IndexResult<()> {
            Ok(())
        }

        fn update(&self, _pk: &str, _old: &str, new_value: &str) -> IndexResult<PathBuf> {
            Ok(self.descriptor.entry_path(new_value))
        }

        fn search(&self, _pattern: &str) -> IndexResult<Vec<PathBuf>> {
            Ok(vec![])
        }
    }

    fn mock_descriptor() -> IndexDescriptor {
        IndexDescriptor::new("mock", "User", "Email", "/data/users", "/data/index.disk")
    }

    #[test]
    fn test_handle_derefs_to_provider() {
        let index = Index::new(MockIndex {
            descriptor: mock_descriptor(),
        });
        assert_eq!(index.descriptor().index_type(), "mock");
        assert_eq!(index.lookup("x").unwrap(), vec!["mock-1"]);
        assert_eq!(
            index.add("pk", "v").unwrap(),
            PathBuf::from("/data/index.disk/UserByEmail/v")
        );
    }

    #[test]
    fn test_handle_clones_share_provider() {
        let index = Index::new(MockIndex {
            descriptor: mock_descriptor(),
        });
        let clone = index.clone();
        assert!(Arc::ptr_eq(&index.inner, &clone.inner));
    }

    #[test]
    fn test_init_index_root_requires_files_dir() {
        let dir = tempdir().unwrap();
        let descriptor = IndexDescriptor::new(
            UNIQUE_INDEX,
            "User",
            "Email",
            dir.path().join("users"),
            dir.path().join("index.disk"),
        );

        let err = init_index_root(&descriptor).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Precondition);
        assert!(!descriptor.index_root_dir().exists());

        fs::create_dir(descriptor.files_dir()).unwrap();
        init_index_root(&descriptor).unwrap();
        assert!(descriptor.index_root_dir().is_dir());
    }

    #[test]
    fn test_init_index_root_rejects_file_as_files_dir() {
        let dir = tempdir().unwrap();
        let files = dir.path().join("users");
        fs::write(&files, b"").unwrap();
        let descriptor =
            IndexDescriptor::new(UNIQUE_INDEX, "User", "Email", &files, dir.path().join("idx"));

        let err = init_index_root(&descriptor).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Precondition);
    }
}
