use super::provider::init_index_root;
use super::{IndexDescriptor, IndexProvider};
use crate::common::fs_utils::{base_name, sorted_entry_names, symlink, symlink_exists, validate_component};
use crate::common::{GlobPattern, LockRegistry, UNIQUE_INDEX};
use crate::errors::{IndexError, IndexResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Index allowing exactly one entity per attribute value.
///
/// Every value is a symbolic link in the index root pointing at the entity
/// file that owns it. Link creation fails when the name is taken, which is
/// what enforces uniqueness without a lock.
///
/// ```text
/// /var/data/index.disk/UserByEmail/
/// ├── jacky@example.com -> /var/data/users/ewf4ofk-555
/// ├── jones@example.com -> /var/data/users/rulan54-777
/// └── mikey@example.com -> /var/data/users/abcdefg-123
/// ```
///
/// # Examples
///
/// ```rust,no_run
/// use linkdex::index::UniqueIndex;
///
/// # fn main() -> linkdex::errors::IndexResult<()> {
/// let index = UniqueIndex::new("User", "Email", "/var/data/users", "/var/data/index.disk");
/// index.init()?;
/// index.add("abcdefg-123", "mikey@example.com")?;
/// let entity = index.lookup("mikey@example.com")?;
/// assert!(entity.ends_with("abcdefg-123"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct UniqueIndex {
    inner: Arc<UniqueIndexInner>,
}

impl UniqueIndex {
    /// Creates the index. [`init`](Self::init) must be called before use.
    pub fn new(
        type_name: &str,
        index_by: &str,
        files_dir: impl Into<PathBuf>,
        index_base_dir: impl AsRef<Path>,
    ) -> Self {
        let descriptor =
            IndexDescriptor::new(UNIQUE_INDEX, type_name, index_by, files_dir, index_base_dir);
        UniqueIndex {
            inner: Arc::new(UniqueIndexInner {
                descriptor,
                locks: LockRegistry::new(),
            }),
        }
    }

    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.inner.descriptor
    }

    pub fn init(&self) -> IndexResult<()> {
        init_index_root(&self.inner.descriptor)
    }

    /// Links `value` to the entity file of `primary_key`.
    ///
    /// Returns the created entry path. Fails with `AlreadyExists` when the
    /// value is taken; the existing link is left as it is.
    pub fn add(&self, primary_key: &str, value: &str) -> IndexResult<PathBuf> {
        self.inner.add(primary_key, value)
    }

    /// Removes the entry for `value`.
    pub fn remove(&self, value: &str) -> IndexResult<()> {
        self.inner.remove(value)
    }

    /// Returns the entity file path `value` points to.
    pub fn lookup(&self, value: &str) -> IndexResult<PathBuf> {
        self.inner.lookup(value)
    }

    /// Renames the entry of `old_value` to `new_value` in one `rename`.
    pub fn update(&self, old_value: &str, new_value: &str) -> IndexResult<()> {
        self.inner.update(old_value, new_value).map(|_| ())
    }

    /// Entity file paths of all values matching `pattern`, ordered by value.
    pub fn search(&self, pattern: &str) -> IndexResult<Vec<PathBuf>> {
        self.inner.search(pattern)
    }
}

impl IndexProvider for UniqueIndex {
    fn descriptor(&self) -> &IndexDescriptor {
        &self.inner.descriptor
    }

    fn init(&self) -> IndexResult<()> {
        UniqueIndex::init(self)
    }

    fn add(&self, primary_key: &str, value: &str) -> IndexResult<PathBuf> {
        self.inner.add(primary_key, value)
    }

    fn lookup(&self, value: &str) -> IndexResult<Vec<String>> {
        let target = self.inner.lookup(value)?;
        Ok(vec![base_name(&target)?])
    }

    /// An empty `primary_key` removes the entry whoever owns it.
    fn remove(&self, primary_key: &str, value: &str) -> IndexResult<()> {
        self.inner.ensure_owner(primary_key, value)?;
        self.inner.remove(value)
    }

    fn update(&self, primary_key: &str, old_value: &str, new_value: &str) -> IndexResult<PathBuf> {
        self.inner.ensure_owner(primary_key, old_value)?;
        self.inner.update(old_value, new_value)
    }

    fn search(&self, pattern: &str) -> IndexResult<Vec<PathBuf>> {
        self.inner.search(pattern)
    }
}

struct UniqueIndexInner {
    descriptor: IndexDescriptor,
    // keyed by value; keeps an in-process add from racing a rename onto the same name
    locks: LockRegistry,
}

impl UniqueIndexInner {
    fn not_found(&self, value: &str) -> IndexError {
        IndexError::not_found(self.descriptor.type_name(), self.descriptor.index_by(), value)
    }

    fn already_exists(&self, value: &str) -> IndexError {
        IndexError::already_exists(self.descriptor.type_name(), self.descriptor.index_by(), value)
    }

    fn add(&self, primary_key: &str, value: &str) -> IndexResult<PathBuf> {
        validate_component("primary key", primary_key)?;
        validate_component("value", value)?;

        let target = self.descriptor.entity_path(primary_key);
        let entry = self.descriptor.entry_path(value);

        self.locks.write_with(value, || match symlink(&target, &entry) {
            Ok(()) => {
                log::debug!("Linked {} -> {}", entry.display(), target.display());
                Ok(entry)
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(self.already_exists(value))
            }
            Err(err) => Err(err.into()),
        })
    }

    fn remove(&self, value: &str) -> IndexResult<()> {
        validate_component("value", value)?;
        let entry = self.descriptor.entry_path(value);

        self.locks.write_with(value, || -> IndexResult<_> {
            if !symlink_exists(&entry)? {
                return Err(self.not_found(value));
            }
            match fs::remove_file(&entry) {
                Ok(()) => {
                    log::debug!("Removed {}", entry.display());
                    Ok(())
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => Err(self.not_found(value)),
                Err(err) => Err(err.into()),
            }
        })
    }

    fn lookup(&self, value: &str) -> IndexResult<PathBuf> {
        validate_component("value", value)?;
        let entry = self.descriptor.entry_path(value);

        if !symlink_exists(&entry)? {
            return Err(self.not_found(value));
        }
        match fs::read_link(&entry) {
            Ok(target) => Ok(target),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(self.not_found(value)),
            Err(err) => Err(err.into()),
        }
    }

    fn update(&self, old_value: &str, new_value: &str) -> IndexResult<PathBuf> {
        validate_component("value", old_value)?;
        validate_component("value", new_value)?;

        let old_entry = self.descriptor.entry_path(old_value);
        let new_entry = self.descriptor.entry_path(new_value);

        self.locks.write_pair_with(old_value, new_value, || -> IndexResult<_> {
            if !symlink_exists(&old_entry)? {
                return Err(self.not_found(old_value));
            }
            // rename(2) replaces silently, so the target is checked first
            match symlink_exists(&new_entry) {
                Ok(false) => {}
                Ok(true) => return Err(self.already_exists(new_value)),
                Err(err) if err.is_corruption() => return Err(self.already_exists(new_value)),
                Err(err) => return Err(err),
            }

            fs::rename(&old_entry, &new_entry)?;
            log::debug!("Renamed {} -> {}", old_entry.display(), new_entry.display());
            Ok(new_entry.clone())
        })
    }

    fn search(&self, pattern: &str) -> IndexResult<Vec<PathBuf>> {
        let glob = GlobPattern::new(pattern)?;
        let mut results = Vec::new();

        for name in sorted_entry_names(self.descriptor.index_root_dir())? {
            if !glob.matches(&name) {
                continue;
            }
            let entry = self.descriptor.entry_path(&name);
            if !symlink_exists(&entry)? {
                // removed since the listing
                continue;
            }
            match fs::read_link(&entry) {
                Ok(target) => results.push(target),
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            }
        }

        if results.is_empty() {
            return Err(self.not_found(pattern));
        }
        Ok(results)
    }

    /// Fails with `NotFound` unless `value` points at `primary_key`'s entity.
    fn ensure_owner(&self, primary_key: &str, value: &str) -> IndexResult<()> {
        if primary_key.is_empty() {
            return Ok(());
        }
        let target = self.lookup(value)?;
        if base_name(&target)? != primary_key {
            return Err(self.not_found(value));
        }
        Ok(())
    }
}
