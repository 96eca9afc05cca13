use crate::common::fs_utils::{
    dir_exists, ensure_dir, remove_dir_if_empty, sorted_entry_names, symlink, symlink_exists,
    validate_component,
};
use crate::common::{primary_dir_name, LockRegistry, PRIMARY_MARKER};
use crate::errors::{IndexError, IndexResult};
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Backlink tracker of one entity type.
///
/// For every primary key it keeps a directory of links back to the index
/// entries referencing that key, named by the indexed value. This makes it
/// possible to find and delete all entries of an entity without scanning
/// every index.
///
/// ```text
/// /var/data/index.disk/UserPrimary/ewf4ofk-555/
/// ├── jacky -> /var/data/index.disk/UserByUserName/jacky
/// └── jacky@example.com -> /var/data/index.disk/UserByEmail/jacky@example.com
/// ```
///
/// Backlinks are named by value only, so one key cannot track two entries
/// with the same value (say `UserName` and `Email` both `"jacky"`); the
/// second `add` fails with `AlreadyExists`. `IndexManager` checks for such
/// entities before it writes any entry.
#[derive(Clone)]
pub struct PrimaryIndex {
    inner: Arc<PrimaryIndexInner>,
}

impl PrimaryIndex {
    /// Creates the tracker for `type_name` under `index_base_dir`.
    pub fn new(type_name: &str, files_dir: impl Into<PathBuf>, index_base_dir: impl AsRef<Path>) -> Self {
        let index_base_dir = index_base_dir.as_ref().to_path_buf();
        PrimaryIndex {
            inner: Arc::new(PrimaryIndexInner {
                type_name: type_name.to_string(),
                files_dir: files_dir.into(),
                index_dir: index_base_dir.join(primary_dir_name(type_name)),
                index_base_dir,
                locks: LockRegistry::new(),
            }),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.inner.type_name
    }

    pub fn files_dir(&self) -> &Path {
        &self.inner.files_dir
    }

    /// Root of all backlink directories, `<base>/<Type>Primary`.
    pub fn index_dir(&self) -> &Path {
        &self.inner.index_dir
    }

    pub fn init(&self) -> IndexResult<()> {
        ensure_dir(&self.inner.index_dir)?;
        log::debug!("Initialized backlinks at {}", self.inner.index_dir.display());
        Ok(())
    }

    /// Records that the index entry at `entry_path` (holding `value`)
    /// references `primary_key`. Returns the backlink path.
    pub fn add(&self, primary_key: &str, value: &str, entry_path: &Path) -> IndexResult<PathBuf> {
        self.inner.add(primary_key, value, entry_path)
    }

    /// Every `(value, index entry)` referencing `primary_key`, ordered by value.
    pub fn entries(&self, primary_key: &str) -> IndexResult<Vec<(String, PathBuf)>> {
        self.inner.entries(primary_key)
    }

    /// Replaces the backlink named `old_value` by one named `new_value`
    /// pointing at `new_entry_path`.
    pub fn relink(
        &self,
        primary_key: &str,
        old_value: &str,
        new_value: &str,
        new_entry_path: &Path,
    ) -> IndexResult<()> {
        self.inner.relink(primary_key, old_value, new_value, new_entry_path)
    }

    /// Removes every index entry referencing `primary_key`, then its
    /// backlinks.
    ///
    /// Not atomic: when a step fails, entries handled before the failure
    /// stay removed and the rest stay in place, together with their
    /// backlinks, so calling `delete` again continues where it stopped.
    pub fn delete(&self, primary_key: &str) -> IndexResult<()> {
        self.inner.delete(primary_key)
    }
}

struct PrimaryIndexInner {
    type_name: String,
    files_dir: PathBuf,
    index_dir: PathBuf,
    index_base_dir: PathBuf,
    // keyed by primary key
    locks: LockRegistry,
}

impl PrimaryIndexInner {
    fn key_dir(&self, primary_key: &str) -> PathBuf {
        self.index_dir.join(primary_key)
    }

    fn not_found(&self, primary_key: &str) -> IndexError {
        IndexError::not_found(&self.type_name, PRIMARY_MARKER, primary_key)
    }

    fn add(&self, primary_key: &str, value: &str, entry_path: &Path) -> IndexResult<PathBuf> {
        validate_component("primary key", primary_key)?;
        validate_component("value", value)?;

        let key_dir = self.key_dir(primary_key);
        let backlink = key_dir.join(value);

        self.locks.write_with(primary_key, || -> IndexResult<_> {
            ensure_dir(&key_dir)?;
            match symlink(entry_path, &backlink) {
                Ok(()) => {
                    log::debug!("Backlinked {} -> {}", backlink.display(), entry_path.display());
                    Ok(backlink)
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Err(
                    IndexError::already_exists(&self.type_name, PRIMARY_MARKER, value),
                ),
                Err(err) => Err(err.into()),
            }
        })
    }

    fn entries(&self, primary_key: &str) -> IndexResult<Vec<(String, PathBuf)>> {
        validate_component("primary key", primary_key)?;
        let key_dir = self.key_dir(primary_key);

        self.locks.read_with(primary_key, || -> IndexResult<_> {
            if !dir_exists(&key_dir)? {
                return Err(self.not_found(primary_key));
            }

            let mut entries = Vec::new();
            for value in sorted_entry_names(&key_dir)? {
                let backlink = key_dir.join(&value);
                if !symlink_exists(&backlink)? {
                    continue;
                }
                entries.push((value, fs::read_link(&backlink)?));
            }
            Ok(entries)
        })
    }

    fn relink(
        &self,
        primary_key: &str,
        old_value: &str,
        new_value: &str,
        new_entry_path: &Path,
    ) -> IndexResult<()> {
        validate_component("primary key", primary_key)?;
        validate_component("value", old_value)?;
        validate_component("value", new_value)?;

        let key_dir = self.key_dir(primary_key);
        let old_link = key_dir.join(old_value);
        let new_link = key_dir.join(new_value);

        self.locks.write_with(primary_key, || -> IndexResult<_> {
            if !dir_exists(&key_dir)? || !symlink_exists(&old_link)? {
                return Err(IndexError::not_found(&self.type_name, PRIMARY_MARKER, old_value));
            }

            if old_value == new_value {
                fs::remove_file(&old_link)?;
                symlink(new_entry_path, &new_link)?;
            } else {
                match symlink(new_entry_path, &new_link) {
                    Ok(()) => {}
                    Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                        return Err(IndexError::already_exists(
                            &self.type_name,
                            PRIMARY_MARKER,
                            new_value,
                        ))
                    }
                    Err(err) => return Err(err.into()),
                }
                fs::remove_file(&old_link)?;
            }

            log::debug!("Backlink {} now {} -> {}", old_link.display(), new_link.display(), new_entry_path.display());
            Ok(())
        })
    }

    fn delete(&self, primary_key: &str) -> IndexResult<()> {
        validate_component("primary key", primary_key)?;
        let key_dir = self.key_dir(primary_key);

        self.locks.write_with(primary_key, || -> IndexResult<_> {
            if !dir_exists(&key_dir)? {
                return Err(self.not_found(primary_key));
            }

            for value in sorted_entry_names(&key_dir)? {
                let backlink = key_dir.join(&value);
                if !symlink_exists(&backlink)? {
                    continue;
                }

                let entry = fs::read_link(&backlink)?;
                self.remove_entry(primary_key, &entry)?;
                fs::remove_file(&backlink)?;
            }

            fs::remove_dir(&key_dir)?;
            log::debug!("Deleted all index entries of {} {}", self.type_name, primary_key);
            Ok(())
        })
    }

    fn remove_entry(&self, primary_key: &str, entry: &Path) -> IndexResult<()> {
        let target = match symlink_exists(entry) {
            Ok(true) => match fs::read_link(entry) {
                Ok(target) => Some(target),
                Err(err) if err.kind() == io::ErrorKind::NotFound => None,
                Err(err) => return Err(err.into()),
            },
            Ok(false) => None,
            Err(err) => return Err(err),
        };

        match target {
            // the value was released and taken by another key since the backlink was written
            Some(target) if target.file_name() != Some(OsStr::new(primary_key)) => {
                log::warn!(
                    "Index entry {} now references {}, keeping it",
                    entry.display(),
                    target.display()
                );
                return Ok(());
            }
            Some(_) => match fs::remove_file(entry) {
                Ok(()) => log::debug!("Removed {}", entry.display()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            },
            None => {
                log::warn!("Index entry {} was already gone", entry.display());
            }
        }

        // <base>/<Type>By<Field>/<value>/<pk>: the parent is a normal-index value directory
        let value_dir = entry.parent();
        let is_member = value_dir
            .and_then(Path::parent)
            .and_then(Path::parent)
            .is_some_and(|base| base == self.index_base_dir.as_path());
        if let (true, Some(value_dir)) = (is_member, value_dir) {
            if remove_dir_if_empty(value_dir)? {
                log::debug!("Removed empty value directory {}", value_dir.display());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::test_support::{write_test_data, INDEX_DIR, PETS, USERS};
    use crate::index::{NormalIndex, UniqueIndex};
    use tempfile::TempDir;

    struct Sut {
        data: TempDir,
        primary: PrimaryIndex,
        by_email: UniqueIndex,
        by_user_name: UniqueIndex,
    }

    fn user_sut() -> Sut {
        let data = write_test_data();
        let files_dir = data.path().join("users");
        let base = data.path().join(INDEX_DIR);

        let primary = PrimaryIndex::new("User", &files_dir, &base);
        let by_email = UniqueIndex::new("User", "Email", &files_dir, &base);
        let by_user_name = UniqueIndex::new("User", "UserName", &files_dir, &base);
        primary.init().unwrap();
        by_email.init().unwrap();
        by_user_name.init().unwrap();

        for (id, user_name, email) in USERS {
            let entry = by_email.add(id, email).unwrap();
            primary.add(id, email, &entry).unwrap();
            let entry = by_user_name.add(id, user_name).unwrap();
            primary.add(id, user_name, &entry).unwrap();
        }

        Sut {
            data,
            primary,
            by_email,
            by_user_name,
        }
    }

    #[test]
    fn test_init_is_idempotent() {
        let sut = user_sut();
        sut.primary.init().unwrap();
        assert!(sut.data.path().join(INDEX_DIR).join("UserPrimary").is_dir());
        assert_eq!(sut.primary.entries("ewf4ofk-555").unwrap().len(), 2);
    }

    #[test]
    fn test_add_links_to_index_entry() {
        let sut = user_sut();
        let backlink = sut
            .data
            .path()
            .join(INDEX_DIR)
            .join("UserPrimary")
            .join("ewf4ofk-555")
            .join("jacky@example.com");

        assert_eq!(
            fs::read_link(&backlink).unwrap(),
            sut.data.path().join(INDEX_DIR).join("UserByEmail").join("jacky@example.com")
        );
    }

    #[test]
    fn test_add_same_value_twice_fails() {
        let sut = user_sut();
        let entry = sut.by_email.descriptor().entry_path("jacky@example.com");
        let err = sut.primary.add("ewf4ofk-555", "jacky@example.com", &entry).unwrap_err();
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_entries() {
        let sut = user_sut();
        let entries = sut.primary.entries("ewf4ofk-555").unwrap();
        let values: Vec<&str> = entries.iter().map(|(v, _)| v.as_str()).collect();
        assert_eq!(values, vec!["jacky", "jacky@example.com"]);
        assert!(entries[0].1.ends_with("UserByUserName/jacky"));

        assert!(sut.primary.entries("nobody").unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_cascades() {
        let sut = user_sut();

        sut.primary.delete("ewf4ofk-555").unwrap();

        assert!(sut.by_email.lookup("jacky@example.com").unwrap_err().is_not_found());
        assert!(sut.by_user_name.lookup("jacky").unwrap_err().is_not_found());
        assert!(!sut.primary.index_dir().join("ewf4ofk-555").exists());

        // other users untouched
        assert!(sut.by_email.lookup("jones@example.com").is_ok());
        assert_eq!(sut.primary.entries("rulan54-777").unwrap().len(), 2);
    }

    #[test]
    fn test_delete_unknown_key_is_not_found() {
        let sut = user_sut();
        let err = sut.primary.delete("nobody").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.entry().unwrap().index_by, PRIMARY_MARKER);
        assert_eq!(err.entry().unwrap().value, "nobody");
    }

    #[test]
    fn test_delete_tolerates_vanished_entry() {
        let sut = user_sut();
        sut.by_email.remove("mikey@example.com").unwrap();

        sut.primary.delete("abcdefg-123").unwrap();
        assert!(sut.by_user_name.lookup("mikey").unwrap_err().is_not_found());
        assert!(!sut.primary.index_dir().join("abcdefg-123").exists());
    }

    #[test]
    fn test_delete_keeps_entry_taken_by_another_key() {
        let sut = user_sut();
        sut.by_email.remove("mikey@example.com").unwrap();
        sut.by_email.add("hijklmn-456", "mikey@example.com").unwrap();

        sut.primary.delete("abcdefg-123").unwrap();

        assert_eq!(
            sut.by_email.lookup("mikey@example.com").unwrap(),
            sut.data.path().join("users").join("hijklmn-456")
        );
        assert!(sut.by_user_name.lookup("mikey").unwrap_err().is_not_found());
        assert!(!sut.primary.index_dir().join("abcdefg-123").exists());
        assert_eq!(sut.primary.entries("hijklmn-456").unwrap().len(), 2);
    }

    #[test]
    fn test_delete_detects_corruption() {
        let sut = user_sut();
        let key_dir = sut.primary.index_dir().join("abcdefg-123");
        fs::write(key_dir.join("rogue"), b"").unwrap();

        let err = sut.primary.delete("abcdefg-123").unwrap_err();
        assert!(err.is_corruption());

        let not_a_dir = sut.primary.index_dir().join("zzz");
        fs::write(&not_a_dir, b"").unwrap();
        assert!(sut.primary.delete("zzz").unwrap_err().is_corruption());
    }

    #[test]
    fn test_relink() {
        let sut = user_sut();
        let new_entry = sut
            .by_email
            .descriptor()
            .entry_path("mikey2@example.com");
        sut.by_email.update("mikey@example.com", "mikey2@example.com").unwrap();

        sut.primary
            .relink("abcdefg-123", "mikey@example.com", "mikey2@example.com", &new_entry)
            .unwrap();

        let values: Vec<String> = sut
            .primary
            .entries("abcdefg-123")
            .unwrap()
            .into_iter()
            .map(|(v, _)| v)
            .collect();
        assert_eq!(values, vec!["mikey", "mikey2@example.com"]);

        let err = sut
            .primary
            .relink("abcdefg-123", "mikey@example.com", "x", &new_entry)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_delete_prunes_emptied_value_dir() {
        let data = write_test_data();
        let files_dir = data.path().join("pets");
        let base = data.path().join(INDEX_DIR);
        let primary = PrimaryIndex::new("Pet", &files_dir, &base);
        let by_color = NormalIndex::new("Pet", "Color", &files_dir, &base);
        primary.init().unwrap();
        by_color.init().unwrap();

        for (id, _, color, _) in PETS {
            let entry = by_color.add(id, color).unwrap();
            primary.add(id, color, &entry).unwrap();
        }

        primary.delete("goefe-789").unwrap();
        assert_eq!(by_color.lookup("Green").unwrap(), vec!["xadaf-189"]);

        primary.delete("xadaf-189").unwrap();
        assert!(by_color.lookup("Green").unwrap_err().is_not_found());
        assert!(!base.join("PetByColor").join("Green").exists());
        assert!(base.join("PetByColor").is_dir());
    }
}
