use super::provider::init_index_root;
use super::{IndexDescriptor, IndexProvider};
use crate::common::fs_utils::{
    dir_exists, ensure_dir, remove_dir_if_empty, sorted_entry_names, symlink, symlink_exists,
    validate_component,
};
use crate::common::{GlobPattern, LockRegistry, NORMAL_INDEX};
use crate::errors::{IndexError, IndexResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MAX_ADD_RETRIES: u32 = 3;

/// Index allowing any number of entities per attribute value.
///
/// Every value is a directory in the index root holding one symbolic link
/// per member, named by primary key and pointing at the entity file.
///
/// ```text
/// /var/tmp/testfiles-395764020/index.disk/PetByColor/
/// ├── Brown
/// │   └── rebef-123 -> /var/tmp/testfiles-395764020/pets/rebef-123
/// ├── Green
/// │   ├── goefe-789 -> /var/tmp/testfiles-395764020/pets/goefe-789
/// │   └── xadaf-189 -> /var/tmp/testfiles-395764020/pets/xadaf-189
/// └── White
///     └── wefwe-456 -> /var/tmp/testfiles-395764020/pets/wefwe-456
/// ```
///
/// A value directory exists only while it has members: removing or moving
/// away the last member removes the directory as well.
///
/// Adding a member takes two steps (create the value directory, then the
/// link). Member changes made through the same index are serialised per
/// value; a cascading delete or another process removing the last member
/// in between makes `add` recreate the directory and retry, a bounded
/// number of times.
#[derive(Clone)]
pub struct NormalIndex {
    inner: Arc<NormalIndexInner>,
}

impl NormalIndex {
    /// Creates the index. [`init`](Self::init) must be called before use.
    pub fn new(
        type_name: &str,
        index_by: &str,
        files_dir: impl Into<PathBuf>,
        index_base_dir: impl AsRef<Path>,
    ) -> Self {
        let descriptor =
            IndexDescriptor::new(NORMAL_INDEX, type_name, index_by, files_dir, index_base_dir);
        NormalIndex {
            inner: Arc::new(NormalIndexInner {
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

    /// Adds `primary_key` as a member of `value` and returns the member link.
    pub fn add(&self, primary_key: &str, value: &str) -> IndexResult<PathBuf> {
        self.inner.add(primary_key, value)
    }

    /// Primary keys holding `value`, in lexicographic order.
    pub fn lookup(&self, value: &str) -> IndexResult<Vec<String>> {
        self.inner.lookup(value)
    }

    pub fn remove(&self, primary_key: &str, value: &str) -> IndexResult<()> {
        self.inner.remove(primary_key, value)
    }

    /// Moves the member link of `primary_key` from `old_value` to `new_value`.
    pub fn update(&self, primary_key: &str, old_value: &str, new_value: &str) -> IndexResult<()> {
        self.inner.update(primary_key, old_value, new_value).map(|_| ())
    }

    /// Entity file paths of all members of matching values, ordered by value
    /// and then by primary key.
    pub fn search(&self, pattern: &str) -> IndexResult<Vec<PathBuf>> {
        self.inner.search(pattern)
    }
}

impl IndexProvider for NormalIndex {
    fn descriptor(&self) -> &IndexDescriptor {
        &self.inner.descriptor
    }

    fn init(&self) -> IndexResult<()> {
        NormalIndex::init(self)
    }

    fn add(&self, primary_key: &str, value: &str) -> IndexResult<PathBuf> {
        self.inner.add(primary_key, value)
    }

    fn lookup(&self, value: &str) -> IndexResult<Vec<String>> {
        self.inner.lookup(value)
    }

    fn remove(&self, primary_key: &str, value: &str) -> IndexResult<()> {
        self.inner.remove(primary_key, value)
    }

    fn update(&self, primary_key: &str, old_value: &str, new_value: &str) -> IndexResult<PathBuf> {
        self.inner.update(primary_key, old_value, new_value)
    }

    fn search(&self, pattern: &str) -> IndexResult<Vec<PathBuf>> {
        self.inner.search(pattern)
    }
}

struct NormalIndexInner {
    descriptor: IndexDescriptor,
    // keyed by value directory name
    locks: LockRegistry,
}

impl NormalIndexInner {
    fn not_found(&self, value: &str) -> IndexError {
        IndexError::not_found(self.descriptor.type_name(), self.descriptor.index_by(), value)
    }

    fn already_exists(&self, value: &str) -> IndexError {
        IndexError::already_exists(self.descriptor.type_name(), self.descriptor.index_by(), value)
    }

    fn value_dir(&self, value: &str) -> PathBuf {
        self.descriptor.entry_path(value)
    }

    fn add(&self, primary_key: &str, value: &str) -> IndexResult<PathBuf> {
        validate_component("primary key", primary_key)?;
        validate_component("value", value)?;

        let target = self.descriptor.entity_path(primary_key);
        let value_dir = self.value_dir(value);
        let member = value_dir.join(primary_key);

        self.locks.write_with(value, || -> IndexResult<_> {
            let mut retries = 0;
            loop {
                ensure_dir(&value_dir)?;
                match symlink(&target, &member) {
                    Ok(()) => {
                        log::debug!("Linked {} -> {}", member.display(), target.display());
                        return Ok(member);
                    }
                    Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                        return Err(self.already_exists(value));
                    }
                    Err(err) if err.kind() == io::ErrorKind::NotFound && retries < MAX_ADD_RETRIES => {
                        log::warn!(
                            "Value directory {} vanished while adding {}, retrying",
                            value_dir.display(),
                            primary_key
                        );
                        retries += 1;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        })
    }

    fn lookup(&self, value: &str) -> IndexResult<Vec<String>> {
        validate_component("value", value)?;
        let value_dir = self.value_dir(value);

        if !dir_exists(&value_dir)? {
            return Err(self.not_found(value));
        }
        let ids = match sorted_entry_names(&value_dir) {
            Ok(ids) => ids,
            Err(err) if err.is_not_found() => return Err(self.not_found(value)),
            Err(err) => return Err(err),
        };
        if ids.is_empty() {
            return Err(self.not_found(value));
        }
        Ok(ids)
    }

    fn remove(&self, primary_key: &str, value: &str) -> IndexResult<()> {
        validate_component("primary key", primary_key)?;
        validate_component("value", value)?;

        let value_dir = self.value_dir(value);
        let member = value_dir.join(primary_key);

        self.locks.write_with(value, || -> IndexResult<_> {
            if !dir_exists(&value_dir)? || !symlink_exists(&member)? {
                return Err(self.not_found(value));
            }
            match fs::remove_file(&member) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    return Err(self.not_found(value))
                }
                Err(err) => return Err(err.into()),
            }
            log::debug!("Removed {}", member.display());

            if remove_dir_if_empty(&value_dir)? {
                log::debug!("Removed empty value directory {}", value_dir.display());
            }
            Ok(())
        })
    }

    fn update(&self, primary_key: &str, old_value: &str, new_value: &str) -> IndexResult<PathBuf> {
        validate_component("primary key", primary_key)?;
        validate_component("value", old_value)?;
        validate_component("value", new_value)?;

        let old_dir = self.value_dir(old_value);
        let new_dir = self.value_dir(new_value);
        let old_member = old_dir.join(primary_key);
        let new_member = new_dir.join(primary_key);

        self.locks.write_pair_with(old_value, new_value, || -> IndexResult<_> {
            if !dir_exists(&old_dir)? || !symlink_exists(&old_member)? {
                return Err(self.not_found(old_value));
            }
            if dir_exists(&new_dir)? && symlink_exists(&new_member)? {
                return Err(self.already_exists(new_value));
            }

            ensure_dir(&new_dir)?;
            fs::rename(&old_member, &new_member)?;
            log::debug!("Moved {} -> {}", old_member.display(), new_member.display());

            if remove_dir_if_empty(&old_dir)? {
                log::debug!("Removed empty value directory {}", old_dir.display());
            }
            Ok(new_member.clone())
        })
    }

    fn search(&self, pattern: &str) -> IndexResult<Vec<PathBuf>> {
        let glob = GlobPattern::new(pattern)?;
        let mut results = Vec::new();

        for value in sorted_entry_names(self.descriptor.index_root_dir())? {
            if !glob.matches(&value) {
                continue;
            }
            let value_dir = self.value_dir(&value);
            if !dir_exists(&value_dir)? {
                continue;
            }
            let members = match sorted_entry_names(&value_dir) {
                Ok(members) => members,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            };
            for primary_key in members {
                let member = value_dir.join(&primary_key);
                if !symlink_exists(&member)? {
                    continue;
                }
                match fs::read_link(&member) {
                    Ok(target) => results.push(target),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                    Err(err) => return Err(err.into()),
                }
            }
        }

        if results.is_empty() {
            return Err(self.not_found(pattern));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::fs_utils::base_name;
    use crate::errors::ErrorKind;
    use crate::index::test_support::{write_test_data, INDEX_DIR, PETS};
    use tempfile::TempDir;

    fn normal_index_sut() -> (NormalIndex, TempDir) {
        let data = write_test_data();
        let sut = NormalIndex::new(
            "Pet",
            "Color",
            data.path().join("pets"),
            data.path().join(INDEX_DIR),
        );
        sut.init().unwrap();

        for (id, _, color, _) in PETS {
            sut.add(id, color).unwrap();
        }
        (sut, data)
    }

    fn color_dir(data: &TempDir, color: &str) -> PathBuf {
        data.path().join(INDEX_DIR).join("PetByColor").join(color)
    }

    #[test]
    fn test_lookup() {
        let (sut, _data) = normal_index_sut();

        assert_eq!(sut.lookup("Green").unwrap(), vec!["goefe-789", "xadaf-189"]);
        assert_eq!(sut.lookup("White").unwrap(), vec!["wefwe-456"]);

        let err = sut.lookup("Cyan").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.entry().unwrap().value, "Cyan");
    }

    #[test]
    fn test_lookup_empty_value_dir_is_not_found() {
        let (sut, data) = normal_index_sut();
        fs::create_dir(color_dir(&data, "Cyan")).unwrap();
        assert!(sut.lookup("Cyan").unwrap_err().is_not_found());
    }

    #[test]
    fn test_add_links_member_to_entity() {
        let (sut, data) = normal_index_sut();
        let member = color_dir(&data, "Green").join("goefe-789");
        assert_eq!(
            fs::read_link(&member).unwrap(),
            data.path().join("pets").join("goefe-789")
        );

        let err = sut.add("goefe-789", "Green").unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(err.entry().unwrap().value, "Green");
    }

    #[test]
    fn test_add_rejects_value_dir_clash_with_file() {
        let (sut, data) = normal_index_sut();
        fs::write(color_dir(&data, "Blue"), b"").unwrap();
        assert!(sut.add("rebef-123", "Blue").unwrap_err().is_corruption());
    }

    #[test]
    fn test_remove_keeps_value_dir_with_remaining_members() {
        let (sut, data) = normal_index_sut();

        sut.remove("goefe-789", "Green").unwrap();
        assert!(color_dir(&data, "Green").is_dir());
        assert_eq!(sut.lookup("Green").unwrap(), vec!["xadaf-189"]);
    }

    #[test]
    fn test_remove_last_member_removes_value_dir() {
        let (sut, data) = normal_index_sut();

        sut.remove("wefwe-456", "White").unwrap();
        assert!(!color_dir(&data, "White").exists());
        assert!(sut.lookup("White").unwrap_err().is_not_found());

        assert!(sut.remove("wefwe-456", "White").unwrap_err().is_not_found());
        assert!(sut.remove("rebef-123", "Green").unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_moves_last_member() {
        let (sut, data) = normal_index_sut();
        sut.remove("xadaf-189", "Green").unwrap();

        sut.update("goefe-789", "Green", "Black").unwrap();
        assert!(color_dir(&data, "Black").is_dir());
        assert!(!color_dir(&data, "Green").exists());
        assert_eq!(sut.lookup("Black").unwrap(), vec!["goefe-789"]);
    }

    #[test]
    fn test_update_keeps_old_value_with_remaining_members() {
        let (sut, data) = normal_index_sut();

        sut.update("goefe-789", "Green", "Black").unwrap();
        assert!(color_dir(&data, "Black").is_dir());
        assert_eq!(sut.lookup("Green").unwrap(), vec!["xadaf-189"]);
        assert_eq!(sut.lookup("Black").unwrap(), vec!["goefe-789"]);
    }

    #[test]
    fn test_update_into_existing_value() {
        let (sut, _data) = normal_index_sut();

        sut.update("rebef-123", "Brown", "Green").unwrap();
        assert_eq!(
            sut.lookup("Green").unwrap(),
            vec!["goefe-789", "rebef-123", "xadaf-189"]
        );
        assert!(sut.lookup("Brown").unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_errors() {
        let (sut, _data) = normal_index_sut();

        let err = sut.update("rebef-123", "Green", "Black").unwrap_err();
        assert!(err.is_not_found());

        sut.add("rebef-123", "Green").unwrap();
        let err = sut.update("rebef-123", "Brown", "Green").unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(sut.lookup("Brown").unwrap(), vec!["rebef-123"]);
    }

    #[test]
    fn test_search() {
        let (sut, _data) = normal_index_sut();

        let res = sut.search("Gr*").unwrap();
        let ids: Vec<String> = res.iter().map(|p| base_name(p).unwrap()).collect();
        assert_eq!(ids, vec!["goefe-789", "xadaf-189"]);

        let res = sut.search("*").unwrap();
        let ids: Vec<String> = res.iter().map(|p| base_name(p).unwrap()).collect();
        assert_eq!(ids, vec!["rebef-123", "goefe-789", "xadaf-189", "wefwe-456"]);

        assert!(sut.search("Cy*").unwrap_err().is_not_found());
        assert_eq!(sut.search("").unwrap_err().kind(), &ErrorKind::InvalidValue);
    }

    #[test]
    fn test_init() {
        let data = tempfile::tempdir().unwrap();
        let index_root = data.path().join(INDEX_DIR);
        let files_dir = data.path().join("users");

        let index = NormalIndex::new("User", "DisplayName", &files_dir, &index_root);
        assert_eq!(index.init().unwrap_err().kind(), &ErrorKind::Precondition);

        fs::create_dir(&files_dir).unwrap();
        index.init().unwrap();
        index.init().unwrap();
        assert!(index_root.is_dir());
        assert!(index_root.join("UserByDisplayName").is_dir());
    }
}
