use crate::common::fs_utils::validate_component;
use crate::common::{LockRegistry, PRIMARY_MARKER};
use crate::config::ManagerConfig;
use crate::entity::Indexable;
use crate::errors::{EntryRef, ErrorKind, IndexError, IndexResult};
use crate::index::registry::IndexRegistry;
use crate::index::{Index, NormalIndex, PrimaryIndex, UniqueIndex};
use crate::manager_builder::ManagerBuilder;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::sync::Arc;

/// Facade over every registered index.
///
/// The manager keeps a `type -> field -> indices` registry plus one backlink
/// tracker per type, fans entity writes out to all indices of the entity's
/// type, and answers queries by asking the indices of one field in
/// registration order.
///
/// Writes for the same `(type, primary key)` are serialized. Writes spanning
/// several indices are not atomic: the first failure is returned and the
/// indices handled before it keep their changes. On a type with a backlink
/// tracker, an entity whose indexed fields share a value is rejected up
/// front.
///
/// # Examples
///
/// ```rust,no_run
/// use linkdex::entity::Record;
/// use linkdex::manager::IndexManager;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = IndexManager::builder().data_dir("/var/lib/app/data").build()?;
/// manager.add_unique_index("User", "Email", "users")?;
/// manager.add_primary_index("User", "users")?;
///
/// let user = Record::new("User").with("Email", "mikey@example.com");
/// manager.add("abcdefg-123", &user)?;
/// assert_eq!(manager.find("User", "Email", "mikey@example.com")?, "abcdefg-123");
///
/// manager.delete("User", "abcdefg-123")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct IndexManager {
    inner: Arc<IndexManagerInner>,
}

impl IndexManager {
    /// Creates a manager over `config`. No directory is touched until an
    /// index is registered.
    pub fn new(config: ManagerConfig) -> IndexResult<Self> {
        config.validate()?;
        Ok(IndexManager {
            inner: Arc::new(IndexManagerInner {
                config,
                registry: IndexRegistry::new(),
                locks: LockRegistry::new(),
            }),
        })
    }

    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Registers a unique index on `type_name.index_by` over the entity files
    /// in `<data_dir>/<entity_dir_name>`.
    pub fn add_unique_index(
        &self,
        type_name: &str,
        index_by: &str,
        entity_dir_name: &str,
    ) -> IndexResult<()> {
        let (files_dir, base_dir) = self.inner.index_dirs(type_name, index_by, entity_dir_name)?;
        self.add_index(Index::new(UniqueIndex::new(type_name, index_by, files_dir, base_dir)))
    }

    /// Registers a normal (non-unique) index on `type_name.index_by`.
    pub fn add_normal_index(
        &self,
        type_name: &str,
        index_by: &str,
        entity_dir_name: &str,
    ) -> IndexResult<()> {
        let (files_dir, base_dir) = self.inner.index_dirs(type_name, index_by, entity_dir_name)?;
        self.add_index(Index::new(NormalIndex::new(type_name, index_by, files_dir, base_dir)))
    }

    /// Registers the backlink tracker of `type_name`. At most one per type.
    pub fn add_primary_index(&self, type_name: &str, entity_dir_name: &str) -> IndexResult<()> {
        validate_component("type name", type_name)?;
        validate_component("entity directory name", entity_dir_name)?;

        let tracker = PrimaryIndex::new(
            type_name,
            self.inner.config.entity_dir(entity_dir_name),
            self.inner.config.index_base_dir(),
        );
        tracker.init()?;
        self.inner.registry.add_tracker(tracker)?;
        log::debug!("Registered primary index for {}", type_name);
        Ok(())
    }

    /// Initializes and registers a custom index. An index whose `init`
    /// fails is not registered.
    pub fn add_index(&self, index: Index) -> IndexResult<()> {
        index.init()?;
        let descriptor = index.descriptor().clone();
        self.inner.registry.add_index(index)?;
        log::debug!(
            "Registered {} index on {}.{}",
            descriptor.index_type(),
            descriptor.type_name(),
            descriptor.index_by()
        );
        Ok(())
    }

    /// Indices registered for `type_name.index_by`, in registration order.
    pub fn indices(&self, type_name: &str, index_by: &str) -> Vec<Index> {
        self.inner.registry.indices_for(type_name, index_by)
    }

    /// The backlink tracker of `type_name`, if one is registered.
    pub fn primary_index(&self, type_name: &str) -> Option<PrimaryIndex> {
        self.inner.registry.tracker(type_name)
    }

    /// Indexes `entity` under `primary_key` in every index of its type, and
    /// backlinks each new entry when the type has a tracker.
    ///
    /// # Errors
    /// `InvalidValue` when an indexed field is unset or unusable as a file
    /// name (checked before anything is written); otherwise the first error
    /// of an index or the tracker.
    pub fn add<E: Indexable + ?Sized>(&self, primary_key: &str, entity: &E) -> IndexResult<()> {
        self.inner.add(primary_key, entity)
    }

    /// Re-indexes the fields whose value differs between `old_entity` and
    /// `new_entity`. Unchanged fields are left alone.
    pub fn update<E: Indexable + ?Sized>(
        &self,
        primary_key: &str,
        old_entity: &E,
        new_entity: &E,
    ) -> IndexResult<()> {
        self.inner.update(primary_key, old_entity, new_entity)
    }

    /// Primary key stored for `value`, from the first index of the field that
    /// knows it. A normal index answers with its first member.
    pub fn find(&self, type_name: &str, index_by: &str, value: &str) -> IndexResult<String> {
        self.find_all(type_name, index_by, value)?
            .into_iter()
            .next()
            .ok_or_else(|| IndexError::not_found(type_name, index_by, value))
    }

    /// Every primary key stored for `value` by the first index of the field
    /// that knows it, ordered.
    pub fn find_all(&self, type_name: &str, index_by: &str, value: &str) -> IndexResult<Vec<String>> {
        for index in self.indices(type_name, index_by) {
            match index.lookup(value) {
                Ok(keys) => return Ok(keys),
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            }
        }
        Err(IndexError::not_found(type_name, index_by, value))
    }

    /// Index entries matching the glob `pattern`, from the first index of the
    /// field that has any.
    pub fn search(&self, type_name: &str, index_by: &str, pattern: &str) -> IndexResult<Vec<PathBuf>> {
        for index in self.indices(type_name, index_by) {
            match index.search(pattern) {
                Ok(entries) => return Ok(entries),
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            }
        }
        Err(IndexError::not_found(type_name, index_by, pattern))
    }

    /// Removes every index entry of `primary_key` through the type's tracker.
    ///
    /// Without a tracker for `type_name` there is nothing to cascade from and
    /// the call does nothing.
    pub fn delete(&self, type_name: &str, primary_key: &str) -> IndexResult<()> {
        self.inner.delete(type_name, primary_key)
    }
}

impl Debug for IndexManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexManager")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

struct IndexManagerInner {
    config: ManagerConfig,
    registry: IndexRegistry,
    // keyed by "<type>/<primary key>"
    locks: LockRegistry,
}

impl IndexManagerInner {
    fn index_dirs(
        &self,
        type_name: &str,
        index_by: &str,
        entity_dir_name: &str,
    ) -> IndexResult<(PathBuf, PathBuf)> {
        validate_component("type name", type_name)?;
        validate_component("field name", index_by)?;
        validate_component("entity directory name", entity_dir_name)?;
        Ok((self.config.entity_dir(entity_dir_name), self.config.index_base_dir()))
    }

    fn lock_key(type_name: &str, primary_key: &str) -> String {
        format!("{}/{}", type_name, primary_key)
    }

    /// Backlinks of one key are named by value, so the fields of a tracked
    /// entity need distinct values. Takes `(field, old value, new value)`.
    ///
    /// A changed field may not take a value another field holds before or
    /// after the write: the relinks run one field at a time.
    fn check_backlink_names(type_name: &str, values: &[(&str, &str, &str)]) -> IndexResult<()> {
        for (i, (field, old_value, new_value)) in values.iter().enumerate() {
            if new_value.is_empty() {
                continue;
            }
            let clash = values.iter().enumerate().find(|(j, (_, other_old, other_new))| {
                *j != i
                    && (new_value == other_new || (old_value != new_value && new_value == other_old))
            });
            if let Some((_, (other, _, _))) = clash {
                return Err(IndexError::new(
                    &format!(
                        "{}.{} and {}.{} cannot both hold '{}' on a tracked type",
                        type_name, other, type_name, field, new_value
                    ),
                    ErrorKind::AlreadyExists,
                )
                .with_entry(EntryRef::new(type_name, PRIMARY_MARKER, new_value)));
            }
        }
        Ok(())
    }

    fn add<E: Indexable + ?Sized>(&self, primary_key: &str, entity: &E) -> IndexResult<()> {
        let type_name = entity.type_name();
        validate_component("primary key", primary_key)?;

        let fields = self.registry.fields_of(type_name);
        if fields.is_empty() {
            log::debug!("No index registered for {}, nothing to add", type_name);
            return Ok(());
        }

        let mut values = Vec::with_capacity(fields.len());
        for (field, _) in &fields {
            let value = entity.field_value(field);
            validate_component(&format!("{}.{}", type_name, field), &value)?;
            values.push(value);
        }

        let tracker = self.registry.tracker(type_name);
        if tracker.is_some() {
            let named: Vec<_> = fields
                .iter()
                .zip(&values)
                .map(|((field, _), value)| (field.as_str(), value.as_str(), value.as_str()))
                .collect();
            Self::check_backlink_names(type_name, &named)?;
        }

        self.locks.write_with(&Self::lock_key(type_name, primary_key), || -> IndexResult<_> {
            for ((_, indices), value) in fields.iter().zip(&values) {
                for index in indices {
                    let entry = index.add(primary_key, value)?;
                    if let Some(tracker) = &tracker {
                        tracker.add(primary_key, value, &entry)?;
                    }
                }
            }
            log::debug!("Indexed {} {}", type_name, primary_key);
            Ok(())
        })
    }

    fn update<E: Indexable + ?Sized>(
        &self,
        primary_key: &str,
        old_entity: &E,
        new_entity: &E,
    ) -> IndexResult<()> {
        let type_name = old_entity.type_name();
        if new_entity.type_name() != type_name {
            return Err(IndexError::invalid_value(&format!(
                "cannot update a {} into a {}",
                type_name,
                new_entity.type_name()
            )));
        }
        validate_component("primary key", primary_key)?;

        let fields = self.registry.fields_of(type_name);
        let mut values = Vec::with_capacity(fields.len());
        let mut changes = Vec::new();
        for (field, indices) in &fields {
            let old_value = old_entity.field_value(field);
            let new_value = new_entity.field_value(field);
            if old_value != new_value {
                let what = format!("{}.{}", type_name, field);
                validate_component(&what, &old_value)?;
                validate_component(&what, &new_value)?;
                changes.push((indices, old_value.clone(), new_value.clone()));
            }
            values.push((field.as_str(), old_value, new_value));
        }

        if changes.is_empty() {
            log::debug!("No indexed field of {} {} changed", type_name, primary_key);
            return Ok(());
        }

        let tracker = self.registry.tracker(type_name);
        if tracker.is_some() {
            let named: Vec<_> = values
                .iter()
                .map(|(field, old_value, new_value)| (*field, old_value.as_str(), new_value.as_str()))
                .collect();
            Self::check_backlink_names(type_name, &named)?;
        }

        self.locks.write_with(&Self::lock_key(type_name, primary_key), || -> IndexResult<_> {
            for (indices, old_value, new_value) in &changes {
                for index in indices.iter() {
                    let entry = index.update(primary_key, old_value, new_value)?;
                    if let Some(tracker) = &tracker {
                        tracker.relink(primary_key, old_value, new_value, &entry)?;
                    }
                }
            }
            log::debug!("Re-indexed {} {}", type_name, primary_key);
            Ok(())
        })
    }

    fn delete(&self, type_name: &str, primary_key: &str) -> IndexResult<()> {
        let Some(tracker) = self.registry.tracker(type_name) else {
            log::debug!(
                "No primary index registered for {}, skipping delete of {}",
                type_name,
                primary_key
            );
            return Ok(());
        };

        self.locks
            .write_with(&Self::lock_key(type_name, primary_key), || tracker.delete(primary_key))
    }
}
