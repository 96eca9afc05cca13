//! Configuration of an [`IndexManager`](crate::manager::IndexManager).

use crate::common::fs_utils::validate_component;
use crate::common::DEFAULT_INDEX_ROOT_DIR_NAME;
use crate::errors::{ErrorKind, IndexError, IndexResult};
use std::path::{Path, PathBuf};

/// Where entity files and indices live.
///
/// Entity directories and the index root are both resolved relative to
/// `data_dir`:
///
/// ```text
/// <data_dir>/<entity dir>/<primary key>
/// <data_dir>/<index_root_dir_name>/...
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ManagerConfig {
    pub data_dir: PathBuf,
    #[cfg_attr(feature = "serde", serde(default = "default_index_root_dir_name"))]
    pub index_root_dir_name: String,
}

fn default_index_root_dir_name() -> String {
    DEFAULT_INDEX_ROOT_DIR_NAME.to_string()
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            data_dir: PathBuf::new(),
            index_root_dir_name: default_index_root_dir_name(),
        }
    }
}

impl ManagerConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        ManagerConfig {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Sets the data directory. An empty path is rejected.
    pub fn set_data_dir(&mut self, data_dir: impl Into<PathBuf>) -> IndexResult<()> {
        let data_dir = data_dir.into();
        if data_dir.as_os_str().is_empty() {
            return Err(IndexError::invalid_value("data directory cannot be empty"));
        }
        self.data_dir = data_dir;
        Ok(())
    }

    /// Sets the name of the index root directory under the data directory.
    pub fn set_index_root_dir_name(&mut self, name: &str) -> IndexResult<()> {
        validate_component("index root directory name", name)?;
        self.index_root_dir_name = name.to_string();
        Ok(())
    }

    /// Checks the settings before any directory is touched.
    ///
    /// # Errors
    /// `InvalidValue` when `data_dir` is unset or the index root name is not a
    /// single path component.
    pub fn validate(&self) -> IndexResult<()> {
        if self.data_dir.as_os_str().is_empty() {
            log::error!("Index manager configured without a data directory");
            return Err(IndexError::new(
                "data directory must be set",
                ErrorKind::InvalidValue,
            ));
        }
        validate_component("index root directory name", &self.index_root_dir_name)
    }

    /// Directory holding every index root, `<data_dir>/<index_root_dir_name>`.
    pub fn index_base_dir(&self) -> PathBuf {
        self.data_dir.join(&self.index_root_dir_name)
    }

    /// Directory holding the entity files of one type.
    pub fn entity_dir(&self, entity_dir_name: &str) -> PathBuf {
        self.data_dir.join(entity_dir_name)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_root_name() {
        let config = ManagerConfig::new("/var/data");
        assert_eq!(config.index_root_dir_name, "index.disk");
        assert_eq!(config.index_base_dir(), PathBuf::from("/var/data/index.disk"));
        assert_eq!(config.entity_dir("users"), PathBuf::from("/var/data/users"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let config = ManagerConfig::default();
        assert_eq!(config.validate().unwrap_err().kind(), &ErrorKind::InvalidValue);

        let config = ManagerConfig {
            data_dir: PathBuf::from("/var/data"),
            index_root_dir_name: "a/b".to_string(),
        };
        assert_eq!(config.validate().unwrap_err().kind(), &ErrorKind::InvalidValue);
    }

    #[test]
    fn test_setters_reject_bad_values() {
        let mut config = ManagerConfig::new("/var/data");
        assert!(config.set_data_dir("").is_err());
        assert!(config.set_index_root_dir_name("..").is_err());
        assert_eq!(config.data_dir(), Path::new("/var/data"));
        assert_eq!(config.index_root_dir_name, "index.disk");

        config.set_index_root_dir_name("idx").unwrap();
        assert_eq!(config.index_base_dir(), PathBuf::from("/var/data/idx"));
    }
}
