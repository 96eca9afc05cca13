use crate::config::ManagerConfig;
use crate::errors::{IndexError, IndexResult};
use crate::manager::IndexManager;
use std::path::PathBuf;

/// Builder for an [`IndexManager`].
///
/// Setter errors are captured and returned from [`build`](Self::build), so a
/// configuration chain never has to be interrupted.
///
/// # Examples
///
/// ```rust,no_run
/// use linkdex::manager::IndexManager;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = IndexManager::builder()
///     .data_dir("/var/lib/app/data")
///     .index_root_dir_name("index.disk")
///     .build()?;
/// manager.add_unique_index("User", "Email", "users")?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ManagerBuilder {
    error: Option<IndexError>,
    config: ManagerConfig,
}

impl ManagerBuilder {
    pub fn new() -> Self {
        ManagerBuilder {
            error: None,
            config: ManagerConfig::default(),
        }
    }

    /// Directory holding the entity directories and the index root.
    pub fn data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_data_dir(data_dir) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Name of the index root directory; defaults to `index.disk`.
    pub fn index_root_dir_name(mut self, name: &str) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_index_root_dir_name(name) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Returns the first captured error, or the configured manager.
    pub fn build(self) -> IndexResult<IndexManager> {
        if let Some(err) = self.error {
            log::error!("Failed to build index manager: {}", err);
            return Err(err);
        }
        IndexManager::new(self.config)
    }
}
