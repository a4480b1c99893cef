use super::{BindingStore, StoreError};
use crate::mapping::binding::BindingTable;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Binding table kept in one TOML file
#[derive(Debug, Clone)]
pub struct TomlBindingStore {
    path: PathBuf,
}

impl TomlBindingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling the table is written to before it replaces the store.
    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl BindingStore for TomlBindingStore {
    fn load(&self) -> Result<BindingTable, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    "Binding file {} does not exist, starting with no bindings",
                    self.path.display()
                );
                return Ok(BindingTable::default());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let table: BindingTable = toml::from_str(&content).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        info!("Loaded {} bindings from {}", table.len(), self.path.display());
        Ok(table)
    }

    fn save(&mut self, table: &BindingTable) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                debug!("Creating binding directory {}", parent.display());
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        // Rename over the store so a failed write never leaves it truncated.
        let content = toml::to_string_pretty(table)?;
        let staging = self.staging_path();
        fs::write(&staging, content).map_err(|e| self.io_error(e))?;
        if let Err(e) = fs::rename(&staging, &self.path) {
            if let Err(cleanup) = fs::remove_file(&staging) {
                warn!("Failed to remove {}: {}", staging.display(), cleanup);
            }
            return Err(self.io_error(e));
        }
        debug!("Saved {} bindings to {}", table.len(), self.path.display());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed binding file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    table: Option<BindingTable>,
    saves: usize,
    read_only: bool,
}

/// Store that keeps the table in memory; clones share it
#[derive(Debug, Clone, Default)]
pub struct MemoryBindingStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: BindingTable) -> Self {
        let store = Self::default();
        store.lock().table = Some(table);
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of successful saves so far
    pub fn saves(&self) -> usize {
        self.lock().saves
    }

    pub fn stored(&self) -> Option<BindingTable> {
        self.lock().table.clone()
    }

    /// Makes later saves and clears fail with a permission error.
    pub fn set_read_only(&self, read_only: bool) {
        self.lock().read_only = read_only;
    }

    fn writable(state: &MemoryState) -> Result<(), StoreError> {
        if state.read_only {
            return Err(StoreError::Io {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::from(ErrorKind::PermissionDenied),
            });
        }
        Ok(())
    }
}

impl BindingStore for MemoryBindingStore {
    fn load(&self) -> Result<BindingTable, StoreError> {
        Ok(self.lock().table.clone().unwrap_or_default())
    }

    fn save(&mut self, table: &BindingTable) -> Result<(), StoreError> {
        let mut state = self.lock();
        Self::writable(&state)?;
        state.table = Some(table.clone());
        state.saves += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        let mut state = self.lock();
        Self::writable(&state)?;
        state.table = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::backend::HatDirection;
    use crate::mapping::binding::{Binding, Control, TrimFunction};
    use std::error::Error;

    fn sample() -> BindingTable {
        let mut table = BindingTable::new();
        table.insert(Binding {
            function: TrimFunction::Left,
            device_name: "Stick1".to_string(),
            runtime_id: Some(7),
            control: Control::Button { index: 5 },
        });
        table.insert(Binding {
            function: TrimFunction::Release,
            device_name: "Yoke".to_string(),
            runtime_id: None,
            control: Control::Pov {
                hat: 0,
                direction: HatDirection::DOWN,
            },
        });
        table
    }

    #[test]
    fn missing_file_loads_empty() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let store = TomlBindingStore::new(dir.path().join("bindings.toml"));
        assert!(store.load()?.is_empty());
        Ok(())
    }

    #[test]
    fn save_creates_directories_and_reloads_without_ids() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("bindings.toml");
        let mut store = TomlBindingStore::new(&path);

        store.save(&sample())?;
        assert!(path.exists());

        let loaded = store.load()?;
        assert_eq!(loaded.len(), 2);
        let left = loaded.get(TrimFunction::Left).ok_or("missing Trim Left")?;
        assert_eq!(left.device_name, "Stick1");
        assert_eq!(left.control, Control::Button { index: 5 });
        assert_eq!(left.runtime_id, None);
        Ok(())
    }

    #[test]
    fn save_replaces_the_file_without_leaving_a_staging_copy() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bindings.toml");
        let mut store = TomlBindingStore::new(&path);

        store.save(&sample())?;
        let mut smaller = sample();
        smaller.remove(TrimFunction::Release);
        store.save(&smaller)?;

        assert_eq!(store.load()?.len(), 1);
        let names: Vec<_> = fs::read_dir(dir.path())?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect::<Result<_, _>>()?;
        assert_eq!(names, vec![OsString::from("bindings.toml")]);
        Ok(())
    }

    #[test]
    fn failed_save_keeps_the_previous_file() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bindings.toml");
        let mut store = TomlBindingStore::new(&path);
        store.save(&sample())?;

        // A directory where the staging file should go makes the write fail.
        fs::create_dir(dir.path().join("bindings.toml.tmp"))?;
        assert!(matches!(
            store.save(&BindingTable::new()),
            Err(StoreError::Io { .. })
        ));
        assert_eq!(store.load()?.len(), 2);
        Ok(())
    }

    #[test]
    fn clear_removes_the_file_and_tolerates_absence() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bindings.toml");
        let mut store = TomlBindingStore::new(&path);

        store.save(&sample())?;
        store.clear()?;
        assert!(!path.exists());
        store.clear()?;
        assert!(store.load()?.is_empty());
        Ok(())
    }

    #[test]
    fn corrupt_file_is_an_error() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bindings.toml");
        fs::write(&path, "[[binding]]\nfunction = \"Trim Up\"\n")?;

        let store = TomlBindingStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::Parse { .. })));
        Ok(())
    }

    #[test]
    fn memory_store_counts_saves() -> Result<(), Box<dyn Error>> {
        let mut store = MemoryBindingStore::new();
        let observer = store.clone();
        store.save(&sample())?;
        store.save(&BindingTable::new())?;

        assert_eq!(observer.saves(), 2);
        assert_eq!(observer.stored().map(|t| t.len()), Some(0));
        store.clear()?;
        assert_eq!(observer.stored(), None);

        observer.set_read_only(true);
        assert!(store.save(&sample()).is_err());
        assert!(store.clear().is_err());
        assert_eq!(observer.saves(), 2);
        Ok(())
    }
}
