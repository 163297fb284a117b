//! Shadow directory layout and artifact access.
//!
//! ```text
//! {root}/tables_index.json
//! {root}/{workbook_id}/{table_id}.csv
//! ```
//!
//! The store owns `root` entirely: a commit replaces the whole directory.

use crate::error_codes;
use crate::registry::{Registry, RegistryError, TableMeta};
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const REGISTRY_FILE_NAME: &str = "tables_index.json";

/// CSV bytes keyed by composite table key.
pub type Artifacts = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("[SHADOW_STORE_001] shadow store I/O failed for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[SHADOW_STORE_002] no artifact bytes supplied for table '{key}'")]
    MissingArtifact { key: String },

    #[error("[SHADOW_STORE_003] {0}")]
    Registry(#[from] RegistryError),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Io { .. } => error_codes::STORE_IO,
            StoreError::MissingArtifact { .. } => error_codes::STORE_MISSING_ARTIFACT,
            StoreError::Registry(_) => error_codes::STORE_REGISTRY,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("[SHADOW_LOAD_001] artifact for '{key}' not found at '{path}'")]
    Missing { key: String, path: String },

    #[error("[SHADOW_LOAD_002] failed to read artifact for '{key}' at '{path}': {source}")]
    Io {
        key: String,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    pub fn code(&self) -> &'static str {
        match self {
            LoadError::Missing { .. } => error_codes::LOAD_MISSING,
            LoadError::Io { .. } => error_codes::LOAD_IO,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            LoadError::Missing { key, .. } | LoadError::Io { key, .. } => key,
        }
    }
}

/// Access to the CSV bytes behind a registry entry.
pub trait CsvLoader: Sync {
    fn load(&self, key: &str, meta: &TableMeta) -> Result<Vec<u8>, LoadError>;
}

impl<L: CsvLoader + ?Sized> CsvLoader for &L {
    fn load(&self, key: &str, meta: &TableMeta) -> Result<Vec<u8>, LoadError> {
        (**self).load(key, meta)
    }
}

/// Artifacts held in memory, keyed by composite key.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    artifacts: HashMap<String, Vec<u8>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, bytes: Vec<u8>) {
        self.artifacts.insert(key.into(), bytes);
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<u8>> {
        self.artifacts.remove(key)
    }
}

impl From<Artifacts> for MemoryLoader {
    fn from(artifacts: Artifacts) -> Self {
        Self {
            artifacts: artifacts.into_iter().collect(),
        }
    }
}

impl CsvLoader for MemoryLoader {
    fn load(&self, key: &str, meta: &TableMeta) -> Result<Vec<u8>, LoadError> {
        self.artifacts
            .get(key)
            .cloned()
            .ok_or_else(|| LoadError::Missing {
                key: key.to_string(),
                path: meta.csv_path.clone(),
            })
    }
}

#[derive(Debug, Clone)]
pub struct ShadowStore {
    root: PathBuf,
}

impl ShadowStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE_NAME)
    }

    pub fn has_registry(&self) -> bool {
        self.registry_path().is_file()
    }

    pub fn read_registry(&self) -> Result<Registry, RegistryError> {
        Registry::read(self.registry_path())
    }

    /// Absolute location of an artifact. `None` when `csv_path` would escape the root.
    pub fn artifact_path(&self, csv_path: &str) -> Option<PathBuf> {
        let rel = Path::new(csv_path);
        let contained = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        contained.then(|| self.root.join(rel))
    }

    /// Write every artifact and the registry into a staging directory beside `root`, then
    /// swap it into place. On failure the previous `root` is left as it was.
    pub fn commit(&self, registry: &Registry, artifacts: &Artifacts) -> Result<(), StoreError> {
        let parent = match self.root.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(|e| io_err(&parent, e))?;

        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "shadow".to_string());
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{name}.staging."))
            .tempdir_in(&parent)
            .map_err(|e| io_err(&parent, e))?;

        for (key, meta) in &registry.tables {
            let bytes = artifacts
                .get(key)
                .ok_or_else(|| StoreError::MissingArtifact { key: key.clone() })?;
            let target = staging.path().join(&meta.csv_path);
            if let Some(dir) = target.parent() {
                std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            }
            std::fs::write(&target, bytes).map_err(|e| io_err(&target, e))?;
            debug!(table = %key, bytes = bytes.len(), "staged artifact");
        }
        registry.write(staging.path().join(REGISTRY_FILE_NAME))?;

        self.swap_in(staging.path(), &parent, &name)?;
        info!(
            root = %self.root.display(),
            tables = registry.tables.len(),
            "committed shadow store"
        );
        Ok(())
    }

    fn swap_in(&self, staging: &Path, parent: &Path, name: &str) -> Result<(), StoreError> {
        if !self.root.exists() {
            return std::fs::rename(staging, &self.root).map_err(|e| io_err(&self.root, e));
        }

        let backup = tempfile::Builder::new()
            .prefix(&format!(".{name}.previous."))
            .tempdir_in(parent)
            .map_err(|e| io_err(parent, e))?;
        let backup_root = backup.path().join(name);
        std::fs::rename(&self.root, &backup_root).map_err(|e| io_err(&self.root, e))?;

        if let Err(e) = std::fs::rename(staging, &self.root) {
            if let Err(restore) = std::fs::rename(&backup_root, &self.root) {
                warn!(
                    root = %self.root.display(),
                    backup = %backup_root.display(),
                    error = %restore,
                    "failed to restore previous shadow store"
                );
                // Keep the backup on disk rather than deleting the only copy.
                let _ = backup.keep();
            }
            return Err(io_err(&self.root, e));
        }
        Ok(())
    }
}

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl CsvLoader for ShadowStore {
    fn load(&self, key: &str, meta: &TableMeta) -> Result<Vec<u8>, LoadError> {
        let Some(path) = self.artifact_path(&meta.csv_path) else {
            return Err(LoadError::Missing {
                key: key.to_string(),
                path: meta.csv_path.clone(),
            });
        };
        std::fs::read(&path).map_err(|source| {
            let path = path.display().to_string();
            if source.kind() == std::io::ErrorKind::NotFound {
                LoadError::Missing {
                    key: key.to_string(),
                    path,
                }
            } else {
                LoadError::Io {
                    key: key.to_string(),
                    path,
                    source,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{WorkbookMeta, csv_relative_path};

    fn registry_with(keys: &[(&str, &str)]) -> Registry {
        let mut reg = Registry::new("test");
        for (wb, table) in keys {
            reg.workbooks.insert(
                wb.to_string(),
                WorkbookMeta {
                    workbook_id: wb.to_string(),
                    source_path: format!("{wb}.xlsx"),
                    hash: "sha256:00".into(),
                },
            );
            let meta = TableMeta {
                table_id: table.to_string(),
                workbook_id: wb.to_string(),
                sheet_name: "S".into(),
                tag: format!("~{table}"),
                tag_type: table.to_string(),
                logical_name: None,
                tag_position: "A1".into(),
                columns: vec!["A".into()],
                primary_keys: Vec::new(),
                row_count: 1,
                csv_path: csv_relative_path(wb, table),
                csv_sha256: String::new(),
                extracted_at: "2024-01-01T00:00:00Z".into(),
                schema_version: "v".into(),
            };
            reg.tables.insert(meta.composite_key(), meta);
        }
        reg
    }

    #[test]
    fn commit_writes_layout_and_replaces_previous_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShadowStore::new(dir.path().join("shadow"));

        let reg = registry_with(&[("aaaa0000", "fi_t")]);
        let mut artifacts = Artifacts::new();
        artifacts.insert("aaaa0000/fi_t".into(), b"A\n1\n".to_vec());
        store.commit(&reg, &artifacts).unwrap();

        assert!(store.has_registry());
        let meta = reg.table("aaaa0000/fi_t").unwrap();
        assert_eq!(store.load("aaaa0000/fi_t", meta).unwrap(), b"A\n1\n");

        let reg2 = registry_with(&[("bbbb1111", "uc_t")]);
        let mut artifacts2 = Artifacts::new();
        artifacts2.insert("bbbb1111/uc_t".into(), b"A\n2\n".to_vec());
        store.commit(&reg2, &artifacts2).unwrap();

        assert!(!store.root().join("aaaa0000").exists());
        assert_eq!(store.read_registry().unwrap().tables.len(), 1);
        let siblings = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(siblings, 1, "staging and backup directories are cleaned up");
    }

    #[test]
    fn failed_commit_leaves_previous_root_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShadowStore::new(dir.path().join("shadow"));
        let reg = registry_with(&[("aaaa0000", "fi_t")]);
        let mut artifacts = Artifacts::new();
        artifacts.insert("aaaa0000/fi_t".into(), b"A\n1\n".to_vec());
        store.commit(&reg, &artifacts).unwrap();
        let before = std::fs::read(store.registry_path()).unwrap();

        let bigger = registry_with(&[("aaaa0000", "fi_t"), ("bbbb1111", "uc_t")]);
        let err = store.commit(&bigger, &artifacts).unwrap_err();
        assert!(matches!(err, StoreError::MissingArtifact { ref key } if key == "bbbb1111/uc_t"));

        assert_eq!(std::fs::read(store.registry_path()).unwrap(), before);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_artifact_and_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShadowStore::new(dir.path());
        let reg = registry_with(&[("aaaa0000", "fi_t")]);
        let mut meta = reg.table("aaaa0000/fi_t").unwrap().clone();

        let err = store.load("aaaa0000/fi_t", &meta).unwrap_err();
        assert_eq!(err.code(), error_codes::LOAD_MISSING);
        assert_eq!(err.key(), "aaaa0000/fi_t");

        meta.csv_path = "../outside.csv".into();
        assert!(store.artifact_path(&meta.csv_path).is_none());
        assert!(matches!(
            store.load("aaaa0000/fi_t", &meta),
            Err(LoadError::Missing { .. })
        ));
    }

    #[test]
    fn memory_loader_serves_inserted_bytes() {
        let reg = registry_with(&[("aaaa0000", "fi_t")]);
        let meta = reg.table("aaaa0000/fi_t").unwrap();
        let mut loader = MemoryLoader::new();
        assert!(loader.load("aaaa0000/fi_t", meta).is_err());
        loader.insert("aaaa0000/fi_t", b"A\n".to_vec());
        assert_eq!(loader.load("aaaa0000/fi_t", meta).unwrap(), b"A\n");
    }
}
