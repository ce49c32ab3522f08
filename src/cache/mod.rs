//! Snapshot Cache
//!
//! Extracted snapshots are cached per project and connection name so `ask`
//! can run without re-reading the catalog. The cache is advisory: anything in
//! it can be rebuilt by extracting again.
//!
//! # Write Semantics
//! - A save replaces the previous snapshot wholesale (last write wins)
//! - Only complete snapshots are ever saved; a failed extraction leaves the
//!   previous entry untouched
//! - Connection names are only unique within a project, so every entry is
//!   scoped by the project key as well
//!
//! # Storage Location
//! [`FileSchemaStore`] writes one JSON document per connection under
//! `<cache dir>/schemalens/schemas/<sha256(project)>/<name>.json`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use sha2::{Digest, Sha256};

use crate::config::validate_connection_name;
use crate::error::{LensError, Result};
use crate::schema::ExtractedSchema;

/// Keyed storage for extracted snapshots
pub trait SchemaStore {
    /// Cached snapshot for connection `name` of `project`, if any
    fn load(&self, project: &str, name: &str) -> Result<Option<ExtractedSchema>>;

    /// Replace the snapshot for connection `name` of `project`
    fn save(&self, project: &str, name: &str, schema: &ExtractedSchema) -> Result<()>;

    /// Drop the snapshot for connection `name` of `project`; returns whether
    /// one existed
    fn remove(&self, project: &str, name: &str) -> Result<bool>;
}

/// Directory name for a project key: lowercase hex SHA-256 of the key
#[must_use]
pub fn project_dir_name(project: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(project.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Snapshot store backed by JSON files
#[derive(Debug, Clone)]
pub struct FileSchemaStore {
    dir: PathBuf,
}

impl FileSchemaStore {
    /// Store rooted at the platform cache directory
    pub fn new() -> Result<Self> {
        let dir = dirs::cache_dir()
            .ok_or_else(|| LensError::config_error("Could not determine cache directory"))?
            .join("schemalens")
            .join("schemas");
        Ok(Self { dir })
    }

    /// Store rooted at an explicit directory
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, project: &str, name: &str) -> Result<PathBuf> {
        validate_connection_name(name)?;
        Ok(self
            .dir
            .join(project_dir_name(project))
            .join(format!("{name}.json")))
    }
}

impl SchemaStore for FileSchemaStore {
    fn load(&self, project: &str, name: &str) -> Result<Option<ExtractedSchema>> {
        let path = self.path_for(project, name)?;
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path).map_err(|e| {
            LensError::config_error(format!(
                "Failed to read cached schema {}: {e}",
                path.display()
            ))
        })?;

        match serde_json::from_str(&contents) {
            Ok(schema) => Ok(Some(schema)),
            Err(e) => {
                // Unreadable entries are treated as a miss; extracting again rewrites them
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "discarding unreadable cached schema"
                );
                Ok(None)
            }
        }
    }

    fn save(&self, project: &str, name: &str, schema: &ExtractedSchema) -> Result<()> {
        let path = self.path_for(project, name)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                LensError::config_error(format!(
                    "Failed to create cache directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let json = serde_json::to_string(schema)
            .map_err(|e| LensError::config_error(format!("Failed to serialize schema: {e}")))?;

        // Write then rename so readers never observe a half-written file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| {
            LensError::config_error(format!(
                "Failed to write cached schema {}: {e}",
                tmp.display()
            ))
        })?;
        fs::rename(&tmp, &path).map_err(|e| {
            LensError::config_error(format!(
                "Failed to replace cached schema {}: {e}",
                path.display()
            ))
        })?;

        Ok(())
    }

    fn remove(&self, project: &str, name: &str) -> Result<bool> {
        let path = self.path_for(project, name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LensError::config_error(format!(
                "Failed to remove cached schema {}: {e}",
                path.display()
            ))),
        }
    }
}

type EntryKey = (String, String);

/// In-process snapshot store
#[derive(Debug, Default)]
pub struct MemorySchemaStore {
    entries: RwLock<HashMap<EntryKey, ExtractedSchema>>,
}

impl MemorySchemaStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> LensError {
    LensError::config_error("Schema cache lock poisoned")
}

fn entry_key(project: &str, name: &str) -> EntryKey {
    (project.to_string(), name.to_string())
}

impl SchemaStore for MemorySchemaStore {
    fn load(&self, project: &str, name: &str) -> Result<Option<ExtractedSchema>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(&entry_key(project, name)).cloned())
    }

    fn save(&self, project: &str, name: &str, schema: &ExtractedSchema) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(entry_key(project, name), schema.clone());
        Ok(())
    }

    fn remove(&self, project: &str, name: &str) -> Result<bool> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Ok(entries.remove(&entry_key(project, name)).is_some())
    }
}
