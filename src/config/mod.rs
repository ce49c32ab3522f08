//! Configuration Management
//!
//! This module handles loading and saving named connections to target databases.
//!
//! # Configuration Locations
//! - Local: `.schemalens/config.json` (per-project)
//! - Global: `~/.config/schemalens/connections.json` (per-user, keyed by project path)
//!
//! # Resolution Precedence
//! 1. Local config file (`.schemalens/config.json`)
//! 2. Global config file entry for the current project path
//!
//! # Named Connections
//! Connections are stored as named profiles (e.g., "local", "staging", "prod").
//! The first connection saved for a project becomes its default. Passwords may
//! be stored as a reference to an environment variable (`password_env`) and are
//! only resolved when a command needs them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::ConnectionConfig;
use crate::error::{LensError, Result};

/// Project configuration (per project path)
///
/// Contains named connections and a default pointer for a specific project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Named connections for this project
    pub connections: BTreeMap<String, StoredConnection>,

    /// Name of the default connection (must exist in connections map)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ProjectConfig {
    /// Add or replace a connection; the first one becomes the default
    pub fn insert(&mut self, name: impl Into<String>, stored: StoredConnection) {
        let name = name.into();
        if self.connections.is_empty() {
            self.default = Some(name.clone());
        }
        self.connections.insert(name, stored);
    }

    /// Remove a connection, clearing the default pointer if it pointed at it
    pub fn remove(&mut self, name: &str) -> bool {
        let removed = self.connections.remove(name).is_some();
        if self.default.as_deref() == Some(name) {
            self.default = None;
        }
        removed
    }

    /// Overlay `other` on top of `self`: its connections win by name, and its
    /// default wins when set
    pub fn merge(&mut self, other: ProjectConfig) {
        self.connections.extend(other.connections);
        if other.default.is_some() {
            self.default = other.default;
        }
    }
}

/// Global connection registry, organized by project path
///
/// ```json
/// {
///   "projects": {
///     "/home/user/project1": {
///       "connections": { "local": { ... }, "prod": { ... } },
///       "default": "local"
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionRegistry {
    /// Projects organized by project path
    pub projects: BTreeMap<String, ProjectConfig>,
}

/// Stored connection configuration
///
/// Same fields as `ConnectionConfig`, plus an optional environment variable
/// reference for the password.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredConnection {
    /// Connection configuration
    #[serde(flatten)]
    pub config: ConnectionConfig,

    /// Environment variable holding the password (if not stored directly)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl StoredConnection {
    /// Build the stored form of `config`
    ///
    /// With `password_env` set, the literal password is not kept.
    #[must_use]
    pub fn new(mut config: ConnectionConfig, password_env: Option<String>) -> Self {
        if password_env.is_some() {
            config.password = None;
        }
        Self {
            config,
            password_env,
        }
    }

    /// Resolve the password reference against the process environment
    pub fn resolve(&self) -> Result<ConnectionConfig> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve the password reference through an arbitrary lookup
    pub fn resolve_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<ConnectionConfig> {
        let mut config = self.config.clone();

        if let Some(env_var) = &self.password_env {
            let password = lookup(env_var).ok_or_else(|| {
                LensError::config_error(format!(
                    "Environment variable {env_var} not found for password"
                ))
            })?;
            config.password = Some(password);
        }

        Ok(config)
    }
}

/// Public view of a saved connection (never includes the password)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSummary {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
    pub is_default: bool,
}

/// Configuration file location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Local config: `.schemalens/config.json`
    Local,
    /// Global config: `~/.config/schemalens/connections.json`
    Global,
}

/// Connection names double as cache file names
pub fn validate_connection_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(LensError::invalid_input(format!(
            "Connection name '{name}' may only contain letters, digits, '-', '_' and '.'"
        )))
    }
}

/// Get path to local config file (`.schemalens/config.json` under `project_dir`)
#[must_use]
pub fn local_config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(".schemalens").join("config.json")
}

/// Get path to global config file (`~/.config/schemalens/connections.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| LensError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("schemalens").join("connections.json"))
}

/// Get the current project path (canonicalized current working directory)
pub fn current_project_dir() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        LensError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    current_dir.canonicalize().map_err(|e| {
        LensError::config_error(format!("Could not canonicalize current directory: {e}"))
    })
}

fn read_json<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        LensError::config_error(format!("Could not read config file {}: {e}", path.display()))
    })?;

    serde_json::from_str(&contents).map_err(|e| {
        LensError::config_error(format!("Invalid config file {}: {e}", path.display()))
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            LensError::config_error(format!("Could not create config directory: {e}"))
        })?;
    }

    let contents = serde_json::to_string_pretty(value)
        .map_err(|e| LensError::config_error(format!("Could not serialize config: {e}")))?;

    fs::write(path, contents)
        .map_err(|e| LensError::config_error(format!("Could not write config file: {e}")))
}

/// Local and global config files for one project
#[derive(Debug, Clone)]
pub struct ConfigStore {
    local_path: PathBuf,
    global_path: PathBuf,
    project: String,
}

impl ConfigStore {
    /// Config files for the current working directory
    pub fn discover() -> Result<Self> {
        let project_dir = current_project_dir()?;
        Ok(Self::new(
            local_config_path(&project_dir),
            global_config_path()?,
            project_key(&project_dir)?,
        ))
    }

    /// Config files at explicit locations
    pub fn new(
        local_path: impl Into<PathBuf>,
        global_path: impl Into<PathBuf>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            local_path: local_path.into(),
            global_path: global_path.into(),
            project: project.into(),
        }
    }

    /// Key of the project these files belong to (its canonical path)
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    #[must_use]
    pub fn path(&self, location: ConfigLocation) -> &Path {
        match location {
            ConfigLocation::Local => &self.local_path,
            ConfigLocation::Global => &self.global_path,
        }
    }

    fn load_local(&self) -> Result<ProjectConfig> {
        read_json(&self.local_path)
    }

    fn load_global(&self) -> Result<ConnectionRegistry> {
        read_json(&self.global_path)
    }

    /// Effective project config: global entry overlaid with the local file
    pub fn load_merged(&self) -> Result<ProjectConfig> {
        let mut merged = self
            .load_global()?
            .projects
            .remove(&self.project)
            .unwrap_or_default();
        merged.merge(self.load_local()?);
        Ok(merged)
    }

    /// Resolve a connection by name, or the project default when `name` is `None`
    ///
    /// Returns the effective name together with the resolved config.
    pub fn resolve(&self, name: Option<&str>) -> Result<(String, ConnectionConfig)> {
        let project = self.load_merged()?;

        let conn_name = match name {
            Some(n) => n.to_string(),
            None => project.default.clone().ok_or_else(|| {
                if project.connections.is_empty() {
                    LensError::not_found(format!(
                        "No connections saved for project '{}'. \
                         Run 'schemalens connect' to create one.",
                        self.project
                    ))
                } else {
                    let available: Vec<_> = project.connections.keys().collect();
                    LensError::not_found(format!(
                        "No default connection set. Available connections: {available:?}. \
                         Specify one with --name."
                    ))
                }
            })?,
        };

        let stored = project.connections.get(&conn_name).ok_or_else(|| {
            let available: Vec<_> = project.connections.keys().collect();
            LensError::not_found(format!(
                "Connection '{conn_name}'. Available connections: {available:?}"
            ))
        })?;

        Ok((conn_name.clone(), stored.resolve()?))
    }

    /// Save a connection; the first connection of a file becomes its default
    pub fn save_connection(
        &self,
        name: &str,
        stored: StoredConnection,
        location: ConfigLocation,
    ) -> Result<()> {
        validate_connection_name(name)?;

        match location {
            ConfigLocation::Local => {
                let mut local = self.load_local()?;
                local.insert(name, stored);
                write_json(&self.local_path, &local)
            }
            ConfigLocation::Global => {
                let mut registry = self.load_global()?;
                registry
                    .projects
                    .entry(self.project.clone())
                    .or_default()
                    .insert(name, stored);
                write_json(&self.global_path, &registry)
            }
        }
    }

    /// Remove a connection from both files; returns whether any entry existed
    pub fn remove_connection(&self, name: &str) -> Result<bool> {
        let mut removed = false;

        let mut local = self.load_local()?;
        if local.remove(name) {
            write_json(&self.local_path, &local)?;
            removed = true;
        }

        let mut registry = self.load_global()?;
        if let Some(project) = registry.projects.get_mut(&self.project) {
            if project.remove(name) {
                if project.connections.is_empty() {
                    registry.projects.remove(&self.project);
                }
                write_json(&self.global_path, &registry)?;
                removed = true;
            }
        }

        Ok(removed)
    }

    /// List the effective connections for this project, sorted by name
    pub fn list_connections(&self) -> Result<Vec<ConnectionSummary>> {
        let project = self.load_merged()?;
        Ok(project
            .connections
            .iter()
            .map(|(name, stored)| ConnectionSummary {
                name: name.clone(),
                host: stored.config.host.clone(),
                port: stored.config.port,
                database: stored.config.database.clone(),
                user: stored.config.user.clone(),
                password_env: stored.password_env.clone(),
                is_default: project.default.as_deref() == Some(name.as_str()),
            })
            .collect())
    }
}

fn project_key(project_dir: &Path) -> Result<String> {
    project_dir
        .to_str()
        .map(String::from)
        .ok_or_else(|| LensError::config_error("Current directory path contains invalid UTF-8"))
}
