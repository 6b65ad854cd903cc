//! JSON settings for the event store host process.
//!
//! # Responsibility
//! - Load typed settings from a JSON file, writing defaults when it is
//!   missing.
//! - Apply environment overrides for the database path and log level.
//! - Edit settings by dotted key and persist the edits.
//!
//! # Invariants
//! - Every field has a default; a partial file is valid.
//! - Loading never touches the event database.
//! - Persisted edits never include environment overrides or resolved paths.

use crate::logging::default_log_level;
use crate::store::DEFAULT_QUERY_LIMIT;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const DB_PATH_ENV: &str = "ATLAS_DB_PATH";
pub const LOG_LEVEL_ENV: &str = "ATLAS_LOG_LEVEL";

const DEFAULT_DB_FILE_NAME: &str = "atlas.db";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    /// Dotted key that names no setting.
    UnknownKey(String),
    /// Value that does not fit the setting's type.
    InvalidValue { key: String, source: serde_json::Error },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot access settings file `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "invalid settings file `{}`: {source}", path.display())
            }
            Self::UnknownKey(key) => write!(f, "unknown setting `{key}`"),
            Self::InvalidValue { key, source } => {
                write!(f, "invalid value for setting `{key}`: {source}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::UnknownKey(_) => None,
            Self::InvalidValue { source, .. } => Some(source),
        }
    }
}

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub query: QueryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Event database file. Relative paths resolve against the settings
    /// file's directory.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_FILE_NAME),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute log directory. Logging stays off when unset.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Row cap for queries that do not set their own limit.
    pub default_limit: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl AtlasConfig {
    /// Parses settings from JSON text. Environment overrides are not applied.
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Reads settings from `path`, or writes and returns defaults when the
    /// file does not exist yet. Environment overrides are applied last.
    pub fn load_or_init(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Ok(SettingsFile::open(path)?.effective())
    }

    /// Writes settings as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, contents).map_err(io_error)
    }

    /// Looks up a value with dot notation, e.g. `"database.path"`.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut current = serde_json::to_value(self).ok()?;
        for segment in key.split('.') {
            current = current.get_mut(segment)?.take();
        }
        Some(current)
    }

    /// Replaces one setting by dotted key.
    ///
    /// # Errors
    /// - `UnknownKey` when the key names no existing setting.
    /// - `InvalidValue` when the value does not fit; `self` is unchanged.
    pub fn set(&mut self, key: &str, value: serde_json::Value) -> Result<(), ConfigError> {
        let mut document = self.to_document(key)?;
        let (parent, leaf) = split_key(&mut document, key)?;
        match parent.get_mut(leaf) {
            Some(slot) => *slot = value,
            None => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        *self = Self::from_document(key, document)?;
        Ok(())
    }

    /// Restores one setting, or a whole section, to its default.
    ///
    /// Returns `false` when the key names no setting.
    pub fn delete(&mut self, key: &str) -> Result<bool, ConfigError> {
        let mut document = self.to_document(key)?;
        let removed = match split_key(&mut document, key) {
            Ok((parent, leaf)) => parent.remove(leaf).is_some(),
            Err(ConfigError::UnknownKey(_)) => false,
            Err(err) => return Err(err),
        };
        if removed {
            *self = Self::from_document(key, document)?;
        }
        Ok(removed)
    }

    /// Restores every setting to its default.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn to_document(&self, key: &str) -> Result<serde_json::Value, ConfigError> {
        serde_json::to_value(self).map_err(|source| ConfigError::InvalidValue {
            key: key.to_string(),
            source,
        })
    }

    fn from_document(key: &str, document: serde_json::Value) -> Result<Self, ConfigError> {
        serde_json::from_value(document).map_err(|source| ConfigError::InvalidValue {
            key: key.to_string(),
            source,
        })
    }

    fn resolve_relative_paths(&mut self, base_dir: &Path) {
        if self.database.path.is_relative() && !base_dir.as_os_str().is_empty() {
            self.database.path = base_dir.join(&self.database.path);
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(DB_PATH_ENV) {
            if !path.trim().is_empty() {
                self.database.path = PathBuf::from(path);
            }
        }
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            if !level.trim().is_empty() {
                self.logging.level = level;
            }
        }
    }
}

/// Walks `document` to the object holding the last segment of `key`.
fn split_key<'d, 'k>(
    document: &'d mut serde_json::Value,
    key: &'k str,
) -> Result<(&'d mut serde_json::Map<String, serde_json::Value>, &'k str), ConfigError> {
    let unknown = || ConfigError::UnknownKey(key.to_string());
    let (parents, leaf) = match key.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, key),
    };

    let mut current = document;
    for segment in parents.into_iter().flat_map(|parents| parents.split('.')) {
        current = current.get_mut(segment).ok_or_else(unknown)?;
    }
    let parent = current.as_object_mut().ok_or_else(unknown)?;
    Ok((parent, leaf))
}

/// A settings file on disk plus the settings it stores.
///
/// Edits are written back immediately. The stored settings never carry
/// environment overrides; `effective` layers them on for the host process.
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
    stored: AtlasConfig,
}

impl SettingsFile {
    /// Reads `path`, or writes defaults there when it does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let stored = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            AtlasConfig::parse(&contents).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            let defaults = AtlasConfig::default();
            defaults.save(&path)?;
            defaults
        };

        Ok(Self { path, stored })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Settings exactly as written in the file.
    pub fn stored(&self) -> &AtlasConfig {
        &self.stored
    }

    /// Settings the host process should run with: relative paths resolved
    /// against the file's directory, then environment overrides applied.
    pub fn effective(&self) -> AtlasConfig {
        let mut config = self.stored.clone();
        if let Some(parent) = self.path.parent() {
            config.resolve_relative_paths(parent);
        }
        config.apply_env_overrides();
        config
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.stored.get(key)
    }

    /// Sets one dotted key and saves the file.
    pub fn set(&mut self, key: &str, value: serde_json::Value) -> Result<(), ConfigError> {
        let mut edited = self.stored.clone();
        edited.set(key, value)?;
        self.persist(edited)
    }

    /// Restores one dotted key to its default and saves the file when it
    /// existed.
    pub fn delete(&mut self, key: &str) -> Result<bool, ConfigError> {
        let mut edited = self.stored.clone();
        if !edited.delete(key)? {
            return Ok(false);
        }
        self.persist(edited)?;
        Ok(true)
    }

    /// Writes defaults back to the file.
    pub fn reset(&mut self) -> Result<(), ConfigError> {
        self.persist(AtlasConfig::default())
    }

    fn persist(&mut self, edited: AtlasConfig) -> Result<(), ConfigError> {
        edited.save(&self.path)?;
        self.stored = edited;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{AtlasConfig, ConfigError, SettingsFile};
    use crate::store::DEFAULT_QUERY_LIMIT;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config = AtlasConfig::parse(r#"{ "query": { "default_limit": 25 } }"#).unwrap();

        assert_eq!(config.query.default_limit, 25);
        assert_eq!(config.database.path, PathBuf::from("atlas.db"));
        assert!(config.logging.dir.is_none());
    }

    #[test]
    fn dotted_lookup_reads_nested_values() {
        let config = AtlasConfig::default();

        assert_eq!(config.get("database.path"), Some(json!("atlas.db")));
        assert_eq!(
            config.get("query.default_limit"),
            Some(json!(DEFAULT_QUERY_LIMIT))
        );
        assert_eq!(config.get("database.missing"), None);
        assert_eq!(config.get("nope"), None);
    }

    #[test]
    fn load_or_init_writes_defaults_then_reads_them_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("settings.json");

        let created = AtlasConfig::load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created.query.default_limit, DEFAULT_QUERY_LIMIT);

        let reloaded = AtlasConfig::load_or_init(&path).unwrap();
        assert_eq!(reloaded, created);
    }

    #[test]
    fn relative_database_path_resolves_next_to_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "database": { "path": "events.db" } }"#).unwrap();

        let config = AtlasConfig::load_or_init(&path).unwrap();
        if std::env::var(super::DB_PATH_ENV).is_err() {
            assert_eq!(config.database.path, dir.path().join("events.db"));
        }
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = AtlasConfig::load_or_init(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn set_replaces_value_and_rejects_unknown_keys() {
        let mut config = AtlasConfig::default();

        config.set("query.default_limit", json!(50)).unwrap();
        assert_eq!(config.query.default_limit, 50);
        config.set("logging.dir", json!("/var/log/atlas")).unwrap();
        assert_eq!(config.logging.dir, Some(PathBuf::from("/var/log/atlas")));

        assert!(matches!(
            config.set("query.page_size", json!(10)),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            config.set("database.path.inner", json!("x")),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn set_with_wrong_type_leaves_config_unchanged() {
        let mut config = AtlasConfig::default();

        let err = config
            .set("query.default_limit", json!("lots"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert_eq!(config, AtlasConfig::default());
    }

    #[test]
    fn delete_restores_defaults() {
        let mut config = AtlasConfig::default();
        config.set("query.default_limit", json!(7)).unwrap();
        config.set("database.path", json!("other.db")).unwrap();

        assert!(config.delete("query.default_limit").unwrap());
        assert_eq!(config.query.default_limit, DEFAULT_QUERY_LIMIT);
        assert!(config.delete("database").unwrap());
        assert_eq!(config.database.path, PathBuf::from("atlas.db"));

        assert!(!config.delete("query.nope").unwrap());
        assert!(!config.delete("nope.deeper").unwrap());
    }

    #[test]
    fn settings_file_persists_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = SettingsFile::open(&path).unwrap();
        settings.set("query.default_limit", json!(25)).unwrap();
        settings.set("logging.level", json!("debug")).unwrap();
        assert!(settings.delete("logging.level").unwrap());

        let reopened = SettingsFile::open(&path).unwrap();
        assert_eq!(reopened.stored().query.default_limit, 25);
        assert_eq!(
            reopened.stored().logging.level,
            AtlasConfig::default().logging.level
        );
        assert_eq!(reopened.get("query.default_limit"), Some(json!(25)));
    }

    #[test]
    fn settings_file_reset_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "query": { "default_limit": 3 } }"#).unwrap();

        let mut settings = SettingsFile::open(&path).unwrap();
        assert_eq!(settings.stored().query.default_limit, 3);
        settings.reset().unwrap();

        let reopened = SettingsFile::open(&path).unwrap();
        assert_eq!(reopened.stored(), &AtlasConfig::default());
    }

    #[test]
    fn failed_edit_does_not_touch_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = SettingsFile::open(&path).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        assert!(settings.set("query.default_limit", json!(-1)).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
        assert_eq!(settings.stored(), &AtlasConfig::default());
    }

    #[test]
    fn in_memory_reset_drops_edits() {
        let mut config = AtlasConfig::default();
        config.set("query.default_limit", json!(9)).unwrap();
        config.reset();
        assert_eq!(config, AtlasConfig::default());
    }
}
