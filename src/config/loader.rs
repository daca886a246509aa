//! Layered configuration loading.
//!
//! # Responsibilities
//! - Read TOML files from disk
//! - Merge file layers and inline overrides into one snapshot
//! - Validate every snapshot before it becomes visible
//! - Swap the snapshot atomically on reload
//!
//! # Design Decisions
//! - Later layers win; tables merge key by key, everything else replaces
//! - A failed reload keeps the current snapshot
//! - Readers hold an `Arc` snapshot and never block a reload

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::config::accessor::{lookup, ConfigAccessor};
use crate::config::validation::{validate_core, ValidationError, Validator};

/// Error type for configuration loading and access.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("configuration path `{path}` is missing")]
    Missing { path: String },

    #[error("configuration path `{path}` is invalid: {source}")]
    Invalid {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("config watcher failed: {0}")]
    Watch(#[from] notify::Error),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Clone)]
enum Layer {
    File(PathBuf),
    Table(toml::Table),
    Inline { path: String, value: toml::Value },
}

/// Read a TOML file into a table.
pub fn load_file(path: &Path) -> Result<toml::Table, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    content.parse::<toml::Table>().map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Builder for [`Config`].
#[derive(Default)]
pub struct ConfigBuilder {
    layers: Vec<Layer>,
    validators: Vec<Validator>,
}

impl ConfigBuilder {
    /// Add a TOML file layer.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.layers.push(Layer::File(path.into()));
        self
    }

    /// Add an already parsed table as a layer.
    pub fn table(mut self, table: toml::Table) -> Self {
        self.layers.push(Layer::Table(table));
        self
    }

    /// Override a single path, e.g. `inline("http.disable", true)`.
    pub fn inline(mut self, path: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.layers.push(Layer::Inline {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    /// Add a validator that can veto a load or reload.
    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&toml::Table) -> Result<(), Vec<ValidationError>> + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(validator));
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        let snapshot = assemble(&self.layers, &self.validators)?;
        Ok(Config {
            layers: Mutex::new(self.layers),
            validators: self.validators,
            snapshot: ArcSwap::from_pointee(snapshot),
        })
    }
}

/// Layered, hot-reloadable configuration.
pub struct Config {
    layers: Mutex<Vec<Layer>>,
    validators: Vec<Validator>,
    snapshot: ArcSwap<toml::Table>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Configuration with no layers at all.
    pub fn empty() -> Self {
        Self {
            layers: Mutex::new(Vec::new()),
            validators: Vec::new(),
            snapshot: ArcSwap::from_pointee(toml::Table::new()),
        }
    }

    /// Parse a TOML document into a single-layer configuration.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let table = content
            .parse::<toml::Table>()
            .map_err(|source| ConfigError::Parse {
                path: PathBuf::from("<inline>"),
                source,
            })?;
        Self::builder().table(table).build()
    }

    /// Current merged snapshot.
    pub fn snapshot(&self) -> Arc<toml::Table> {
        self.snapshot.load_full()
    }

    /// Add an inline override and publish the new snapshot.
    ///
    /// The override is kept across reloads. On validation failure the
    /// override is discarded and the snapshot is unchanged.
    pub fn set(&self, path: impl Into<String>, value: impl Into<toml::Value>) -> Result<(), ConfigError> {
        let mut layers = self.lock_layers();
        let mut next = layers.clone();
        next.push(Layer::Inline {
            path: path.into(),
            value: value.into(),
        });
        let snapshot = assemble(&next, &self.validators)?;
        *layers = next;
        self.snapshot.store(Arc::new(snapshot));
        Ok(())
    }

    /// Re-read every layer and publish the result.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let layers = self.lock_layers();
        let snapshot = assemble(&layers, &self.validators)?;
        self.snapshot.store(Arc::new(snapshot));
        tracing::info!(layers = layers.len(), "Configuration reloaded");
        Ok(())
    }

    /// Paths of the file layers, for the watcher.
    pub fn files(&self) -> Vec<PathBuf> {
        self.lock_layers()
            .iter()
            .filter_map(|layer| match layer {
                Layer::File(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock_layers(&self) -> std::sync::MutexGuard<'_, Vec<Layer>> {
        self.layers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConfigAccessor for Config {
    fn get(&self, path: &str) -> Option<toml::Value> {
        lookup(&self.snapshot.load(), path)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("layers", &self.lock_layers().len())
            .field("keys", &self.snapshot.load().len())
            .finish()
    }
}

fn assemble(layers: &[Layer], validators: &[Validator]) -> Result<toml::Table, ConfigError> {
    let mut merged = toml::Table::new();
    for layer in layers {
        match layer {
            Layer::File(path) => merge(&mut merged, load_file(path)?),
            Layer::Table(table) => merge(&mut merged, table.clone()),
            Layer::Inline { path, value } => insert_path(&mut merged, path, value.clone()),
        }
    }

    let mut errors = Vec::new();
    if let Err(mut found) = validate_core(&merged) {
        errors.append(&mut found);
    }
    for validator in validators {
        if let Err(mut found) = validator(&merged) {
            errors.append(&mut found);
        }
    }
    if errors.is_empty() {
        Ok(merged)
    } else {
        Err(ConfigError::Validation(errors))
    }
}

/// Deep-merge `overlay` into `base`.
fn merge(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Set `value` at a dotted path, creating intermediate tables.
fn insert_path(table: &mut toml::Table, path: &str, value: toml::Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else {
        return;
    };

    let mut current = table;
    for segment in segments {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        if !entry.is_table() {
            *entry = toml::Value::Table(toml::Table::new());
        }
        let toml::Value::Table(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(last.to_owned(), value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigAccessorExt;

    fn temp_file(content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("bootkit-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn later_layers_override_earlier() {
        let path = temp_file("[http]\naddr = \"127.0.0.1:1\"\nrequest_timeout = \"5s\"\n");
        let conf = Config::builder()
            .file(&path)
            .inline("http.addr", "127.0.0.1:2")
            .build()
            .unwrap();

        assert_eq!(conf.string("http.addr").as_deref(), Some("127.0.0.1:2"));
        assert_eq!(conf.string("http.request_timeout").as_deref(), Some("5s"));
        fs::remove_file(path).unwrap_or_default();
    }

    #[test]
    fn set_injects_missing_path() {
        let conf = Config::empty();
        assert!(!conf.exists("kafka.writer.default"));

        conf.set("kafka.writer.default.brokers", vec!["127.0.0.1:9092"]).unwrap();
        assert_eq!(conf.strings("kafka.writer.default.brokers"), vec!["127.0.0.1:9092"]);
    }

    #[test]
    fn reload_picks_up_file_changes() {
        let path = temp_file("foo = \"baz\"\n");
        let conf = Config::builder().file(&path).build().unwrap();
        assert_eq!(conf.string("foo").as_deref(), Some("baz"));

        fs::write(&path, "foo = \"bar\"\n").unwrap();
        conf.reload().unwrap();
        assert_eq!(conf.string("foo").as_deref(), Some("bar"));
        assert_eq!(conf.files(), vec![path.clone()]);
        fs::remove_file(path).unwrap_or_default();
    }

    #[test]
    fn failed_reload_keeps_snapshot() {
        let path = temp_file("foo = \"baz\"\n");
        let conf = Config::builder().file(&path).build().unwrap();

        fs::write(&path, "foo = [unterminated").unwrap();
        assert!(matches!(conf.reload(), Err(ConfigError::Parse { .. })));
        assert_eq!(conf.string("foo").as_deref(), Some("baz"));
        fs::remove_file(path).unwrap_or_default();
    }

    #[test]
    fn validator_vetoes_build() {
        let result = Config::builder()
            .inline("foo", "bar")
            .validator(|_| {
                Err(vec![ValidationError {
                    path: "foo".into(),
                    message: "bad config".into(),
                }])
            })
            .build();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("bad config"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = Config::builder().file("/definitely/not/here.toml").build();
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
