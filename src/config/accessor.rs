//! Path-addressed read access to configuration.
//!
//! Paths are dot separated (`kafka.writer.default`). The empty path
//! addresses the whole tree.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::config::loader::ConfigError;

/// Read access to hierarchical configuration.
///
/// Implemented by [`Config`](crate::config::Config) and by routed sub-views.
/// Adapters only ever need this trait.
pub trait ConfigAccessor: Send + Sync {
    /// Value at `path`, or `None` when the path does not exist.
    fn get(&self, path: &str) -> Option<toml::Value>;
}

/// Typed helpers available on every accessor, including `dyn ConfigAccessor`.
pub trait ConfigAccessorExt: ConfigAccessor {
    /// Deserialize the subtree at `path`.
    ///
    /// Fails with `Missing` when the path is absent and `Invalid` when it
    /// does not have the shape of `T`.
    fn unmarshal<T: DeserializeOwned>(&self, path: &str) -> Result<T, ConfigError> {
        let value = self.get(path).ok_or_else(|| ConfigError::Missing {
            path: path.to_owned(),
        })?;
        value.try_into::<T>().map_err(|source| ConfigError::Invalid {
            path: path.to_owned(),
            source,
        })
    }

    /// Deserialize the subtree at `path`, falling back to `T::default()`
    /// when the path is absent.
    fn unmarshal_or_default<T: DeserializeOwned + Default>(&self, path: &str) -> Result<T, ConfigError> {
        match self.unmarshal(path) {
            Err(ConfigError::Missing { .. }) => Ok(T::default()),
            other => other,
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Boolean at `path`. Accepts `true`/`false` strings from inline overrides.
    fn bool(&self, path: &str) -> bool {
        match self.get(path) {
            Some(toml::Value::Boolean(b)) => b,
            Some(toml::Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    fn string(&self, path: &str) -> Option<String> {
        match self.get(path)? {
            toml::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }

    fn strings(&self, path: &str) -> Vec<String> {
        match self.get(path) {
            Some(toml::Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    toml::Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            Some(toml::Value::String(s)) => vec![s],
            _ => Vec::new(),
        }
    }

    fn float(&self, path: &str) -> Option<f64> {
        match self.get(path)? {
            toml::Value::Float(f) => Some(f),
            toml::Value::Integer(i) => Some(i as f64),
            _ => None,
        }
    }

    /// Duration at `path`, as a humantime string (`"30s"`) or nanoseconds.
    fn duration(&self, path: &str) -> Option<Duration> {
        match self.get(path)? {
            toml::Value::String(s) => humantime::parse_duration(&s).ok(),
            toml::Value::Integer(n) => u64::try_from(n).ok().map(Duration::from_nanos),
            _ => None,
        }
    }
}

impl<T: ConfigAccessor + ?Sized> ConfigAccessorExt for T {}

impl<T: ConfigAccessor + ?Sized> ConfigAccessor for Arc<T> {
    fn get(&self, path: &str) -> Option<toml::Value> {
        (**self).get(path)
    }
}

/// A sub-view rooted at a prefix of another accessor.
pub struct Routed {
    parent: Arc<dyn ConfigAccessor>,
    prefix: String,
}

impl Routed {
    pub fn new(parent: Arc<dyn ConfigAccessor>, prefix: impl Into<String>) -> Self {
        Self {
            parent,
            prefix: prefix.into(),
        }
    }
}

impl ConfigAccessor for Routed {
    fn get(&self, path: &str) -> Option<toml::Value> {
        self.parent.get(&join_path(&self.prefix, path))
    }
}

/// Sub-view of `conf` rooted at `prefix`.
pub fn route(conf: &Arc<dyn ConfigAccessor>, prefix: &str) -> Arc<dyn ConfigAccessor> {
    Arc::new(Routed::new(Arc::clone(conf), prefix))
}

pub(crate) fn join_path(prefix: &str, path: &str) -> String {
    match (prefix.is_empty(), path.is_empty()) {
        (true, _) => path.to_owned(),
        (false, true) => prefix.to_owned(),
        (false, false) => format!("{prefix}.{path}"),
    }
}

/// Walk `table` along a dotted path.
pub(crate) fn lookup(table: &toml::Table, path: &str) -> Option<toml::Value> {
    if path.is_empty() {
        return Some(toml::Value::Table(table.clone()));
    }
    let mut segments = path.split('.');
    let mut current = table.get(segments.next()?)?;
    for segment in segments {
        current = current.as_table()?.get(segment)?;
    }
    Some(current.clone())
}
