//! Lazy, named resource factories.
//!
//! # Data Flow
//! ```text
//! make("default")
//!     → cached?  yes → clone of the shared handle
//!                no  → builder("default")
//!                        → named_config(conf, "kafka.writer", "default")
//!                        → connect
//!                        → Pair { conn, closer } cached under "default"
//!
//! RELOAD event → every ready entry evicted, its closer run
//! close()      → every entry closed, later make() fails with Closed
//! ```
//!
//! # Design Decisions
//! - One `OnceCell` per name inside a `DashMap`: construction is serialized
//!   per name while different names proceed in parallel
//! - Failed builds leave the cell empty, so errors are never cached
//! - Reload eviction is coarse: every entry goes, not only the changed ones

pub mod cache;
pub mod error;
pub mod pair;

pub use cache::{Factory, Maker};
pub use error::FactoryError;
pub use pair::{Closer, Pair};

use serde::de::DeserializeOwned;

use crate::config::{ConfigAccessor, ConfigAccessorExt};

/// Read the configuration for instance `name` under `prefix`.
///
/// `named_config::<WriterConfig>(conf, "kafka.writer", "default")` reads
/// `kafka.writer.default`. A missing or malformed subtree is reported as
/// `ConfigInvalid`.
pub fn named_config<C: DeserializeOwned>(
    conf: &dyn ConfigAccessor,
    prefix: &str,
    name: &str,
) -> Result<C, FactoryError> {
    let path = format!("{prefix}.{name}");
    conf.unmarshal(&path).map_err(|source| FactoryError::ConfigInvalid {
        name: name.to_string(),
        path,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ConfigError};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Writer {
        brokers: Vec<String>,
    }

    #[test]
    fn named_config_reads_scoped_path() {
        let conf = Config::from_toml_str("[kafka.writer.default]\nbrokers = [\"b1\"]\n").unwrap();
        let writer: Writer = named_config(&conf, "kafka.writer", "default").unwrap();
        assert_eq!(writer.brokers, vec!["b1"]);
    }

    #[test]
    fn named_config_reports_missing_and_malformed() {
        let conf = Config::from_toml_str("[kafka.writer.bad]\nbrokers = 3\n").unwrap();

        match named_config::<Writer>(&conf, "kafka.writer", "default") {
            Err(FactoryError::ConfigInvalid { name, path, source }) => {
                assert_eq!(name, "default");
                assert_eq!(path, "kafka.writer.default");
                assert!(matches!(source, ConfigError::Missing { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }

        assert!(matches!(
            named_config::<Writer>(&conf, "kafka.writer", "bad"),
            Err(FactoryError::ConfigInvalid {
                source: ConfigError::Invalid { .. },
                ..
            })
        ));
    }
}
