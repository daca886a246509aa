//! Configuration schema definitions.
//!
//! Typed views over the well-known sections. Every section is optional in
//! the file; missing fields fall back to the defaults below.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Env {
    #[default]
    Local,
    Testing,
    Staging,
    Production,
}

impl Env {
    pub fn as_str(&self) -> &'static str {
        match self {
            Env::Local => "local",
            Env::Testing => "testing",
            Env::Staging => "staging",
            Env::Production => "production",
        }
    }
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application name, registered in the container as a plain value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppName(pub String);

impl fmt::Display for AppName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `[app]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub env: Env,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "app".to_string(),
            env: Env::Local,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level filter: trace, debug, info, warn, error or none.
    pub level: String,

    /// Output format: "compact" or "pretty".
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// `[http]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address. Port 0 picks a free port.
    pub addr: SocketAddr,

    pub disable: bool,

    /// Per-request deadline.
    #[serde(with = "duration")]
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            disable: false,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// `[rpc]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    pub addr: SocketAddr,

    pub disable: bool,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Longest accepted request line, newline excluded.
    pub max_request_bytes: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 9090)),
            disable: false,
            max_connections: 1024,
            max_request_bytes: 1024 * 1024,
        }
    }
}

/// `[cron]` section.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CronConfig {
    pub disable: bool,

    /// Per-job overrides keyed by job name.
    pub jobs: std::collections::BTreeMap<String, CronJobConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CronJobConfig {
    /// Overrides the interval the job was registered with.
    #[serde(with = "duration::option")]
    pub every: Option<Duration>,
}

/// `[command]` section.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CommandConfig {
    pub disable: bool,
}

/// Durations as humantime strings ("30s", "1m 30s") or integer nanoseconds.
pub(crate) mod duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Nanos(u64),
    }

    fn convert<E: serde::de::Error>(raw: Raw) -> Result<Duration, E> {
        match raw {
            Raw::Text(text) => humantime::parse_duration(&text).map_err(E::custom),
            Raw::Nanos(nanos) => Ok(Duration::from_nanos(nanos)),
        }
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        convert(Raw::deserialize(deserializer)?)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
            Option::<Raw>::deserialize(deserializer)?
                .map(convert)
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let http: HttpConfig = toml::from_str("disable = true").unwrap();
        assert!(http.disable);
        assert_eq!(http.request_timeout, Duration::from_secs(30));
        assert_eq!(http.addr.port(), 8080);
    }

    #[test]
    fn durations_accept_text_and_nanos() {
        let http: HttpConfig = toml::from_str("request_timeout = \"1m 30s\"").unwrap();
        assert_eq!(http.request_timeout, Duration::from_secs(90));

        let http: HttpConfig = toml::from_str("request_timeout = 1000").unwrap();
        assert_eq!(http.request_timeout, Duration::from_micros(1));
    }

    #[test]
    fn cron_jobs_parse() {
        let cron: CronConfig = toml::from_str("[jobs.flush]\nevery = \"5s\"\n[jobs.noop]\n").unwrap();
        assert_eq!(cron.jobs["flush"].every, Some(Duration::from_secs(5)));
        assert_eq!(cron.jobs["noop"].every, None);
    }

    #[test]
    fn env_parses_lowercase() {
        let app: AppSection = toml::from_str("name = \"svc\"\nenv = \"production\"").unwrap();
        assert_eq!(app.env, Env::Production);
        assert_eq!(app.env.to_string(), "production");
    }
}
