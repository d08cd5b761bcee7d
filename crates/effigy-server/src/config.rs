//! Runtime configuration: environment, config file, CLI overrides.
//!
//! Precedence, lowest to highest: built-in defaults, process environment,
//! the config file's `admin` section, CLI flags.

use crate::error::{Error, Result};
use crate::imposter::types::{ProxyConfig, StubSpec};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Resolved service settings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub admin_port: u16,
    pub port_range_min: u16,
    pub port_range_max: u16,
    pub max_imposters: usize,
    pub log_level: LogLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            admin_port: 2525,
            port_range_min: 3000,
            port_range_max: 4000,
            max_imposters: 100,
            log_level: LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(Error::ServiceError(format!("invalid LOG_LEVEL: {other}"))),
        }
    }
}

/// `admin` section of a config file. Every field optional; present fields
/// override the environment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSection {
    #[serde(alias = "ADMIN_PORT")]
    pub admin_port: Option<u16>,
    #[serde(alias = "PORT_RANGE_MIN")]
    pub port_range_min: Option<u16>,
    #[serde(alias = "PORT_RANGE_MAX")]
    pub port_range_max: Option<u16>,
    #[serde(alias = "MAX_IMPOSTERS")]
    pub max_imposters: Option<usize>,
    #[serde(alias = "LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Imposter pre-created (and started) from the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupImposter {
    pub port: u16,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub stubs: Vec<StubSpec>,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
}

/// Top-level config file document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub admin: AdminSection,
    #[serde(default)]
    pub imposters: Vec<StartupImposter>,
}

impl ConfigFile {
    /// Load a config file. JSON is detected by a leading `{`; anything else
    /// is parsed as YAML (which is a JSON superset anyway).
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ServiceError(format!("cannot read config file {path:?}: {e}")))?;
        let parsed = if content.trim_start().starts_with('{') {
            serde_json::from_str(&content)
                .map_err(|e| Error::ParseError(format!("invalid config file {path:?}: {e}")))?
        } else {
            serde_yaml::from_str(&content)
                .map_err(|e| Error::ParseError(format!("invalid config file {path:?}: {e}")))?
        };
        info!("Loaded config file {:?}", path);
        Ok(parsed)
    }
}

impl Settings {
    /// Resolve settings from the process environment on top of defaults.
    pub fn from_env() -> Result<Self> {
        let mut settings = Settings::default();
        if let Some(v) = env_parse::<u16>("ADMIN_PORT")? {
            settings.admin_port = v;
        }
        if let Some(v) = env_parse::<u16>("PORT_RANGE_MIN")? {
            settings.port_range_min = v;
        }
        if let Some(v) = env_parse::<u16>("PORT_RANGE_MAX")? {
            settings.port_range_max = v;
        }
        if let Some(v) = env_parse::<usize>("MAX_IMPOSTERS")? {
            settings.max_imposters = v;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            settings.log_level = LogLevel::parse(&v)?;
        }
        Ok(settings)
    }

    /// Overlay the config file's `admin` section.
    pub fn apply_file(&mut self, admin: &AdminSection) -> Result<()> {
        if let Some(v) = admin.admin_port {
            self.admin_port = v;
        }
        if let Some(v) = admin.port_range_min {
            self.port_range_min = v;
        }
        if let Some(v) = admin.port_range_max {
            self.port_range_max = v;
        }
        if let Some(v) = admin.max_imposters {
            self.max_imposters = v;
        }
        if let Some(ref v) = admin.log_level {
            self.log_level = LogLevel::parse(v)?;
        }
        Ok(())
    }

    /// Validate cross-field constraints. Violations are startup failures.
    pub fn validate(&self) -> Result<()> {
        if self.port_range_min > self.port_range_max {
            return Err(Error::ServiceError(format!(
                "PORT_RANGE_MIN ({}) must not exceed PORT_RANGE_MAX ({})",
                self.port_range_min, self.port_range_max
            )));
        }
        if self.max_imposters == 0 {
            return Err(Error::ServiceError(
                "MAX_IMPOSTERS must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::ServiceError(format!("invalid {key}: {raw}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.admin_port, 2525);
        assert_eq!(s.port_range_min, 3000);
        assert_eq!(s.port_range_max, 4000);
        assert_eq!(s.max_imposters, 100);
        assert_eq!(s.log_level, LogLevel::Info);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_range_violation_is_startup_failure() {
        let s = Settings {
            port_range_min: 5000,
            port_range_max: 4000,
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("DEBUG").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::parse("warning").unwrap(), LogLevel::Warn);
        assert!(LogLevel::parse("verbose").is_err());
    }

    #[test]
    fn test_apply_file_overrides() {
        let mut s = Settings::default();
        let admin = AdminSection {
            admin_port: Some(3535),
            port_range_min: None,
            port_range_max: Some(4500),
            max_imposters: Some(10),
            log_level: Some("warn".to_string()),
        };
        s.apply_file(&admin).unwrap();
        assert_eq!(s.admin_port, 3535);
        assert_eq!(s.port_range_min, 3000);
        assert_eq!(s.port_range_max, 4500);
        assert_eq!(s.max_imposters, 10);
        assert_eq!(s.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_load_json_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "admin": {{"adminPort": 2626, "maxImposters": 5}},
                "imposters": [
                    {{"port": 3100, "name": "orders", "stubs": [
                        {{"predicates": [{{"field": "path", "operator": "equals", "value": "/ping"}}],
                          "responses": [{{"status": 200, "body": "pong"}}]}}
                    ]}}
                ]
            }}"#
        )
        .unwrap();

        let cfg = ConfigFile::load(file.path()).unwrap();
        assert_eq!(cfg.admin.admin_port, Some(2626));
        assert_eq!(cfg.imposters.len(), 1);
        assert_eq!(cfg.imposters[0].port, 3100);
        assert_eq!(cfg.imposters[0].name.as_deref(), Some("orders"));
        assert_eq!(cfg.imposters[0].stubs.len(), 1);
    }

    #[test]
    fn test_load_yaml_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "admin:\n  adminPort: 2727\nimposters:\n  - port: 3200\n"
        )
        .unwrap();

        let cfg = ConfigFile::load(file.path()).unwrap();
        assert_eq!(cfg.admin.admin_port, Some(2727));
        assert_eq!(cfg.imposters[0].port, 3200);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(ConfigFile::load(Path::new("/nonexistent/effigy.json")).is_err());
    }
}
