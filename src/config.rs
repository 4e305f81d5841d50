use crate::backend::config::Locality;
use crate::backend::{BackendConfig, BackendKind};
use crate::error::{StoreError, StoreResult};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap();
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendSection {
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_locality")]
    pub locality: String,
    /// Connection URL; when absent SQLite runs in memory and a local
    /// MongoDB is assumed
    #[serde(default)]
    pub url: Option<String>,
    /// Database used by the CLI when `--db` is not given
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub socket_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSection {
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_kind() -> String {
    "sqlite".to_string()
}

fn default_locality() -> String {
    "local".to_string()
}

fn default_database() -> String {
    "main".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            locality: default_locality(),
            url: None,
            database: default_database(),
            max_connections: default_max_connections(),
            connect_timeout_ms: default_connect_timeout_ms(),
            socket_timeout_ms: None,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> StoreResult<Self> {
        let path = config_path.as_ref();

        if !path.exists() {
            return Err(StoreError::Configuration(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            StoreError::Configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        // Expand environment variables in YAML content
        let expanded_content = Self::expand_env_vars(&content)?;

        serde_yaml::from_str(&expanded_content).map_err(|e| {
            StoreError::Configuration(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// In-memory SQLite with default pool settings
    pub fn default_config() -> Self {
        AppConfig {
            backend: BackendSection::default(),
            logging: LoggingSection::default(),
        }
    }

    /// Replace `${VAR}` and `${VAR:-default}` with environment values
    fn expand_env_vars(content: &str) -> StoreResult<String> {
        let mut expanded = String::with_capacity(content.len());
        let mut last = 0;

        for caps in ENV_VAR.captures_iter(content) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            let var_name = caps.get(1).map_or("", |m| m.as_str());

            let value = match (std::env::var(var_name), caps.get(2)) {
                (Ok(val), _) => val,
                (Err(_), Some(default)) => default.as_str().to_string(),
                (Err(_), None) => {
                    return Err(StoreError::Configuration(format!(
                        "Environment variable {} not found and no default provided",
                        var_name
                    )))
                }
            };

            expanded.push_str(&content[last..whole.start]);
            expanded.push_str(&value);
            last = whole.end;
        }

        expanded.push_str(&content[last..]);
        Ok(expanded)
    }

    /// Apply the process environment on top of the loaded settings
    pub fn apply_env_overrides(&mut self) -> StoreResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides looked up by variable name.
    ///
    /// `DATABASE` selects the backend kind, `LOCAL_MONGO` the locality.
    /// `MONGO_URL` sets the URL for MongoDB and `DATABASE_URL` for the SQL
    /// backends. `DB_MAX_POOL_SIZE`, `DB_CONN_TIMEOUT` and `DB_SOCK_TIMEOUT`
    /// (milliseconds) tune the pool.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> StoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = &mut self.backend;

        if let Some(kind) = lookup("DATABASE") {
            backend.kind = kind;
        }
        if let Some(local) = lookup("LOCAL_MONGO") {
            backend.locality = match Locality::parse(&local)? {
                Locality::Local => "local",
                Locality::Remote => "remote",
            }
            .to_string();
        }

        let url_var = if BackendKind::parse(&backend.kind)?.is_relational() {
            "DATABASE_URL"
        } else {
            "MONGO_URL"
        };
        if let Some(url) = lookup(url_var) {
            backend.url = Some(url);
        }

        if let Some(size) = lookup("DB_MAX_POOL_SIZE") {
            backend.max_connections = parse_number("DB_MAX_POOL_SIZE", &size)?;
        }
        if let Some(timeout) = lookup("DB_CONN_TIMEOUT") {
            backend.connect_timeout_ms = parse_number("DB_CONN_TIMEOUT", &timeout)?;
        }
        if let Some(timeout) = lookup("DB_SOCK_TIMEOUT") {
            backend.socket_timeout_ms = Some(parse_number("DB_SOCK_TIMEOUT", &timeout)?);
        }

        Ok(())
    }

    /// Runtime connection settings for the configured backend
    pub fn to_backend_config(&self) -> StoreResult<BackendConfig> {
        let section = &self.backend;
        let kind = BackendKind::parse(&section.kind)?;
        let locality = Locality::parse(&section.locality)?;

        let config = match (kind, section.url.as_deref()) {
            (BackendKind::Sqlite, Some(url)) => BackendConfig::sqlite(url.to_string()),
            (BackendKind::Sqlite, None) => BackendConfig::memory_sqlite(),
            (BackendKind::PostgreSql, Some(url)) => BackendConfig::postgres(url.to_string()),
            (BackendKind::PostgreSql, None) => {
                return Err(StoreError::Configuration(
                    "PostgreSQL backend requires a connection url".to_string(),
                ))
            }
            (BackendKind::MongoDb, Some(url)) => {
                BackendConfig::mongodb(url.to_string()).with_locality(locality)
            }
            (BackendKind::MongoDb, None) => BackendConfig::local_mongodb(),
        };

        Ok(config
            .with_max_connections(section.max_connections)
            .with_connect_timeout_ms(section.connect_timeout_ms)
            .with_socket_timeout_ms(section.socket_timeout_ms))
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> StoreResult<T> {
    value.trim().parse().map_err(|_| {
        StoreError::Configuration(format!("{} must be a number, got '{}'", name, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("STORE_TEST_URL", "postgres://u:p@db/store");

        let yaml_content = "url: \"${STORE_TEST_URL:-sqlite::memory:}\"\nlevel: ${STORE_TEST_LEVEL:-debug}";
        let expanded = AppConfig::expand_env_vars(yaml_content).unwrap();
        assert!(expanded.contains("postgres://u:p@db/store"));
        assert!(expanded.contains("level: debug"));

        let err = AppConfig::expand_env_vars("url: ${STORE_TEST_UNSET_VAR}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        std::env::remove_var("STORE_TEST_URL");
    }

    #[test]
    fn test_config_file_loading() {
        let config_content = r#"
backend:
  kind: "postgresql"
  url: "${STORE_TEST_DB_URL:-postgres://localhost/test}"
  max_connections: 4
  socket_timeout_ms: 5000

logging:
  level: "debug"
"#;

        let temp_file = "/tmp/docstore_test_config.yaml";
        std::fs::write(temp_file, config_content).unwrap();

        let config = AppConfig::load_from_file(temp_file).unwrap();
        assert_eq!(config.backend.kind, "postgresql");
        assert_eq!(config.backend.url.as_deref(), Some("postgres://localhost/test"));
        assert_eq!(config.backend.max_connections, 4);
        assert_eq!(config.backend.connect_timeout_ms, 30_000);
        assert_eq!(config.logging.level, "debug");

        let backend = config.to_backend_config().unwrap();
        assert_eq!(backend.kind, BackendKind::PostgreSql);
        assert_eq!(backend.socket_timeout_ms, Some(5000));
        assert!(backend.validate().is_ok());

        std::fs::remove_file(temp_file).unwrap();
    }

    #[test]
    fn test_missing_config_file() {
        let err = AppConfig::load_from_file("/nonexistent/path/config.yaml").unwrap_err();
        assert!(err.to_string().contains("Configuration file not found"));
    }

    #[test]
    fn test_invalid_yaml() {
        let temp_file = "/tmp/docstore_invalid_config.yaml";
        std::fs::write(temp_file, "backend: [kind: ").unwrap();

        let err = AppConfig::load_from_file(temp_file).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("Failed to parse config file"));

        std::fs::remove_file(temp_file).unwrap();
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default_config();
        assert_eq!(config.backend.kind, "sqlite");
        assert_eq!(config.backend.database, "main");
        assert_eq!(config.logging.level, "info");

        let backend = config.to_backend_config().unwrap();
        assert!(backend.is_memory_database());
        assert_eq!(backend.max_connections, 10);
        assert!(backend.socket_timeout_ms.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default_config();
        config
            .apply_overrides(lookup(&[
                ("DATABASE", "mongodb"),
                ("LOCAL_MONGO", "0"),
                ("MONGO_URL", "mongodb://remote:27017"),
                ("DATABASE_URL", "postgres://ignored"),
                ("DB_MAX_POOL_SIZE", "3"),
                ("DB_CONN_TIMEOUT", "1500"),
                ("DB_SOCK_TIMEOUT", "900"),
            ]))
            .unwrap();

        let backend = config.to_backend_config().unwrap();
        assert_eq!(backend.kind, BackendKind::MongoDb);
        assert_eq!(backend.locality, Locality::Remote);
        assert_eq!(backend.effective_url(), "mongodb://remote:27017");
        assert_eq!(backend.max_connections, 3);
        assert_eq!(backend.connect_timeout_ms, 1500);
        assert_eq!(backend.socket_timeout_ms, Some(900));
    }

    #[test]
    fn test_local_mongo_overrides_url() {
        let mut config = AppConfig::default_config();
        config
            .apply_overrides(lookup(&[
                ("DATABASE", "mongo"),
                ("LOCAL_MONGO", "1"),
                ("MONGO_URL", "mongodb+srv://u:p@cluster/x"),
            ]))
            .unwrap();

        let backend = config.to_backend_config().unwrap();
        assert_eq!(backend.locality, Locality::Local);
        assert_eq!(
            backend.effective_url(),
            crate::backend::config::LOCAL_MONGO_URL
        );
    }

    #[test]
    fn test_bad_overrides_fail() {
        let mut config = AppConfig::default_config();
        let err = config
            .apply_overrides(lookup(&[("DATABASE", "cassandra")]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let mut config = AppConfig::default_config();
        let err = config
            .apply_overrides(lookup(&[("DB_MAX_POOL_SIZE", "many")]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_postgres_requires_url() {
        let mut config = AppConfig::default_config();
        config.backend.kind = "postgres".to_string();
        let err = config.to_backend_config().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
