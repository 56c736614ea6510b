//! Runtime configuration read from the environment.
//!
//! | Variable                     | Default                      |
//! |------------------------------|------------------------------|
//! | `PEGS_DB_PATH`               | `pegs.db` in the data dir    |
//! | `PEGS_PORT`                  | `3000`                       |
//! | `PEGS_STRICT_CONTRADICTIONS` | `false`                      |
//!
//! Command-line flags take precedence over these values.

use std::path::PathBuf;

use pegs_core::{CatalogConfig, Database};

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `None` selects the platform data directory.
    pub db_path: Option<PathBuf>,
    pub port: u16,
    pub strict_contradictions: bool,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = var("PEGS_DB_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let port = match var("PEGS_PORT") {
            Some(raw) => raw.trim().parse::<u16>().unwrap_or_else(|_| {
                tracing::warn!("Ignoring invalid PEGS_PORT '{}'", raw);
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        let strict_contradictions = var("PEGS_STRICT_CONTRADICTIONS")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        Self {
            db_path,
            port,
            strict_contradictions,
        }
    }

    pub fn catalog(&self) -> CatalogConfig {
        CatalogConfig {
            strict_contradictions: self.strict_contradictions,
        }
    }

    /// Opens and migrates the configured database.
    pub fn open_database(&self) -> anyhow::Result<Database> {
        let db = match &self.db_path {
            Some(path) => Database::open(path.clone())?,
            None => Database::open_default()?,
        };
        db.migrate()?;
        Ok(db)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            port: DEFAULT_PORT,
            strict_contradictions: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        assert_eq!(config(&[]), AppConfig::default());
    }

    #[test]
    fn reads_all_variables() {
        let config = config(&[
            ("PEGS_DB_PATH", "/tmp/pegs/test.db"),
            ("PEGS_PORT", "8080"),
            ("PEGS_STRICT_CONTRADICTIONS", "TRUE"),
        ]);
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/pegs/test.db")));
        assert_eq!(config.port, 8080);
        assert!(config.catalog().strict_contradictions);
    }

    #[test]
    fn invalid_port_falls_back_to_default() {
        assert_eq!(config(&[("PEGS_PORT", "http")]).port, DEFAULT_PORT);
        assert!(!config(&[("PEGS_STRICT_CONTRADICTIONS", "yes")]).strict_contradictions);
    }
}
