use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use documented::{Documented, DocumentedFields};
use serde::{Deserialize, Serialize};
use toml_edit::DocumentMut;
use tracing::{debug, info};
use up_utils::path::{resolve_path, up_home_dir};

use crate::{
    annotations::{annotate_array_of_tables, annotate_table},
    error::{ConfigError, Result},
    registry::RegistryCredential,
};

pub const DEFAULT_REGISTRY: &str = "xpkg.upbound.io";
pub const DEFAULT_CACHE_DIR: &str = "~/.up/cache";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// up's configuration
#[derive(Clone, Debug, Deserialize, Serialize, Documented, DocumentedFields)]
pub struct Config {
    /// Directory holding the local dependency cache.
    /// Default: ~/.up/cache
    pub cache_dir: Option<String>,

    /// Registry used for package references that do not name one.
    /// Default: xpkg.upbound.io
    pub default_registry: Option<String>,

    /// Timeout in seconds for registry requests.
    /// Default: 60
    pub timeout: Option<u64>,

    /// Credentials for registries that require authentication.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub registries: Vec<RegistryCredential>,
}

/// Returns the config file location: `$UP_CONFIG` or `~/.up/config.toml`.
pub fn default_config_path() -> PathBuf {
    match std::env::var("UP_CONFIG") {
        Ok(path) => PathBuf::from(path),
        Err(_) => up_home_dir().join("config.toml"),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    pub fn default_config() -> Self {
        Self {
            cache_dir: Some(DEFAULT_CACHE_DIR.to_string()),
            default_registry: Some(DEFAULT_REGISTRY.to_string()),
            timeout: Some(DEFAULT_TIMEOUT_SECS),
            registries: Vec::new(),
        }
    }

    /// Loads the configuration from `path`, falling back to the defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if std::env::var("UP_STEALTH").is_ok() {
            return Ok(Self::default_config());
        }

        let mut config = match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("config file {} not found, using defaults", path.display());
                Self::default_config()
            }
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.resolve()?;

        Ok(config)
    }

    /// Fills in defaults and validates the registry section.
    pub fn resolve(&mut self) -> Result<()> {
        self.cache_dir
            .get_or_insert_with(|| DEFAULT_CACHE_DIR.to_string());
        self.timeout.get_or_insert(DEFAULT_TIMEOUT_SECS);

        let registry = self
            .default_registry
            .get_or_insert_with(|| DEFAULT_REGISTRY.to_string());
        if registry.is_empty() || registry.contains("://") || registry.contains('/') {
            return Err(ConfigError::InvalidDefaultRegistry(registry.clone()));
        }

        let mut seen = HashSet::new();
        for entry in &self.registries {
            if entry.host.trim().is_empty() {
                return Err(ConfigError::EmptyRegistryHost);
            }
            if !seen.insert(entry.host.to_ascii_lowercase()) {
                return Err(ConfigError::DuplicateRegistryHost(entry.host.clone()));
            }
        }

        Ok(())
    }

    /// Resolves the cache root, honouring `UP_CACHE_DIR` over the config file.
    pub fn get_cache_dir(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("UP_CACHE_DIR") {
            return Ok(resolve_path(&env_path)?);
        }
        let cache_dir = self.cache_dir.as_deref().unwrap_or(DEFAULT_CACHE_DIR);
        Ok(resolve_path(cache_dir)?)
    }

    pub fn get_default_registry(&self) -> &str {
        self.default_registry.as_deref().unwrap_or(DEFAULT_REGISTRY)
    }

    pub fn get_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Looks up credentials for `host`.
    ///
    /// `UP_REGISTRY_USERNAME`/`UP_REGISTRY_PASSWORD` take precedence over
    /// configured entries.
    pub fn credentials_for(&self, host: &str) -> Option<RegistryCredential> {
        if let (Ok(username), Ok(password)) = (
            std::env::var("UP_REGISTRY_USERNAME"),
            std::env::var("UP_REGISTRY_PASSWORD"),
        ) {
            return Some(RegistryCredential {
                host: host.to_string(),
                username,
                password,
            });
        }

        self.registries
            .iter()
            .find(|entry| entry.matches(host))
            .cloned()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serialized)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    pub fn to_annotated_document(&self) -> Result<DocumentMut> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut doc = toml_string.parse::<DocumentMut>()?;

        annotate_table::<Config>(doc.as_table_mut(), true)?;

        if let Some(registries) = doc
            .get_mut("registries")
            .and_then(|item| item.as_array_of_tables_mut())
        {
            annotate_array_of_tables::<RegistryCredential>(registries)?;
        }

        Ok(doc)
    }
}

/// Writes an annotated default configuration to `path`.
pub fn generate_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(ConfigError::ConfigAlreadyExists(
            path.display().to_string(),
        ));
    }

    let annotated_doc = Config::default_config().to_annotated_document()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, annotated_doc.to_string())?;
    info!(
        "Default configuration file generated with documentation at: {}",
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use tempfile::tempdir;

    use super::*;
    use crate::test_utils::with_env;

    fn credential(host: &str) -> RegistryCredential {
        RegistryCredential {
            host: host.to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default_config();
        assert_eq!(config.cache_dir.as_deref(), Some("~/.up/cache"));
        assert_eq!(config.get_default_registry(), "xpkg.upbound.io");
        assert_eq!(config.get_timeout(), Duration::from_secs(60));
        assert!(config.registries.is_empty());
    }

    #[test]
    #[serial]
    fn test_load_missing_file_uses_defaults() {
        with_env(&[("UP_STEALTH", None)], || {
            let dir = tempdir().unwrap();
            let config = Config::load(&dir.path().join("config.toml")).unwrap();
            assert_eq!(config.get_default_registry(), DEFAULT_REGISTRY);
        });
    }

    #[test]
    #[serial]
    fn test_load_partial_file_fills_defaults() {
        with_env(&[("UP_STEALTH", None)], || {
            let dir = tempdir().unwrap();
            let path = dir.path().join("config.toml");
            fs::write(
                &path,
                "default_registry = \"registry.example.com\"\n\n[[registries]]\nhost = \"registry.example.com\"\nusername = \"u\"\npassword = \"p\"\n",
            )
            .unwrap();

            let config = Config::load(&path).unwrap();
            assert_eq!(config.get_default_registry(), "registry.example.com");
            assert_eq!(config.timeout, Some(DEFAULT_TIMEOUT_SECS));
            assert_eq!(config.cache_dir.as_deref(), Some(DEFAULT_CACHE_DIR));
            assert_eq!(config.registries.len(), 1);
        });
    }

    #[test]
    fn test_resolve_rejects_duplicate_hosts() {
        let mut config = Config::default_config();
        config.registries = vec![credential("ghcr.io"), credential("GHCR.io")];
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::DuplicateRegistryHost(_))
        ));
    }

    #[test]
    fn test_resolve_rejects_empty_host() {
        let mut config = Config::default_config();
        config.registries = vec![credential("  ")];
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::EmptyRegistryHost)
        ));
    }

    #[test]
    fn test_resolve_rejects_registry_with_scheme() {
        let mut config = Config::default_config();
        config.default_registry = Some("https://xpkg.upbound.io".to_string());
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidDefaultRegistry(_))
        ));
    }

    #[test]
    #[serial]
    fn test_cache_dir_env_override() {
        with_env(&[("UP_CACHE_DIR", Some("/custom/cache"))], || {
            let config = Config::default_config();
            assert_eq!(
                config.get_cache_dir().unwrap(),
                PathBuf::from("/custom/cache")
            );
        });
    }

    #[test]
    #[serial]
    fn test_credentials_lookup() {
        with_env(
            &[("UP_REGISTRY_USERNAME", None), ("UP_REGISTRY_PASSWORD", None)],
            || {
                let mut config = Config::default_config();
                config.registries = vec![credential("xpkg.upbound.io")];
                assert!(config.credentials_for("xpkg.upbound.io").is_some());
                assert!(config.credentials_for("ghcr.io").is_none());
            },
        );
    }

    #[test]
    #[serial]
    fn test_credentials_env_take_precedence() {
        with_env(
            &[
                ("UP_REGISTRY_USERNAME", Some("env-user")),
                ("UP_REGISTRY_PASSWORD", Some("env-pass")),
            ],
            || {
                let config = Config::default_config();
                let cred = config.credentials_for("ghcr.io").unwrap();
                assert_eq!(cred.username, "env-user");
                assert_eq!(cred.host, "ghcr.io");
            },
        );
    }

    #[test]
    fn test_generate_default_config_refuses_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        generate_default_config(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("default_registry = \"xpkg.upbound.io\""));

        assert!(matches!(
            generate_default_config(&path),
            Err(ConfigError::ConfigAlreadyExists(_))
        ));
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default_config();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.cache_dir, config.cache_dir);
    }
}
