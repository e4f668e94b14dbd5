use std::{path::PathBuf, time::Duration};

use tracing::{debug, trace};
use up_config::config::Config;
use up_oci::registry::Credentials;
use up_xpkg::dep::{cache::LocalCache, fetcher::RegistryFetcher, manager::Manager};

use crate::{cli::Args, error::UpResult, utils::absolute_path};

/// Settings shared by every command, merged from the config file and flags.
pub struct AppState {
    pub config: Config,
    pub config_path: PathBuf,
    pub cache_dir: PathBuf,
    pub timeout: Duration,
}

impl AppState {
    pub fn new(args: &Args, config: Config, config_path: PathBuf) -> UpResult<Self> {
        trace!("creating new AppState");

        let cache_dir = match args.cache_dir.as_deref() {
            Some(dir) => absolute_path(dir)?,
            None => config.get_cache_dir()?,
        };
        let timeout = args
            .timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| config.get_timeout());
        debug!("cache at {}, timeout {:?}", cache_dir.display(), timeout);

        Ok(Self {
            config,
            config_path,
            cache_dir,
            timeout,
        })
    }

    pub fn default_registry(&self) -> &str {
        self.config.get_default_registry()
    }

    pub fn credentials(&self, host: &str) -> Option<Credentials> {
        self.config
            .credentials_for(host)
            .map(|entry| Credentials::new(entry.username, entry.password))
    }

    pub fn cache(&self) -> LocalCache {
        LocalCache::new(&self.cache_dir)
    }

    /// Dependency manager authenticating against `registry`.
    pub fn manager(&self, registry: &str) -> Manager<RegistryFetcher> {
        Manager::new(
            self.cache(),
            RegistryFetcher::new(self.credentials(registry)),
            self.default_registry(),
        )
    }
}
