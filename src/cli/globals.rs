use crate::{
    client::{CheckMode, ClientConfig},
    dispatch::Dispatcher,
    session::{FileStorage, SessionStore},
    status::{StatusCache, StatusLookup},
};
use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc};

pub const DEFAULT_STATE_FILE: &str = "normsearch-session.json";

#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub api_url: String,
    pub state_file: PathBuf,
    pub check_mode: CheckMode,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(api_url: String) -> Self {
        Self {
            api_url,
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            check_mode: CheckMode::PerResource,
        }
    }

    /// Environment-derived config with the command-line values on top.
    #[must_use]
    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::load();
        config.api_base_url.clone_from(&self.api_url);
        config.check_mode = self.check_mode;
        config
    }

    /// Opens the session persisted in the state file.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn open_session(&self) -> Result<SessionStore> {
        let storage = Arc::new(FileStorage::new(&self.state_file));
        SessionStore::new(self.config(), storage).context("failed to build the API client")
    }

    /// Opens the session and a status cache on top of it.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn open_cache(&self) -> Result<StatusCache> {
        let session = self.open_session()?;
        let lookup = StatusLookup::new(Dispatcher::new(session));
        Ok(StatusCache::new(lookup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::config::ENV_API_BASE_URL;

    #[test]
    fn test_global_args() {
        let args = GlobalArgs::new("https://api.normsearch.dev".to_string());
        assert_eq!(args.api_url, "https://api.normsearch.dev");
        assert_eq!(args.state_file, PathBuf::from(DEFAULT_STATE_FILE));
        assert_eq!(args.check_mode, CheckMode::PerResource);
    }

    #[test]
    fn test_config_prefers_command_line() {
        temp_env::with_var(ENV_API_BASE_URL, Some("https://from.env"), || {
            let mut args = GlobalArgs::new("https://from.args".to_string());
            args.check_mode = CheckMode::Batch;
            let config = args.config();
            assert_eq!(config.api_base_url, "https://from.args");
            assert_eq!(config.check_mode, CheckMode::Batch);
        });
    }
}
