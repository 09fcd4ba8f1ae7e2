//! Per-invocation state shared by every command.

use std::path::PathBuf;

use crate::cli::Cli;
use crate::config::Config;
use crate::error::Result;
use crate::keys::{DecryptStrategy, DefaultKeyPaths, FileStrategyStore, FsKeyStore, StrategyStore};
use crate::remote::HttpBundleService;

#[derive(Debug)]
pub struct AppContext {
    /// Project root; key files and `.otaup/` resolve against it.
    pub root: PathBuf,
    pub config: Config,
    pub robot_mode: bool,
    /// `--app-id`, taking precedence over `app.app_id`.
    pub app_id: Option<String>,
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let root = match &cli.root {
            Some(root) => root.clone(),
            None => std::env::current_dir()?,
        };
        let config = Config::load(cli.config.as_deref(), &root)?;

        Ok(Self {
            root,
            config,
            robot_mode: cli.robot_mode(),
            app_id: cli.app_id.clone(),
        })
    }

    /// App id from a positional argument, `--app-id` or the config, in that
    /// order. Errors when none is set.
    pub fn require_app_id(&self, positional: Option<&str>) -> Result<String> {
        self.config
            .require_app_id(positional.or(self.app_id.as_deref()))
    }

    /// Like [`Self::require_app_id`] but absent is fine.
    #[must_use]
    pub fn optional_app_id(&self) -> Option<String> {
        self.require_app_id(None).ok()
    }

    #[must_use]
    pub fn key_files(&self) -> FsKeyStore {
        FsKeyStore::new(&self.root)
    }

    #[must_use]
    pub fn key_paths(&self) -> DefaultKeyPaths {
        self.config.default_key_paths()
    }

    #[must_use]
    pub fn strategy_store(&self) -> FileStrategyStore {
        FileStrategyStore::for_root(&self.root)
    }

    /// Persisted strategy for `app_id`; `None` when no app id is known.
    pub fn stored_strategy(&self, app_id: Option<&str>) -> Result<Option<DecryptStrategy>> {
        match app_id {
            Some(app_id) => self.strategy_store().get_strategy(app_id),
            None => Ok(None),
        }
    }

    pub fn bundle_service(&self) -> Result<HttpBundleService> {
        HttpBundleService::new(
            &self.config.api.base_url,
            self.config.require_api_key()?,
            self.config.api.timeout_seconds,
        )
    }
}
