use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::llm::DEFAULT_API_BASE;
use crate::store::DEFAULT_FILE_NAME;

const ENV_PREFIX: &str = "SUMMER";
const CONFIG_FILE: &str = "summer_scraper";

/// Runtime settings: defaults, then `summer_scraper.{toml,json,yaml,...}` in
/// the working directory, then `SUMMER_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_path: PathBuf,
    pub api_base: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_env(Environment::with_prefix(ENV_PREFIX))
    }

    fn from_env(env: Environment) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
        let default_db = cwd.join(DEFAULT_FILE_NAME);

        let settings = Config::builder()
            .set_default("database_path", default_db.to_string_lossy().into_owned())?
            .set_default("api_base", DEFAULT_API_BASE)?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(env)
            .build()
            .context("Failed to load settings")?;

        settings
            .try_deserialize()
            .context("Invalid settings")
    }
}
