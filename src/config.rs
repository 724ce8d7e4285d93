use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::feed::DEFAULT_CAPACITY;
use crate::model::Identity;

#[derive(Parser, Debug)]
#[command(name = "smartmark")]
#[command(about = "Keeps your bookmarks in sync across open sessions", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,

    /// Overrides `session.user_id` from the config file
    #[arg(short = 'u', long = "user")]
    pub user_id: Option<String>,

    #[arg(long = "email")]
    pub email: Option<String>,
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".smartmark")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[derive(Debug, Deserialize, Clone)]
pub struct App {
    #[serde(default = "default_database")]
    database: String,
    #[serde(default)]
    pub turso_url: Option<String>,
    #[serde(default)]
    pub turso_auth_token: Option<String>,
    /// Talk to the hosted database directly instead of keeping a replica.
    #[serde(default)]
    pub remote_only: bool,
    #[serde(default = "default_sync_interval")]
    pub sync_interval_seconds: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

impl Default for App {
    fn default() -> Self {
        Self {
            database: default_database(),
            turso_url: None,
            turso_auth_token: None,
            remote_only: false,
            sync_interval_seconds: default_sync_interval(),
            poll_interval_seconds: default_poll_interval(),
            feed_capacity: default_feed_capacity(),
        }
    }
}

fn default_database() -> String {
    "bookmarks.db".to_string()
}

fn default_sync_interval() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    5
}

fn default_feed_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl App {
    pub fn get_db(&self) -> &str {
        &self.database
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct SessionConfig {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub app: App,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Reads the config at `path`. A missing file is only tolerated when the
    /// path is the default one; a path the user named must exist.
    pub fn load(path: &Path, explicit: bool) -> Result<Self> {
        if !explicit && !path.exists() {
            tracing::info!(path = ?path, "no config file, using defaults");
            return Ok(Config::default());
        }

        let yaml_str = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Config::parse(&yaml_str)
    }

    pub fn parse(yaml_str: &str) -> Result<Self> {
        let yaml_with_env = Config::substitute_env_vars(yaml_str)?;
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        Ok(config)
    }

    /// Resolves who this session acts for. Command line flags win over the
    /// config file.
    pub fn identity(&self, cli: &Cli) -> Result<Identity> {
        let user_id = cli
            .user_id
            .clone()
            .or_else(|| self.session.user_id.clone())
            .filter(|id| !id.trim().is_empty());

        let Some(user_id) = user_id else {
            bail!("no user id: set session.user_id in the config or pass --user");
        };

        let email = cli
            .email
            .clone()
            .or_else(|| self.session.email.clone())
            .unwrap_or_default();

        Ok(Identity::new(user_id, email))
    }

    fn substitute_env_vars(yaml_str: &str) -> Result<String> {
        let mut result = yaml_str.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("${") {
            let actual_start = offset + start;
            let Some(end) = result[actual_start..].find('}') else {
                break;
            };
            let var_name = &result[actual_start + 2..actual_start + end];

            // ${VAR:-default}
            let env_value = match var_name.split_once(":-") {
                Some((actual_var, default_val)) => {
                    env::var(actual_var).unwrap_or_else(|_| default_val.to_string())
                }
                None => env::var(var_name).unwrap_or_else(|_| {
                    tracing::warn!(var = var_name, "environment variable not found");
                    String::new()
                }),
            };

            result.replace_range(actual_start..actual_start + end + 1, &env_value);
            offset = actual_start + env_value.len();
        }

        Ok(result)
    }
}
