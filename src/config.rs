use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::executor::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub remote: RemoteConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Directory for rolling log files (logs go to stderr if unset)
  pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteConfig {
  /// Project URL of the hosted database (e.g. https://xyz.supabase.co)
  pub url: Option<String>,
  /// JSON fixture served from memory instead of a remote store
  pub fixture: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryConfig {
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
  #[serde(default = "default_attempt_timeout_ms")]
  pub attempt_timeout_ms: u64,
  #[serde(default = "default_backoff_base_ms")]
  pub backoff_base_ms: u64,
}

fn default_max_attempts() -> u32 {
  2
}

fn default_attempt_timeout_ms() -> u64 {
  12_000
}

fn default_backoff_base_ms() -> u64 {
  1_000
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: default_max_attempts(),
      attempt_timeout_ms: default_attempt_timeout_ms(),
      backoff_base_ms: default_backoff_base_ms(),
    }
  }
}

impl RetryConfig {
  pub fn policy(&self) -> Result<RetryPolicy> {
    RetryPolicy::new(
      self.max_attempts,
      Duration::from_millis(self.attempt_timeout_ms),
      Duration::from_millis(self.backoff_base_ms),
    )
    .map_err(|e| eyre!("Invalid retry configuration: {}", e))
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
  Memory,
  File,
  #[default]
  Sqlite,
  /// Caching disabled
  None,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  #[serde(default)]
  pub backend: CacheBackend,
  /// Cache directory (defaults to the user data dir)
  pub path: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./pulse.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/pulse/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/pulse/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("pulse.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("pulse").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;

    if config.remote.url.is_none() && config.remote.fixture.is_none() {
      return Err(eyre!("remote.url or remote.fixture must be set"));
    }
    config.retry.policy()?;

    Ok(config)
  }

  /// Get the store API key from environment variables.
  ///
  /// Checks PULSE_API_KEY first, then SUPABASE_ANON_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("PULSE_API_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        eyre!("Store API key not found. Set PULSE_API_KEY or SUPABASE_ANON_KEY environment variable.")
      })
  }

  /// Session token of the signed-in user, if any (PULSE_ACCESS_TOKEN).
  pub fn get_access_token() -> Option<String> {
    std::env::var("PULSE_ACCESS_TOKEN").ok()
  }

  /// Fixed user id for scripted runs (PULSE_USER_ID).
  pub fn get_user_id() -> Option<String> {
    std::env::var("PULSE_USER_ID").ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::parse("remote:\n  url: https://xyz.supabase.co\n").unwrap();

    assert_eq!(config.remote.url.as_deref(), Some("https://xyz.supabase.co"));
    assert_eq!(config.cache.backend, CacheBackend::Sqlite);
    assert_eq!(config.retry.policy().unwrap(), RetryPolicy::default());
    assert!(config.log_dir.is_none());
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
remote:
  fixture: ./seed.json
retry:
  max_attempts: 3
  attempt_timeout_ms: 500
cache:
  backend: file
  path: /tmp/pulse
log_dir: /tmp/pulse/logs
"#;
    let config = Config::parse(yaml).unwrap();
    let policy = config.retry.policy().unwrap();

    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.attempt_timeout, Duration::from_millis(500));
    assert_eq!(policy.backoff_base, Duration::from_millis(1000));
    assert_eq!(config.cache.backend, CacheBackend::File);
    assert_eq!(config.cache.path, Some(PathBuf::from("/tmp/pulse")));
  }

  #[test]
  fn test_rejects_missing_remote_and_bad_retry() {
    assert!(Config::parse("remote: {}\n").is_err());
    assert!(Config::parse("remote:\n  url: http://x\nretry:\n  max_attempts: 0\n").is_err());
  }
}
