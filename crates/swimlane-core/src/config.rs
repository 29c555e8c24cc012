use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use crate::DATA_DIR;
use crate::coordinator::RetryPolicy;
use crate::sync::ConcurrencyMode;
use crate::taxonomy::Taxonomy;
use crate::taxonomy::seed::{SeedGroup, default_groups, seed_taxonomy};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub seed: SeedConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    #[serde(default)]
    pub mode: ConcurrencyMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Stage layout used by `swl init`. Empty means the built-in seed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedConfig {
    #[serde(default)]
    pub groups: Vec<SeedGroup>,
}

impl SeedConfig {
    pub fn taxonomy(&self) -> Result<Taxonomy> {
        if self.groups.is_empty() {
            return Ok(seed_taxonomy(&default_groups())?);
        }
        seed_taxonomy(&self.groups).context("Invalid [[seed.groups]] in config")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(DATA_DIR).join("config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("swimlane/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Output mode from, in order: the CLI flag, `FORMAT`, user config, TTY.
pub fn resolve_output_mode(cli_json: bool) -> Result<String> {
    let user = load_user_config()?;
    Ok(resolve_output(
        cli_json,
        user.output.as_deref(),
        env::var("FORMAT").ok().as_deref(),
    ))
}

fn resolve_output(cli_json: bool, user_output: Option<&str>, env_format: Option<&str>) -> String {
    fn normalize(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "plain" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }
    if let Some(mode) = env_format.and_then(normalize) {
        return mode.to_string();
    }
    if let Some(mode) = user_output.and_then(normalize) {
        return mode.to_string();
    }
    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    25
}

const fn default_max_backoff_ms() -> u64 {
    1000
}

const fn default_lock_timeout_ms() -> u64 {
    5000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = tempfile::tempdir().unwrap();
        let cfg = load_project_config(root.path()).unwrap();
        assert_eq!(cfg.concurrency.mode, ConcurrencyMode::LastWriterWins);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.initial_backoff_ms, 25);
        assert_eq!(cfg.retry.max_backoff_ms, 1000);
        assert_eq!(cfg.store.lock_timeout(), Duration::from_secs(5));
        assert!(cfg.seed.groups.is_empty());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join(DATA_DIR)).unwrap();
        std::fs::write(
            root.path().join(DATA_DIR).join("config.toml"),
            "[concurrency]\nmode = \"versioned\"\n\n[retry]\nmax_attempts = 5\n",
        )
        .unwrap();
        let cfg = load_project_config(root.path()).unwrap();
        assert_eq!(cfg.concurrency.mode, ConcurrencyMode::Versioned);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.initial_backoff_ms, 25);
    }

    #[test]
    fn malformed_config_names_the_file() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join(DATA_DIR)).unwrap();
        std::fs::write(root.path().join(DATA_DIR).join("config.toml"), "[retry\n").unwrap();
        let err = load_project_config(root.path()).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    fn seed_override_builds_a_taxonomy() {
        let cfg: ProjectConfig = toml::from_str(
            r#"
[[seed.groups]]
status = "DRAFT"
title = "Leads"
stages = ["New", "Contacted"]

[[seed.groups]]
status = "IN_PROGRESS"
title = "Doing"
stages = ["Build"]

[[seed.groups]]
status = "COMPLETED"
title = "Done"
stages = ["Shipped"]

[[seed.groups]]
status = "CANCELLED"
title = "Dropped"
stages = ["Lost"]
"#,
        )
        .unwrap();
        let taxonomy = cfg.seed.taxonomy().unwrap();
        let draft = taxonomy.group(Status::Draft).unwrap();
        assert_eq!(draft.title, "Leads");
        assert_eq!(draft.stages[1].id.as_str(), "draft-2");
    }

    #[test]
    fn incomplete_seed_override_is_rejected() {
        let cfg: ProjectConfig = toml::from_str(
            "[[seed.groups]]\nstatus = \"DRAFT\"\ntitle = \"D\"\nstages = [\"a\"]\n",
        )
        .unwrap();
        assert!(cfg.seed.taxonomy().is_err());
    }

    #[test]
    fn retry_config_maps_to_policy() {
        let policy = RetryConfig::default().policy();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff(1), Duration::from_millis(25));
        assert_eq!(policy.backoff(2), Duration::from_millis(50));
    }

    #[test]
    fn cli_json_overrides_env_and_config() {
        assert_eq!(resolve_output(true, Some("pretty"), Some("text")), "json");
    }

    #[test]
    fn env_beats_user_config_and_aliases_normalize() {
        assert_eq!(resolve_output(false, Some("json"), Some("human")), "pretty");
        assert_eq!(resolve_output(false, Some("plain"), Some("bogus")), "text");
    }
}
