use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding the project config and default database.
pub const PROJECT_DIR: &str = ".flowcast";
const DEFAULT_DATABASE: &str = "flowcast.db";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub throughput: ThroughputConfig,
    #[serde(default)]
    pub histogram: HistogramConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Monte-Carlo trials per snapshot. Bounds the cost of one run.
    #[serde(default = "default_trials")]
    pub trials: u32,
    /// Upper bound on simulated weeks within a single trial.
    #[serde(default = "default_max_weeks_per_trial")]
    pub max_weeks_per_trial: u32,
    /// Mixed into the per-snapshot seed; `None` keeps the derived seed.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            trials: default_trials(),
            max_weeks_per_trial: default_max_weeks_per_trial(),
            seed: None,
            parallel: default_true(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughputConfig {
    /// Weeks kept in the snapshot's rolling throughput array.
    #[serde(default = "default_window_weeks")]
    pub window_weeks: u32,
    /// Trailing weeks used as the simulation population. `0` = all history.
    #[serde(default)]
    pub population_weeks: u32,
}

impl Default for ThroughputConfig {
    fn default() -> Self {
        Self {
            window_weeks: default_window_weeks(),
            population_weeks: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramConfig {
    #[serde(default = "default_bins")]
    pub bins: u32,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            bins: default_bins(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_workers")]
    pub workers: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
    /// Database override; relative paths resolve against the project root.
    #[serde(default)]
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub database_path: PathBuf,
}

/// Load `.flowcast/config.toml`, falling back to defaults when absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(PROJECT_DIR).join("config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load the per-user config from the platform config directory.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("flowcast/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Merge project and user config and resolve the database location.
///
/// # Errors
///
/// Returns an error if either config file is unreadable or malformed.
pub fn resolve_config(project_root: &Path) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;
    let database_path = resolve_database_path(project_root, user.database.as_deref());

    Ok(EffectiveConfig {
        project,
        user,
        database_path,
    })
}

fn resolve_database_path(project_root: &Path, configured: Option<&Path>) -> PathBuf {
    match configured {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => project_root.join(path),
        None => project_root.join(PROJECT_DIR).join(DEFAULT_DATABASE),
    }
}

const fn default_true() -> bool {
    true
}

const fn default_trials() -> u32 {
    5_000
}

const fn default_max_weeks_per_trial() -> u32 {
    520
}

const fn default_window_weeks() -> u32 {
    8
}

const fn default_bins() -> u32 {
    10
}

const fn default_workers() -> u32 {
    4
}
