use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::rows::RowOptions;

pub const PROJECT_CONFIG_FILE: &str = "ledgerline.toml";
pub const BASE_URL_ENV: &str = "LEDGERLINE_BASE_URL";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub rows: RowsConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub recalc: RecalcConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowsConfig {
    #[serde(default)]
    pub exclude_zero_totals: bool,
}

impl RowsConfig {
    #[must_use]
    pub const fn options(&self) -> RowOptions {
        RowOptions {
            exclude_zero_totals: self.exclude_zero_totals,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_ms: default_request_timeout_ms(),
            token_env: default_token_env(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalcConfig {
    /// Relative tolerance used when comparing recomputed figures.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

impl Default for RecalcConfig {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
        }
    }
}

/// Partial config as written in a file; absent keys fall through to the next
/// layer.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigLayer {
    #[serde(default)]
    rows: RowsLayer,
    #[serde(default)]
    sync: SyncLayer,
    #[serde(default)]
    recalc: RecalcLayer,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RowsLayer {
    exclude_zero_totals: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SyncLayer {
    base_url: Option<String>,
    request_timeout_ms: Option<u64>,
    token_env: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RecalcLayer {
    epsilon: Option<f64>,
}

impl ConfigLayer {
    fn over(self, base: Self) -> Self {
        Self {
            rows: RowsLayer {
                exclude_zero_totals: self.rows.exclude_zero_totals.or(base.rows.exclude_zero_totals),
            },
            sync: SyncLayer {
                base_url: self.sync.base_url.or(base.sync.base_url),
                request_timeout_ms: self.sync.request_timeout_ms.or(base.sync.request_timeout_ms),
                token_env: self.sync.token_env.or(base.sync.token_env),
            },
            recalc: RecalcLayer {
                epsilon: self.recalc.epsilon.or(base.recalc.epsilon),
            },
        }
    }

    fn resolve(self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            rows: RowsConfig {
                exclude_zero_totals: self
                    .rows
                    .exclude_zero_totals
                    .unwrap_or(defaults.rows.exclude_zero_totals),
            },
            sync: SyncConfig {
                base_url: self.sync.base_url.or(defaults.sync.base_url),
                request_timeout_ms: self
                    .sync
                    .request_timeout_ms
                    .unwrap_or(defaults.sync.request_timeout_ms),
                token_env: self.sync.token_env.unwrap_or(defaults.sync.token_env),
            },
            recalc: RecalcConfig {
                epsilon: self.recalc.epsilon.unwrap_or(defaults.recalc.epsilon),
            },
        }
    }
}

fn load_layer(path: &Path) -> Result<ConfigLayer> {
    if !path.exists() {
        return Ok(ConfigLayer::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ConfigLayer>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ledgerline/config.toml"))
}

/// Load `<project_root>/ledgerline.toml` alone, with defaults for absent keys.
///
/// # Errors
///
/// Fails when the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<EngineConfig> {
    Ok(load_layer(&project_root.join(PROJECT_CONFIG_FILE))?.resolve())
}

/// Resolve the effective config: project file, then the user file for keys
/// the project leaves unset, then defaults. `LEDGERLINE_BASE_URL` overrides
/// the base URL.
///
/// # Errors
///
/// Fails when either file exists but cannot be read or parsed.
pub fn resolve_config(project_root: &Path) -> Result<EngineConfig> {
    let user = match user_config_path() {
        Some(path) => load_layer(&path)?,
        None => ConfigLayer::default(),
    };
    resolve_layers(
        &project_root.join(PROJECT_CONFIG_FILE),
        user,
        env::var(BASE_URL_ENV).ok(),
    )
}

fn resolve_layers(
    project_path: &Path,
    user: ConfigLayer,
    env_base_url: Option<String>,
) -> Result<EngineConfig> {
    let mut config = load_layer(project_path)?.over(user).resolve();
    if let Some(url) = env_base_url.filter(|u| !u.trim().is_empty()) {
        config.sync.base_url = Some(url);
    }
    Ok(config)
}

const fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_token_env() -> String {
    "LEDGERLINE_TOKEN".to_string()
}

const fn default_epsilon() -> f64 {
    1e-6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = tempfile::tempdir().expect("temp dir must be created");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert!(!cfg.rows.exclude_zero_totals);
        assert_eq!(cfg.sync.request_timeout_ms, 30_000);
        assert_eq!(cfg.sync.token_env, "LEDGERLINE_TOKEN");
        assert!((cfg.recalc.epsilon - 1e-6).abs() < f64::EPSILON);
    }

    #[test]
    fn project_values_win_over_user_values() {
        let root = tempfile::tempdir().expect("temp dir");
        std::fs::write(
            root.path().join(PROJECT_CONFIG_FILE),
            "[sync]\nrequest_timeout_ms = 500\n",
        )
        .expect("write config");

        let user: ConfigLayer = toml::from_str(
            r#"
[rows]
exclude_zero_totals = true

[sync]
base_url = "https://budget.example.com"
request_timeout_ms = 9000
"#,
        )
        .expect("parse user layer");

        let cfg = resolve_layers(&root.path().join(PROJECT_CONFIG_FILE), user, None)
            .expect("resolve");
        assert_eq!(cfg.sync.request_timeout_ms, 500);
        assert_eq!(cfg.sync.base_url.as_deref(), Some("https://budget.example.com"));
        assert!(cfg.rows.exclude_zero_totals);
        assert!(cfg.rows.options().exclude_zero_totals);
    }

    #[test]
    fn env_base_url_overrides_files() {
        let root = tempfile::tempdir().expect("temp dir");
        let cfg = resolve_layers(
            &root.path().join(PROJECT_CONFIG_FILE),
            ConfigLayer::default(),
            Some("http://localhost:8000".to_string()),
        )
        .expect("resolve");
        assert_eq!(cfg.sync.base_url.as_deref(), Some("http://localhost:8000"));

        let blank = resolve_layers(
            &root.path().join(PROJECT_CONFIG_FILE),
            ConfigLayer::default(),
            Some("  ".to_string()),
        )
        .expect("resolve");
        assert_eq!(blank.sync.base_url, None);
    }

    #[test]
    fn malformed_config_reports_path() {
        let root = tempfile::tempdir().expect("temp dir");
        let path = root.path().join(PROJECT_CONFIG_FILE);
        std::fs::write(&path, "[rows\n").expect("write");
        let err = load_project_config(root.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse"), "{err:#}");
    }
}
