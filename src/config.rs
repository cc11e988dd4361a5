//! Configuration and data-directory resolution.
//!
//! Resolution order for the data directory:
//!   1. `--data-dir PATH`  (explicit override)
//!   2. `./.asc/`          (project-local, if it holds a config)
//!   3. `~/.asc/`          (global default)
//!
//! Environment variables override values from `config.toml`:
//! `ASC_ISSUER_ID`, `ASC_KEY_ID`, `ASC_PRIVATE_KEY_PATH`, `ASC_APP_ID`,
//! `ASC_TIMEOUT` and `ASC_BASE_URL`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DATA_DIR_NAME: &str = ".asc";

/// Top-level config from `config.toml`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    /// Default app for commands that take `--app`.
    pub app_id: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub issuer_id: String,
    #[serde(default)]
    pub key_id: String,
    #[serde(default)]
    pub private_key: String,
}

/// Fully resolved API credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub issuer_id: String,
    pub key_id: String,
    pub private_key: String,
}

impl Config {
    /// Load config from a data directory. A missing file yields defaults so
    /// environment-only setups keep working.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("could not read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("invalid TOML in {}", path.display()))
    }

    /// Merge config values with environment overrides and load the key.
    pub fn credentials(&self, data_dir: &Path) -> Result<Credentials> {
        let issuer_id = env_or("ASC_ISSUER_ID", &self.api.issuer_id);
        let key_id = env_or("ASC_KEY_ID", &self.api.key_id);
        let key_ref = env_or("ASC_PRIVATE_KEY_PATH", &self.api.private_key);

        if issuer_id.is_empty() || key_id.is_empty() || key_ref.is_empty() {
            bail!(
                "missing API credentials. Run `asc init` and edit {}, \
                 or set ASC_ISSUER_ID, ASC_KEY_ID and ASC_PRIVATE_KEY_PATH",
                data_dir.join("config.toml").display()
            );
        }

        Ok(Credentials {
            issuer_id,
            key_id,
            private_key: resolve_key(&key_ref, data_dir)?,
        })
    }

    /// Default `--app` value: `ASC_APP_ID`, then `app_id` from the config.
    pub fn default_app_id(&self) -> Option<String> {
        let from_env = std::env::var("ASC_APP_ID").unwrap_or_default();
        let from_env = from_env.trim();
        if !from_env.is_empty() {
            return Some(from_env.to_string());
        }
        self.app_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Request timeout for one CLI invocation.
    pub fn timeout(&self) -> Result<Duration> {
        match std::env::var("ASC_TIMEOUT") {
            Ok(raw) if !raw.trim().is_empty() => {
                parse_duration(&raw).with_context(|| format!("invalid ASC_TIMEOUT {raw:?}"))
            }
            _ => Ok(self
                .timeout_seconds
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT)),
        }
    }

    /// API origin; tests point this at a local server.
    pub fn base_url(&self) -> Option<String> {
        std::env::var("ASC_BASE_URL")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
    }
}

fn env_or(name: &str, fallback: &str) -> String {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.trim().to_string(),
    }
}

/// Parse `90`, `90s`, `1500ms` or `2m`.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim().to_ascii_lowercase();
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => raw.split_at(idx),
        None => (raw.as_str(), "s"),
    };
    let value: u64 = digits.parse().context("expected a number")?;
    let duration = match unit {
        "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => match value.checked_mul(60) {
            Some(secs) => Duration::from_secs(secs),
            None => bail!("duration {raw:?} is too large"),
        },
        other => bail!("unsupported unit {other:?}"),
    };
    if duration.is_zero() {
        bail!("timeout must be positive");
    }
    Ok(duration)
}

/// Resolve the data directory.
///
/// Priority: explicit `--data-dir` > `./.asc/` > `~/.asc/`
pub fn resolve_data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }

    let local = PathBuf::from(DATA_DIR_NAME);
    if local.join("config.toml").exists() {
        return Ok(std::fs::canonicalize(&local).unwrap_or(local));
    }

    let home = dirs::home_dir().context("could not determine home directory")?;
    Ok(home.join(DATA_DIR_NAME))
}

/// Return the path to `init` into: `./.asc/` or `~/.asc/`.
pub fn init_data_dir(global: bool) -> Result<PathBuf> {
    if global {
        let home = dirs::home_dir().context("could not determine home directory")?;
        Ok(home.join(DATA_DIR_NAME))
    } else {
        Ok(PathBuf::from(DATA_DIR_NAME))
    }
}

/// Resolve a private key value: either inline PEM or a path to a `.p8` file.
fn resolve_key(value: &str, relative_to: &Path) -> Result<String> {
    if value.starts_with("-----BEGIN") {
        return Ok(value.to_string());
    }

    let expanded = shellexpand::tilde(value);
    let path = Path::new(expanded.as_ref());
    let path = if path.is_relative() {
        relative_to.join(path)
    } else {
        path.to_path_buf()
    };

    if path.exists() {
        std::fs::read_to_string(&path)
            .with_context(|| format!("could not read key file: {}", path.display()))
    } else {
        bail!(
            "private_key '{}' is not a PEM string and file not found at {}",
            value,
            path.display()
        )
    }
}

/// Template config for `init`.
pub const CONFIG_TEMPLATE: &str = r#"# asc configuration
#
# API credentials from App Store Connect:
#   https://appstoreconnect.apple.com/access/integrations/api

[api]
issuer_id = "YOUR_ISSUER_ID"
key_id    = "YOUR_KEY_ID"
private_key = "path/to/AuthKey_XXXXXXXX.p8"

# Default app for commands that take --app (numeric ID, bundle ID or name).
# app_id = "123456789"

# Per-invocation request timeout.
# timeout_seconds = 30
"#;
