//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use registros_core::normalize_host;
use registros_core::sync::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use url::Url;

/// Upper bound for device timeouts in milliseconds.
const MAX_TIMEOUT_MS: u64 = 120_000;
/// Lower bound for device timeouts in milliseconds.
const MIN_TIMEOUT_MS: u64 = 100;

/// File configuration for registros defaults (`key = value` lines).
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    /// Data host of the scale device, e.g. `http://192.168.4.1`.
    pub data_host: Option<String>,
    /// Remote endpoint that receives synced records.
    pub remote_sync_url: Option<String>,
    /// Directory holding the record files and the fallback database.
    pub data_dir: Option<PathBuf>,
    /// Per-attempt download timeout in milliseconds.
    pub download_timeout_ms: Option<u64>,
    /// Per-attempt confirmation timeout in milliseconds.
    pub confirm_timeout_ms: Option<u64>,
    /// Number of concurrent sync workers.
    pub sync_concurrency: Option<u8>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(host) = self.data_host.as_deref() {
            normalize_host(host)
                .map_err(|e| anyhow::anyhow!("Invalid config value for `data_host`: {e}"))?;
        }
        if let Some(url) = self.remote_sync_url.as_deref() {
            validate_remote_url(url)?;
        }
        validate_timeout_ms("download_timeout_ms", self.download_timeout_ms)?;
        validate_timeout_ms("confirm_timeout_ms", self.confirm_timeout_ms)?;

        if let Some(concurrency) = self.sync_concurrency
            && !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&usize::from(concurrency))
        {
            bail!(
                "Invalid config value for `sync_concurrency`: {concurrency}. Expected range: {MIN_CONCURRENCY}..={MAX_CONCURRENCY}"
            );
        }

        Ok(())
    }
}

fn validate_remote_url(value: &str) -> Result<()> {
    let url = Url::parse(value.trim())
        .with_context(|| format!("Invalid config value for `remote_sync_url`: '{value}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!(
            "Invalid config value for `remote_sync_url`: '{value}'. Expected an http:// or https:// URL"
        );
    }
    Ok(())
}

fn validate_timeout_ms(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&value) {
        bail!(
            "Invalid config value for `{field}`: {value}. Expected range: {MIN_TIMEOUT_MS}..={MAX_TIMEOUT_MS}"
        );
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Returns the stable string label for display output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Verbose => "verbose",
            Self::Quiet => "quiet",
            Self::Debug => "debug",
        }
    }

    /// Tracing filter used when neither `RUST_LOG` nor CLI flags decide.
    #[must_use]
    pub fn filter_level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
    /// Indicates whether configuration was loaded from disk.
    pub loaded_from_file: bool,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/registros/config.toml`
/// 2. `$HOME/.config/registros/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("registros")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("registros")
            .join("config.toml"),
    )
}

/// Resolves the default data directory.
///
/// Priority:
/// 1. `$XDG_DATA_HOME/registros`
/// 2. `$HOME/.local/share/registros`
/// 3. `./.registros`
#[must_use]
pub fn resolve_default_data_dir() -> PathBuf {
    if let Some(xdg_data_home) = env_var_non_empty_os("XDG_DATA_HOME") {
        return PathBuf::from(xdg_data_home).join("registros");
    }
    env_var_non_empty_os("HOME").map_or_else(
        || PathBuf::from(".registros"),
        |home| {
            PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("registros")
        },
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from default path if present.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let Some(path_ref) = path.as_deref() else {
        return Ok(LoadedConfig {
            path,
            config: None,
            loaded_from_file: false,
        });
    };

    if !path_ref.exists() {
        return Ok(LoadedConfig {
            path,
            config: None,
            loaded_from_file: false,
        });
    }

    let config = load_file_config(path_ref)?;
    Ok(LoadedConfig {
        path,
        config: Some(config),
        loaded_from_file: true,
    })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {}", line_index + 1);

        match key {
            "data_host" => {
                cfg.data_host = Some(parse_string_literal(value).with_context(context)?);
            }
            "remote_sync_url" => {
                cfg.remote_sync_url = Some(parse_string_literal(value).with_context(context)?);
            }
            "data_dir" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.data_dir = Some(PathBuf::from(parsed));
            }
            "download_timeout_ms" => {
                cfg.download_timeout_ms = Some(parse_integer_u64(value).with_context(context)?);
            }
            "confirm_timeout_ms" => {
                cfg.confirm_timeout_ms = Some(parse_integer_u64(value).with_context(context)?);
            }
            "sync_concurrency" => {
                cfg.sync_concurrency = Some(parse_integer_u8(value).with_context(context)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!(
                        "Invalid `verbosity` value '{}' on line {}",
                        parsed,
                        line_index + 1
                    )
                })?);
            }
            unknown => {
                bail!(
                    "Unknown configuration key: '{}' on line {}",
                    unknown,
                    line_index + 1
                );
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<u16>()?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}
