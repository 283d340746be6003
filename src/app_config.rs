//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};

/// File configuration; every key is optional and CLI flags win over it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Backend base URL.
    pub api_url: Option<String>,
    /// Destination folder sent with download jobs.
    pub output_path: Option<String>,
    /// Ask the backend to create a timestamped subfolder per job.
    pub use_timestamped_folder: Option<bool>,
    /// Status poll period in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Consecutive failed status fetches tolerated; 0 retries forever.
    pub max_poll_failures: Option<u32>,
    /// Wall-clock budget of one search.
    pub search_timeout_secs: Option<u64>,
    /// Results requested per search.
    pub search_max_results: Option<u32>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    /// Period of `health --watch` probes.
    pub health_interval_secs: Option<u64>,
    /// Budget of one health probe.
    pub health_timeout_secs: Option<u64>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        validate_range("poll_interval_ms", self.poll_interval_ms, 50, 60_000)?;
        validate_range("search_timeout_secs", self.search_timeout_secs, 1, 600)?;
        validate_range(
            "search_max_results",
            self.search_max_results.map(u64::from),
            1,
            100,
        )?;
        validate_range("connect_timeout_secs", self.connect_timeout_secs, 1, 3600)?;
        validate_range("read_timeout_secs", self.read_timeout_secs, 1, 3600)?;
        validate_range("health_interval_secs", self.health_interval_secs, 1, 3600)?;
        validate_range("health_timeout_secs", self.health_timeout_secs, 1, 3600)?;

        if let Some(api_url) = self.api_url.as_deref()
            && !(api_url.starts_with("http://") || api_url.starts_with("https://"))
        {
            bail!("Invalid config value for `api_url`: '{api_url}'. Expected an http(s) URL");
        }
        Ok(())
    }
}

fn validate_range(field: &str, value: Option<u64>, min: u64, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
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
    /// Log filter used when neither `RUST_LOG` nor a CLI flag decides.
    #[must_use]
    pub fn filter(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose | Self::Debug => "debug",
            Self::Quiet => "error",
        }
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config; empty when no file exists.
    pub config: FileConfig,
    pub loaded_from_file: bool,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/mediathek/config.toml`
/// 2. `$HOME/.config/mediathek/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("mediathek")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("mediathek")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads `explicit` if given (it must exist), else the default path if present.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config,
            loaded_from_file: true,
        });
    }

    let path = resolve_default_config_path();
    match path.as_deref() {
        Some(path_ref) if path_ref.exists() => {
            let config = load_file_config(path_ref)?;
            Ok(LoadedConfig {
                path,
                config,
                loaded_from_file: true,
            })
        }
        _ => Ok(LoadedConfig {
            path,
            ..LoadedConfig::default()
        }),
    }
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
        let line_number = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_number}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_number}");

        match key {
            "api_url" => {
                cfg.api_url = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "output_path" => {
                cfg.output_path = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "use_timestamped_folder" => {
                cfg.use_timestamped_folder = Some(parse_boolean(value).with_context(invalid)?);
            }
            "poll_interval_ms" => {
                cfg.poll_interval_ms = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "max_poll_failures" => {
                cfg.max_poll_failures = Some(parse_integer_u32(value).with_context(invalid)?);
            }
            "search_timeout_secs" => {
                cfg.search_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "search_max_results" => {
                cfg.search_max_results = Some(parse_integer_u32(value).with_context(invalid)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "health_interval_secs" => {
                cfg.health_interval_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "health_timeout_secs" => {
                cfg.health_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_number}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_number}");
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
    raw_value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(ToString::to_string)
        .ok_or_else(|| anyhow!("Expected double-quoted string"))
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
    u64::try_from(value).map_err(|_| anyhow!("Integer value out of range for u64"))
}

fn parse_integer_u32(raw_value: &str) -> Result<u32> {
    let value = parse_integer_u64(raw_value)?;
    u32::try_from(value).map_err(|_| anyhow!("Integer value out of range for u32"))
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

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
