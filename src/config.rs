#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_VIDHUB_PORT: u16 = 8080;
pub const DEFAULT_VIDHUB_HOST: &str = "127.0.0.1";
pub const DEFAULT_DATABASE_PATH: &str = "vidhub.db";
pub const DEFAULT_CHECKPOINT_DIR: &str = ".vidhub/uploads";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MEDIA_HOST_API_BASE: &str = "https://api.cloudinary.com";
pub const DEFAULT_VIDEO_PRESET: &str = "video_preset";
pub const DEFAULT_IMAGE_PRESET: &str = "image_preset";

/// Account details for the third-party media host.
///
/// The API key and secret are only needed for server-side signed uploads
/// (sprite forwarding); browser-style chunked uploads rely on the presets.
#[derive(Debug, Clone)]
pub struct MediaHostConfig {
    pub api_base: String,
    pub cloud_name: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub video_preset: String,
    pub image_preset: String,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub database_path: PathBuf,
    pub vidhub_host: String,
    pub vidhub_port: u16,
    pub backend_url: String,
    pub checkpoint_dir: PathBuf,
    /// `None` disables the per-request timeout.
    pub request_timeout: Option<Duration>,
    pub media_host: MediaHostConfig,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub database_path: Option<PathBuf>,
    pub vidhub_port: Option<u16>,
    pub vidhub_host: Option<String>,
    pub backend_url: Option<String>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_config(overrides: RuntimeOverrides) -> Result<RuntimeConfig> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_runtime_config_with_overrides(&file_vars, env_var_string, overrides)
}

#[cfg(test)]
fn build_runtime_config(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<RuntimeConfig> {
    build_runtime_config_with_overrides(file_vars, env_lookup, RuntimeOverrides::default())
}

fn build_runtime_config_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> Result<RuntimeConfig> {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);

    let database_path = overrides
        .database_path
        .or_else(|| lookup("VIDHUB_DATABASE").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));
    let vidhub_port = overrides
        .vidhub_port
        .or_else(|| lookup("VIDHUB_PORT").and_then(|value| value.parse::<u16>().ok()))
        .unwrap_or(DEFAULT_VIDHUB_PORT);
    let vidhub_host = overrides
        .vidhub_host
        .and_then(non_blank)
        .or_else(|| lookup("VIDHUB_HOST"))
        .and_then(non_blank)
        .unwrap_or_else(|| DEFAULT_VIDHUB_HOST.to_string());
    let backend_url = overrides
        .backend_url
        .and_then(non_blank)
        .or_else(|| lookup("VIDHUB_BACKEND_URL"))
        .and_then(non_blank)
        .unwrap_or_else(|| format!("http://{vidhub_host}:{vidhub_port}"));
    let checkpoint_dir = lookup("VIDHUB_CHECKPOINT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CHECKPOINT_DIR));
    let timeout_secs = match lookup("VIDHUB_REQUEST_TIMEOUT_SECS") {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("VIDHUB_REQUEST_TIMEOUT_SECS is not a number: {raw}"))?,
        None => DEFAULT_REQUEST_TIMEOUT_SECS,
    };
    let request_timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

    let cloud_name =
        lookup("MEDIA_HOST_CLOUD_NAME").ok_or_else(|| anyhow!("MEDIA_HOST_CLOUD_NAME not set"))?;
    let media_host = MediaHostConfig {
        api_base: lookup("MEDIA_HOST_API_BASE")
            .unwrap_or_else(|| DEFAULT_MEDIA_HOST_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string(),
        cloud_name,
        api_key: lookup("MEDIA_HOST_API_KEY"),
        api_secret: lookup("MEDIA_HOST_API_SECRET"),
        video_preset: lookup("MEDIA_HOST_VIDEO_PRESET")
            .unwrap_or_else(|| DEFAULT_VIDEO_PRESET.to_string()),
        image_preset: lookup("MEDIA_HOST_IMAGE_PRESET")
            .unwrap_or_else(|| DEFAULT_IMAGE_PRESET.to_string()),
    };

    Ok(RuntimeConfig {
        database_path,
        vidhub_host,
        vidhub_port,
        backend_url: backend_url.trim_end_matches('/').to_string(),
        checkpoint_dir,
        request_timeout,
        media_host,
    })
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(non_blank)
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).cloned().and_then(non_blank))
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
