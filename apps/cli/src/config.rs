use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use tracing::{info, warn};

pub const CONFIG_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub request_timeout_secs: u64,
    pub credentials_path: PathBuf,
    pub page_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".into(),
            request_timeout_secs: 10,
            credentials_path: default_credentials_path(),
            page_size: 20,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    request_timeout_secs: Option<u64>,
    credentials_path: Option<PathBuf>,
    page_size: Option<u32>,
}

fn default_credentials_path() -> PathBuf {
    dirs::config_dir()
        .map(|base| base.join("social_cli"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("credentials.json")
}

pub fn load_settings(config_path: Option<&Path>) -> Settings {
    load_settings_from(config_path.unwrap_or(Path::new(CONFIG_FILE)), |key| {
        std::env::var(key).ok()
    })
}

/// Defaults, then the TOML file at `config_path` if present, then environment.
pub fn load_settings_from(config_path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(config_path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => {
                info!(path = %config_path.display(), "loaded client config");
                if let Some(v) = file_cfg.server_url {
                    settings.server_url = v;
                }
                if let Some(v) = file_cfg.request_timeout_secs {
                    settings.request_timeout_secs = v;
                }
                if let Some(v) = file_cfg.credentials_path {
                    settings.credentials_path = v;
                }
                match file_cfg.page_size {
                    Some(0) => warn!(path = %config_path.display(), "ignoring page_size = 0"),
                    Some(v) => settings.page_size = v,
                    None => {}
                }
            }
            Err(err) => {
                warn!(path = %config_path.display(), "ignoring malformed client config: {err}");
            }
        }
    }

    if let Some(v) = env("SOCIAL_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = env("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        match v.parse::<u64>() {
            Ok(parsed) => settings.request_timeout_secs = parsed,
            Err(err) => warn!("invalid APP__REQUEST_TIMEOUT_SECS value '{v}': {err}"),
        }
    }

    if let Some(v) = env("APP__CREDENTIALS_PATH") {
        settings.credentials_path = PathBuf::from(v);
    }

    if let Some(v) = env("APP__PAGE_SIZE") {
        match v.parse::<u32>() {
            Ok(parsed) if parsed > 0 => settings.page_size = parsed,
            _ => warn!("invalid APP__PAGE_SIZE value '{v}'"),
        }
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
