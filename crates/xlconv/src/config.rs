use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const BIND_ADDR_VAR: &str = "XLCONV_BIND_ADDR";
pub const MAX_UPLOAD_BYTES_VAR: &str = "XLCONV_MAX_UPLOAD_BYTES";

pub const DEFAULT_BIND_ADDR: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 3000);
/// Advertised upload ceiling. Only the HTTP body limit enforces it.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub max_upload_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Contents of the optional `--config` TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSettings {
    pub bind_addr: Option<SocketAddr>,
    pub max_upload_bytes: Option<usize>,
}

impl FileSettings {
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))
    }
}

impl Settings {
    /// Defaults, then `.env` and process environment, then the config file.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();
        let file = config_path.map(FileSettings::read).transpose()?;
        Self::resolve(|key| env::var(key).ok(), file)
    }

    pub fn resolve<F>(lookup: F, file: Option<FileSettings>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(value) = lookup(BIND_ADDR_VAR) {
            settings.bind_addr = value
                .trim()
                .parse()
                .with_context(|| format!("{BIND_ADDR_VAR} must be host:port, got '{value}'"))?;
        }
        if let Some(value) = lookup(MAX_UPLOAD_BYTES_VAR) {
            settings.max_upload_bytes = value.trim().parse().with_context(|| {
                format!("{MAX_UPLOAD_BYTES_VAR} must be a byte count, got '{value}'")
            })?;
        }

        if let Some(file) = file {
            if let Some(bind_addr) = file.bind_addr {
                settings.bind_addr = bind_addr;
            }
            if let Some(max_upload_bytes) = file.max_upload_bytes {
                settings.max_upload_bytes = max_upload_bytes;
            }
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let settings = Settings::resolve(env_of(&[]), None).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.bind_addr.port(), 3000);
    }

    #[test]
    fn environment_overrides_defaults() {
        let settings = Settings::resolve(
            env_of(&[
                (BIND_ADDR_VAR, "127.0.0.1:8080"),
                (MAX_UPLOAD_BYTES_VAR, "1024"),
            ]),
            None,
        )
        .unwrap();
        assert_eq!(settings.bind_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(settings.max_upload_bytes, 1024);
    }

    #[test]
    fn config_file_overrides_environment() {
        let file: FileSettings = toml::from_str("max_upload_bytes = 2048").unwrap();
        let settings =
            Settings::resolve(env_of(&[(MAX_UPLOAD_BYTES_VAR, "1024")]), Some(file)).unwrap();
        assert_eq!(settings.max_upload_bytes, 2048);
        assert_eq!(settings.bind_addr, DEFAULT_BIND_ADDR);
    }

    #[test]
    fn malformed_values_are_reported() {
        let err = Settings::resolve(env_of(&[(BIND_ADDR_VAR, "nowhere")]), None).unwrap_err();
        assert!(err.to_string().contains(BIND_ADDR_VAR));

        assert!(toml::from_str::<FileSettings>("port = 1").is_err());
    }

    #[test]
    fn reads_config_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xlconv.toml");
        fs::write(&path, "bind_addr = \"127.0.0.1:9000\"\n").unwrap();

        let settings = Settings::load(Some(path.as_path())).unwrap();
        assert_eq!(settings.bind_addr, "127.0.0.1:9000".parse().unwrap());
    }
}
