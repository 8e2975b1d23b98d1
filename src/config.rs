//! Configuration file loading and validation
//!
//! The file is JSON by default; a `.toml` extension switches to TOML.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "davmirror.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Integer that may be written either as a number or as a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Count {
    Number(i64),
    Text(String),
}

/// Raw on-disk shape of the configuration.
#[derive(Debug, Deserialize)]
struct RawConfig {
    server: String,
    username: String,
    password: String,
    #[serde(default = "default_protocol")]
    protocol: Protocol,
    #[serde(default = "default_davstart")]
    davstart: String,
    nbackups: Count,
    #[serde(default)]
    max_connect_attempts: Option<u32>,
    #[serde(default)]
    max_download_retries: Option<u32>,
    #[serde(default)]
    retry_delay_secs: Option<u64>,
    #[serde(default)]
    timeout_secs: Option<u64>,
    #[serde(default)]
    preserve_mtime: Option<bool>,
}

fn default_protocol() -> Protocol {
    Protocol::Https
}

fn default_davstart() -> String {
    "/".to_string()
}

/// Validated configuration with the password already decoded.
#[derive(Clone)]
pub struct Config {
    pub server: String,
    pub username: String,
    pub password: String,
    pub protocol: Protocol,
    pub davstart: String,
    pub nbackups: u32,
    pub max_connect_attempts: u32,
    pub max_download_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Option<Duration>,
    pub preserve_mtime: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("protocol", &self.protocol)
            .field("davstart", &self.davstart)
            .field("nbackups", &self.nbackups)
            .field("max_connect_attempts", &self.max_connect_attempts)
            .field("max_download_retries", &self.max_download_retries)
            .field("retry_delay", &self.retry_delay)
            .field("timeout", &self.timeout)
            .field("preserve_mtime", &self.preserve_mtime)
            .finish()
    }
}

impl Config {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            Self::from_toml_str(&text, path)
        } else {
            Self::from_json_str(&text, path)
        }
    }

    pub fn from_json_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(text).map_err(|e| parse_error(origin, e))?;
        raw.validate()
    }

    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text).map_err(|e| parse_error(origin, e))?;
        raw.validate()
    }
}

fn parse_error(origin: &Path, e: impl fmt::Display) -> ConfigError {
    ConfigError::Parse {
        path: PathBuf::from(origin),
        message: e.to_string(),
    }
}

impl RawConfig {
    fn validate(self) -> Result<Config, ConfigError> {
        if self.server.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "server",
                message: "must not be empty".into(),
            });
        }
        let nbackups = parse_count("nbackups", &self.nbackups)?;
        let password = decode_password(&self.password)?;
        let max_connect_attempts = self.max_connect_attempts.unwrap_or(3);
        if max_connect_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "max_connect_attempts",
                message: "must be at least 1".into(),
            });
        }
        Ok(Config {
            server: self.server.trim().to_string(),
            username: self.username,
            password,
            protocol: self.protocol,
            davstart: self.davstart,
            nbackups,
            max_connect_attempts,
            max_download_retries: self.max_download_retries.unwrap_or(3),
            retry_delay: Duration::from_secs(self.retry_delay_secs.unwrap_or(2)),
            timeout: self.timeout_secs.map(Duration::from_secs),
            preserve_mtime: self.preserve_mtime.unwrap_or(true),
        })
    }
}

fn parse_count(key: &'static str, count: &Count) -> Result<u32, ConfigError> {
    let value = match count {
        Count::Number(n) => *n,
        Count::Text(s) => s.trim().parse::<i64>().map_err(|_| ConfigError::Invalid {
            key,
            message: format!("'{}' is not an integer", s),
        })?,
    };
    if value < 1 || value > 999 {
        return Err(ConfigError::Invalid {
            key,
            message: format!("{} is outside 1..=999", value),
        });
    }
    Ok(value as u32)
}

/// Passwords are stored base64 encoded; a trailing newline from `base64` tools is dropped.
pub fn decode_password(encoded: &str) -> Result<String, ConfigError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| ConfigError::Invalid {
            key: "password",
            message: format!("not valid base64: {}", e),
        })?;
    let text = String::from_utf8(bytes).map_err(|_| ConfigError::Invalid {
        key: "password",
        message: "decoded password is not UTF-8".into(),
    })?;
    Ok(text.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const JSON: &str = r#"{
        "server": "dav.example.org:8443",
        "username": "javier",
        "password": "c2VjcmV0Cg==",
        "protocol": "https",
        "davstart": "/remote.php/webdav",
        "nbackups": "5"
    }"#;

    #[test]
    fn loads_json_with_defaults() {
        let cfg = Config::from_json_str(JSON, Path::new("test.json")).unwrap();
        assert_eq!(cfg.server, "dav.example.org:8443");
        assert_eq!(cfg.password, "secret");
        assert_eq!(cfg.protocol, Protocol::Https);
        assert_eq!(cfg.nbackups, 5);
        assert_eq!(cfg.max_connect_attempts, 3);
        assert_eq!(cfg.max_download_retries, 3);
        assert_eq!(cfg.retry_delay, Duration::from_secs(2));
        assert!(cfg.timeout.is_none());
        assert!(cfg.preserve_mtime);
    }

    #[test]
    fn loads_toml_by_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mirror.toml");
        fs::write(
            &path,
            "server = \"dav.local\"\nusername = \"u\"\npassword = \"cHc=\"\nprotocol = \"http\"\nnbackups = 2\ntimeout_secs = 30\n",
        )
        .unwrap();
        let cfg = Config::load_from_file(&path).unwrap();
        assert_eq!(cfg.protocol, Protocol::Http);
        assert_eq!(cfg.davstart, "/");
        assert_eq!(cfg.nbackups, 2);
        assert_eq!(cfg.password, "pw");
        assert_eq!(cfg.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = Config::load_from_file(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn rejects_bad_retention() {
        for bad in [r#""zero""#, "0", "-4"] {
            let text = JSON.replace(r#""5""#, bad);
            let err = Config::from_json_str(&text, Path::new("t.json")).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { key: "nbackups", .. }),
                "{bad} accepted"
            );
        }
    }

    #[test]
    fn rejects_bad_password_encoding() {
        let text = JSON.replace("c2VjcmV0Cg==", "not base64!");
        let err = Config::from_json_str(&text, Path::new("t.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "password", .. }));
    }

    #[test]
    fn debug_output_redacts_password() {
        let cfg = Config::from_json_str(JSON, Path::new("t.json")).unwrap();
        let shown = format!("{:?}", cfg);
        assert!(!shown.contains("secret"));
        assert!(shown.contains("<redacted>"));
    }
}
