use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs::config_dir;
use serde::Deserialize;
use tracing::debug;

use crate::decoder::DecodeFailure;
use crate::error::{ConfigError, CredentialFormatError};

pub const ARL_ENV_VAR: &str = "DEEZER_ARL_TOKEN";
const CONFIG_FILE: &str = "dzgrab/config.toml";
const DEFAULT_SITE_URL: &str = "https://www.deezer.com";
const GATEWAY_PATH: &str = "/ajax/gw-light.php";
const MIN_ARL_LEN: usize = 100;

/// Runtime settings, read from `config.toml` and then overridden by the
/// environment and the command line.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub arl: Option<String>,
    pub output_dir: PathBuf,
    pub site_url: String,
    pub gateway_url: Option<String>,
    pub request_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub on_decode_failure: DecodeFailure,
    #[serde(skip)]
    pub show_progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            arl: None,
            output_dir: PathBuf::from("."),
            site_url: DEFAULT_SITE_URL.to_string(),
            gateway_url: None,
            request_timeout_secs: 30,
            probe_timeout_secs: 10,
            on_decode_failure: DecodeFailure::default(),
            show_progress: true,
        }
    }
}

impl Config {
    /// Loads `path` if given, else the per-user config file if it exists,
    /// else the defaults. The arl env var always wins over the file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        if let Ok(token) = std::env::var(ARL_ENV_VAR) {
            config.arl = Some(token);
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading config from {}", path.display());
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn credential(&self) -> Result<Credential, ConfigError> {
        let raw = self.arl.as_deref().ok_or(ConfigError::MissingCredential)?;
        Ok(Credential::new(raw)?)
    }

    pub fn site_url(&self) -> &str {
        self.site_url.trim_end_matches('/')
    }

    pub fn gateway_url(&self) -> String {
        match &self.gateway_url {
            Some(url) => url.clone(),
            None => format!("{}{}", self.site_url(), GATEWAY_PATH),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE))
}

/// An `arl` cookie value that passed format validation.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(raw: &str) -> Result<Self, CredentialFormatError> {
        let token = raw.trim();
        if token.is_empty() {
            return Err(CredentialFormatError::Empty);
        }
        if token.len() < MIN_ARL_LEN {
            return Err(CredentialFormatError::TooShort { len: token.len() });
        }
        if !token.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CredentialFormatError::InvalidCharacters);
        }
        Ok(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// keep the token out of logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({} chars)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_token_is_rejected() {
        let token = "a".repeat(50);
        assert_eq!(
            Credential::new(&token),
            Err(CredentialFormatError::TooShort { len: 50 })
        );
    }

    #[test]
    fn full_length_alphanumeric_token_passes() {
        let token: String = "abc123XYZ".chars().cycle().take(192).collect();
        let credential = Credential::new(&token).unwrap();
        assert_eq!(credential.as_str(), token);
    }

    #[test]
    fn non_alphanumeric_token_is_rejected() {
        let mut token = "a".repeat(191);
        token.push('%');
        assert_eq!(
            Credential::new(&token),
            Err(CredentialFormatError::InvalidCharacters)
        );
        assert_eq!(Credential::new("   "), Err(CredentialFormatError::Empty));
    }

    #[test]
    fn debug_does_not_leak_token() {
        let token = "q".repeat(120);
        let shown = format!("{:?}", Credential::new(&token).unwrap());
        assert!(!shown.contains("qqqq"));
    }

    #[test]
    fn missing_token_is_a_config_error() {
        let config = Config::default();
        assert!(matches!(
            config.credential(),
            Err(ConfigError::MissingCredential)
        ));
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = Config::from_toml(
            r#"
            output_dir = "/tmp/music"
            site_url = "http://127.0.0.1:9000/"
            probe_timeout_secs = 3
            on_decode_failure = "passthrough"
            "#,
        )
        .unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/music"));
        assert_eq!(config.gateway_url(), "http://127.0.0.1:9000/ajax/gw-light.php");
        assert_eq!(config.probe_timeout(), Duration::from_secs(3));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.on_decode_failure, DecodeFailure::Passthrough);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml("colour = \"blue\"").is_err());
    }
}
