use serde::Deserialize;
use std::path::{Path, PathBuf};

use jid::BareJid;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found at {path}")]
    FileNotFound { path: PathBuf },

    #[error("invalid TOML at line {line}, column {column}: {message}")]
    InvalidToml {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("I/O error reading configuration: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct MucConfig {
    pub account: AccountConfig,
    #[serde(default)]
    pub muc: MucSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub jid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MucSettings {
    /// Nickname used when joining rooms. Defaults to the local part of
    /// the account JID.
    pub nickname: Option<String>,
    /// Conference service used for room listing.
    pub conference_server: Option<String>,
    #[serde(default = "default_true")]
    pub legacy_invites: bool,
    pub history_max_stanzas: Option<u32>,
}

impl Default for MucSettings {
    fn default() -> Self {
        Self {
            nickname: None,
            conference_server: None,
            legacy_invites: true,
            history_max_stanzas: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl MucConfig {
    /// Minimal configuration for an account, everything else defaulted.
    pub fn for_account(jid: &BareJid) -> Self {
        Self {
            account: AccountConfig {
                jid: jid.to_string(),
            },
            muc: MucSettings::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: MucConfig = toml::from_str(toml_str).map_err(|e| {
            let (line, column) = e.span().map_or((0, 0), |span| {
                let before = &toml_str[..span.start];
                let line = before.chars().filter(|&c| c == '\n').count() + 1;
                let column = before
                    .rfind('\n')
                    .map_or(span.start + 1, |nl| span.start - nl);
                (line, column)
            });
            ConfigError::InvalidToml {
                line,
                column,
                message: e.message().to_string(),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.account_jid()?;

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                message: format!("must be one of: {}", VALID_LOG_LEVELS.join(", ")),
            });
        }

        if matches!(self.muc.nickname.as_deref(), Some("")) {
            return Err(ConfigError::InvalidValue {
                field: "muc.nickname".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if let Some(server) = &self.muc.conference_server {
            server
                .parse::<BareJid>()
                .map_err(|e| ConfigError::InvalidValue {
                    field: "muc.conference_server".to_string(),
                    message: e.to_string(),
                })?;
        }

        Ok(())
    }

    pub fn account_jid(&self) -> Result<BareJid, ConfigError> {
        self.account
            .jid
            .parse::<BareJid>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "account.jid".to_string(),
                message: e.to_string(),
            })
    }

    /// Configured nickname, or the account's local part, or its domain for
    /// node-less JIDs.
    pub fn nickname(&self) -> String {
        if let Some(nick) = &self.muc.nickname {
            return nick.clone();
        }
        match self.account_jid() {
            Ok(jid) => jid
                .node()
                .map(|node| node.to_string())
                .unwrap_or_else(|| jid.domain().to_string()),
            Err(_) => self.account.jid.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL_TOML: &str = r#"
[account]
jid = "alice@example.com"

[muc]
nickname = "ally"
conference_server = "conference.example.com"
legacy_invites = false
history_max_stanzas = 20

[logging]
level = "debug"
"#;

    #[test]
    fn parses_full_config() {
        let config = MucConfig::from_toml_str(FULL_TOML).unwrap();
        assert_eq!(config.account.jid, "alice@example.com");
        assert_eq!(config.nickname(), "ally");
        assert_eq!(
            config.muc.conference_server.as_deref(),
            Some("conference.example.com")
        );
        assert!(!config.muc.legacy_invites);
        assert_eq!(config.muc.history_max_stanzas, Some(20));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = MucConfig::from_toml_str("[account]\njid = \"bob@example.com\"\n").unwrap();
        assert_eq!(config.nickname(), "bob");
        assert!(config.muc.legacy_invites);
        assert!(config.muc.conference_server.is_none());
        assert!(config.muc.history_max_stanzas.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn rejects_unknown_log_level() {
        let toml = "[account]\njid = \"bob@example.com\"\n[logging]\nlevel = \"loud\"\n";
        match MucConfig::from_toml_str(toml) {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "logging.level"),
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn rejects_invalid_account_jid() {
        let toml = "[account]\njid = \"\"\n";
        match MucConfig::from_toml_str(toml) {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "account.jid"),
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn reports_toml_position() {
        let toml = "[account]\njid = \n";
        match MucConfig::from_toml_str(toml) {
            Err(ConfigError::InvalidToml { line, .. }) => assert!(line >= 2),
            other => panic!("expected InvalidToml, got {:?}", other),
        }
    }

    #[test]
    fn missing_account_section_is_invalid_toml() {
        assert!(matches!(
            MucConfig::from_toml_str("[muc]\nnickname = \"x\"\n"),
            Err(ConfigError::InvalidToml { .. })
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL_TOML.as_bytes()).unwrap();
        let config = MucConfig::load(file.path()).unwrap();
        assert_eq!(config.nickname(), "ally");
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        match MucConfig::load(&path) {
            Err(ConfigError::FileNotFound { path: reported }) => assert_eq!(reported, path),
            other => panic!("expected FileNotFound, got {:?}", other),
        }
    }
}
