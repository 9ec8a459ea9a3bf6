//! Configuration management

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server information
    pub server: ServerConfig,
    /// Connection and protocol limits
    pub limits: LimitsConfig,
    /// Operator credentials for OPER
    pub operators: Vec<OperatorConfig>,
    /// Message of the day
    pub motd: MotdConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server name used as the prefix of every reply
    pub name: String,
    /// Server description (WHOIS server info line)
    pub description: String,
    /// Version string advertised in the welcome block
    pub version: String,
}

/// Connection and protocol limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum number of simultaneous client connections
    pub max_clients: usize,
    /// Maximum nickname length
    pub max_nickname_length: usize,
    /// Maximum channel name length
    pub max_channel_name_length: usize,
    /// Maximum topic length
    pub max_topic_length: usize,
    /// Outbound queue depth per session; overflow disconnects the peer
    pub outbound_queue_depth: usize,
}

/// Operator credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Operator name given to OPER
    pub name: String,
    /// Operator password
    pub password: String,
}

/// Message of the day configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotdConfig {
    /// Optional file to load the MOTD from, one 372 line per file line
    pub file: Option<String>,
    /// Banner lines used when no file is configured
    pub lines: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "oxircd.local".to_string(),
            description: "An RFC 1459 IRC server".to_string(),
            version: "oxircd-0.1.0".to_string(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_clients: 100,
            max_nickname_length: 30,
            max_channel_name_length: 50,
            max_topic_length: 307,
            outbound_queue_depth: 512,
        }
    }
}

impl Default for MotdConfig {
    fn default() -> Self {
        Self {
            file: None,
            lines: vec![
                "Welcome to oxircd!".to_string(),
                "This server speaks RFC 1459.".to_string(),
                "Have fun!".to_string(),
            ],
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            limits: LimitsConfig::default(),
            operators: Vec::new(),
            motd: MotdConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Write configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.name.is_empty() {
            return Err(Error::Config("server name must not be empty".to_string()));
        }
        if self.server.name.contains(' ') {
            return Err(Error::Config("server name must not contain spaces".to_string()));
        }
        if self.limits.max_clients == 0 {
            return Err(Error::Config("max_clients must be at least 1".to_string()));
        }
        if self.limits.max_nickname_length == 0 {
            return Err(Error::Config(
                "max_nickname_length must be at least 1".to_string(),
            ));
        }
        if self.limits.outbound_queue_depth == 0 {
            return Err(Error::Config(
                "outbound_queue_depth must be at least 1".to_string(),
            ));
        }
        for oper in &self.operators {
            if oper.name.is_empty() || oper.password.is_empty() {
                return Err(Error::Config(
                    "operator entries need both a name and a password".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Look up an operator entry matching the given credentials
    pub fn find_operator(&self, name: &str, password: &str) -> Option<&OperatorConfig> {
        self.operators
            .iter()
            .find(|o| o.name == name && o.password == password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.limits.max_clients, 100);
    }

    #[test]
    fn test_validate_rejects_empty_server_name() {
        let mut config = Config::default();
        config.server.name.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_clients() {
        let mut config = Config::default();
        config.limits.max_clients = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_find_operator() {
        let mut config = Config::default();
        config.operators.push(OperatorConfig {
            name: "admin".to_string(),
            password: "hunter2".to_string(),
        });
        assert!(config.find_operator("admin", "hunter2").is_some());
        assert!(config.find_operator("admin", "wrong").is_none());
        assert!(config.find_operator("nobody", "hunter2").is_none());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.server.name, config.server.name);
        assert_eq!(parsed.motd.lines, config.motd.lines);
    }
}
