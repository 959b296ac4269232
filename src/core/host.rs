use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Connection attributes for one remote target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub host: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
    /// Anything else the plan wants to carry per host (labels, roles, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

fn default_port() -> u16 {
    22
}

fn default_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "root".to_string())
}

impl Host {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port: default_port(),
            identity_file: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_identity_file(mut self, identity_file: impl Into<String>) -> Self {
        self.identity_file = Some(identity_file.into());
        self
    }

    /// `user@host:port`, used to tag crash recordings and log lines.
    pub fn label(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }

    /// Overwrite named fields with override values. Returns the fields touched.
    pub fn apply(&mut self, overrides: &HostOverrides) -> Result<Vec<String>> {
        let mut updated = Vec::new();

        for (key, value) in overrides.iter() {
            match key {
                "username" | "user" => self.user = value.to_string(),
                "host" => self.host = value.to_string(),
                "port" => {
                    self.port = value.parse().map_err(|_| {
                        Error::config_invalid_value(
                            "port",
                            Some(value.to_string()),
                            "Port must be a number between 0 and 65535",
                        )
                    })?;
                }
                "identityFile" | "identity_file" | "privateKey" => {
                    self.identity_file = Some(value.to_string());
                }
                other => {
                    self.attributes.insert(other.to_string(), value.to_string());
                }
            }
            updated.push(key.to_string());
        }

        Ok(updated)
    }
}

/// Flat key/value patch applied to every host of the selected destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostOverrides(BTreeMap<String, String>);

impl HostOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse `KEY=VALUE` pairs as given on the command line.
    pub fn parse_pairs(pairs: &[String]) -> Result<Self> {
        let mut overrides = Self::new();
        for pair in pairs {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                Error::validation_invalid_argument(
                    "option",
                    format!("Expected KEY=VALUE, got '{}'", pair),
                )
            })?;
            if key.trim().is_empty() {
                return Err(Error::validation_invalid_argument(
                    "option",
                    format!("Empty key in '{}'", pair),
                ));
            }
            overrides.insert(key.trim(), value);
        }
        Ok(overrides)
    }
}
