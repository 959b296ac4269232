//! Destination → host resolution.
//!
//! A briefing maps destination names to the hosts a remote flight fans out
//! over. Host order is the declaration order and is preserved everywhere.

use crate::error::{Error, Result};
use crate::host::{Host, HostOverrides};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefingConfig {
    #[serde(default)]
    pub destinations: BTreeMap<String, Vec<Host>>,
}

impl BriefingConfig {
    pub fn destination(mut self, name: impl Into<String>, hosts: Vec<Host>) -> Self {
        self.destinations.insert(name.into(), hosts);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Briefing {
    config: BriefingConfig,
}

impl Briefing {
    pub fn new(config: BriefingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BriefingConfig {
        &self.config
    }

    pub fn has_destination(&self, name: &str) -> bool {
        self.config.destinations.contains_key(name)
    }

    pub fn destinations(&self) -> Vec<&str> {
        self.config.destinations.keys().map(String::as_str).collect()
    }

    pub fn hosts_for_destination(&self, name: &str) -> Result<Vec<Host>> {
        self.config
            .destinations
            .get(name)
            .cloned()
            .ok_or_else(|| Error::unknown_destination(Some(name), self.known_names()))
    }

    /// Patch every host of `destination`. Other destinations are left alone,
    /// and an unknown destination is a no-op: resolution reports it later.
    pub fn apply_options(&mut self, destination: &str, overrides: &HostOverrides) -> Result<()> {
        if overrides.is_empty() {
            return Ok(());
        }

        if let Some(hosts) = self.config.destinations.get_mut(destination) {
            for host in hosts.iter_mut() {
                host.apply(overrides)?;
            }
            log_status!(
                "briefing",
                "Applied {} override(s) to {} host(s) in '{}'",
                overrides.iter().count(),
                hosts.len(),
                destination
            );
        }

        Ok(())
    }

    fn known_names(&self) -> Vec<String> {
        self.config.destinations.keys().cloned().collect()
    }
}

/// Configure-once, read-many access to a briefing.
///
/// `access(Some(config))` (re)initializes and returns the new instance;
/// `access(None)` hands back the instance already stored.
#[derive(Debug, Default)]
pub struct BriefingRegistry {
    current: Mutex<Option<Arc<Briefing>>>,
}

impl BriefingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn access(&self, config: Option<BriefingConfig>) -> Result<Arc<Briefing>> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| Error::internal_unexpected("briefing registry lock poisoned"))?;

        if let Some(config) = config {
            let briefing = Arc::new(Briefing::new(config));
            *current = Some(Arc::clone(&briefing));
            return Ok(briefing);
        }

        current.as_ref().map(Arc::clone).ok_or_else(Error::missing_briefing)
    }
}

/// Process-wide registry.
pub fn shared() -> &'static BriefingRegistry {
    static SHARED: OnceLock<BriefingRegistry> = OnceLock::new();
    SHARED.get_or_init(BriefingRegistry::new)
}
