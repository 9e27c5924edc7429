use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::profile::ConnectionProfile;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Profile to activate at startup
    #[serde(default)]
    pub active_profile: Option<String>,
    /// All configured connection profiles
    #[serde(default)]
    pub profiles: Vec<ConnectionProfile>,
    #[serde(default)]
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Directory where log files will be stored
    pub directory: String,
    /// Log file name prefix (date will be appended)
    pub file_prefix: String,
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: "./logs".to_string(),
            file_prefix: "nmea_gateway".to_string(),
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.check_profile_ids()?;
        Ok(config)
    }

    /// Look up a profile by id
    pub fn profile(&self, id: &str) -> Option<&ConnectionProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    /// The profile selected for startup, if any
    pub fn startup_profile(&self) -> Option<&ConnectionProfile> {
        self.active_profile.as_deref().and_then(|id| self.profile(id))
    }

    fn check_profile_ids(&self) -> Result<(), Box<dyn std::error::Error>> {
        let mut seen = std::collections::HashSet::new();
        for profile in &self.profiles {
            if !seen.insert(&profile.id) {
                return Err(format!("duplicate profile id '{}'", profile.id).into());
            }
        }
        if let Some(id) = &self.active_profile {
            if self.profile(id).is_none() {
                return Err(format!("active_profile '{}' does not match any profile", id).into());
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            active_profile: None,
            profiles: Vec::new(),
            logging: LogConfig::default(),
        }
    }
}
