use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const DEFAULT_FILE: &str = "ip_blacklist.json";

#[derive(Serialize, Deserialize, Default, Debug)]
pub struct Config {
    file: Option<String>,
    log_dir: Option<String>,
    log_level: Option<String>,
    log_policy: Option<String>,
}

impl Config {
    ///
    /// Read the config at `path`. A missing file yields the defaults.
    ///
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn get_file(&self) -> &str {
        self.file.as_deref().unwrap_or(DEFAULT_FILE)
    }

    pub fn get_log_dir(&self) -> Option<&str> {
        self.log_dir.as_deref()
    }

    pub fn get_log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn get_log_policy(&self) -> &str {
        self.log_policy.as_deref().unwrap_or("day")
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::error::Error;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.get_file(), DEFAULT_FILE);
        assert_eq!(config.get_log_dir(), None);
        assert_eq!(config.get_log_level(), "info");
        assert_eq!(config.get_log_policy(), "day");
    }

    #[test]
    fn test_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blacklist.toml");
        fs::write(
            &path,
            "file = \"/var/lib/blacklist/ips.json\"\nlog_dir = \"/var/log/blacklist\"\nlog_level = \"warn\"\nlog_policy = \"hour\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.get_file(), "/var/lib/blacklist/ips.json");
        assert_eq!(config.get_log_dir(), Some("/var/log/blacklist"));
        assert_eq!(config.get_log_level(), "warn");
        assert_eq!(config.get_log_policy(), "hour");
    }

    #[test]
    fn test_load_missing_and_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blacklist.toml");
        assert_eq!(Config::load(&path).unwrap().get_file(), DEFAULT_FILE);

        fs::write(&path, "file = [").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }
}
