//! File logger behind the `log` facade.
//!
//! Each named logger writes `<log_dir>/<name>.log`, rotates it per hour or per
//! day and keeps the last few rotated files. Records are routed by their `log`
//! target; error records always go to the `error` logger.

use std::path::Path;

use log::Level;
use serde::Serialize;

mod loggers;

#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct LoggerConfig {
    pub log_dir: String,
    pub name: String,
    pub level: String,
    pub file: String,
    pub policy: TriggeringPolicy,
}

impl LoggerConfig {
    pub fn new(log_dir: &str, name: &str, level: &str, policy: TriggeringPolicy) -> Self {
        Self {
            log_dir: log_dir.to_string(),
            name: name.to_string(),
            level: level.to_string(),
            file: format!("{}.log", name),
            policy,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub enum TriggeringPolicy {
    Hour,
    Day,
}

impl From<String> for TriggeringPolicy {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "hour" => TriggeringPolicy::Hour,
            _ => TriggeringPolicy::Day,
        }
    }
}

#[derive(Default)]
pub struct Pecker {}

impl log::Log for Pecker {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let name = match record.level() {
            Level::Error => "error",
            _ => record.target(),
        };
        let loggers = loggers::current();
        if let Some(logger) = loggers.get(name).or_else(|| loggers.get("default")) {
            logger.write(&record.args().to_string(), record.level(), record.target());
        }
    }

    fn flush(&self) {}
}

impl Pecker {
    ///
    /// Install as the global logger. Creates `log_dir` when missing; if it
    /// cannot be created the loggers stay silent.
    ///
    pub fn init(self, log_dir: &str, configs: Vec<LoggerConfig>) {
        let dir = Path::new(log_dir);
        if !dir.exists() && std::fs::create_dir_all(dir).is_err() {
            println!("log dir {:?} can not be created.", dir);
        }

        loggers::install(configs);
        log::set_max_level(log::LevelFilter::Trace);
        let _ = log::set_boxed_logger(Box::new(self));
    }
}

pub fn get_logger_configs() -> Vec<LoggerConfig> {
    loggers::current()
        .values()
        .map(|logger| logger.config().clone())
        .collect()
}

/// Change one logger's level at runtime.
pub fn set_level(name: &str, level: &str) {
    loggers::set_level(name, level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_string() {
        assert_eq!(TriggeringPolicy::from("HOUR".to_string()), TriggeringPolicy::Hour);
        assert_eq!(TriggeringPolicy::from("day".to_string()), TriggeringPolicy::Day);
        assert_eq!(TriggeringPolicy::from("weekly".to_string()), TriggeringPolicy::Day);
    }

    #[test]
    fn test_set_level() {
        loggers::install(vec![
            LoggerConfig::new("logs", "blacklist", "info", TriggeringPolicy::Day),
            LoggerConfig::new("logs", "error", "error", TriggeringPolicy::Day),
        ]);
        set_level("blacklist", "debug");
        set_level("missing", "debug");

        let configs = get_logger_configs();
        assert_eq!(configs.len(), 2);
        let blacklist = configs.iter().find(|c| c.name == "blacklist").unwrap();
        assert_eq!(blacklist.level, "debug");
    }

    #[test]
    fn test_logger_config_file() {
        let config = LoggerConfig::new("/tmp/logs", "blacklist", "info", TriggeringPolicy::Day);
        assert_eq!(config.file, "blacklist.log");
    }
}
