use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use arc_swap::ArcSwap;
use chrono::{DateTime, Local};
use lazy_static::lazy_static;
use log::Level;
use parking_lot::Mutex;

use super::{LoggerConfig, TriggeringPolicy};

// rotated files kept per logger.
const KEEP_ROTATED: usize = 7;

lazy_static! {
    static ref LOGGERS: ArcSwap<BTreeMap<String, Logger>> =
        ArcSwap::from(Arc::new(BTreeMap::new()));
}

pub(crate) fn current() -> arc_swap::Guard<Arc<BTreeMap<String, Logger>>> {
    LOGGERS.load()
}

pub(crate) fn install(configs: Vec<LoggerConfig>) {
    let loggers = configs
        .into_iter()
        .map(|config| (config.name.clone(), Logger::new(config)))
        .collect();
    LOGGERS.store(Arc::new(loggers));
}

///
/// Swap in a copy of the table with one level changed; writers in flight keep
/// the old table until they finish.
///
pub(crate) fn set_level(name: &str, level: &str) {
    let old = current();
    let Some(logger) = old.get(name) else {
        return;
    };

    let mut logger = logger.clone();
    logger.config.level = level.to_string();
    logger.level = Level::from_str(level).unwrap_or(Level::Info);

    let mut loggers = (**old).clone();
    loggers.insert(name.to_string(), logger);
    LOGGERS.store(Arc::new(loggers));
}

struct Output {
    // period stamp of the open file, e.g. ".2024-06-01"
    period: String,
    writer: Option<BufWriter<File>>,
}

#[derive(Clone)]
pub(crate) struct Logger {
    config: LoggerConfig,
    level: Level,
    output: Arc<Mutex<Output>>,
}

impl Logger {
    fn new(config: LoggerConfig) -> Self {
        let level = Level::from_str(&config.level).unwrap_or(Level::Info);
        let path = file_path(&config, "");
        let period = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map(|m| period_stamp(config.policy, DateTime::<Local>::from(m)))
            .unwrap_or_else(|_| period_stamp(config.policy, Local::now()));

        Logger {
            config,
            level,
            output: Arc::new(Mutex::new(Output {
                period,
                writer: None,
            })),
        }
    }

    pub(crate) fn config(&self) -> &LoggerConfig {
        &self.config
    }

    pub(crate) fn write(&self, message: &str, level: Level, target: &str) {
        if level > self.level {
            return;
        }

        let now = Local::now();
        let period = period_stamp(self.config.policy, now);
        let mut output = self.output.lock();

        if output.period != period {
            if let Some(mut w) = output.writer.take() {
                let _ = w.flush();
            }
            self.rotate(&output.period);
            output.period = period;
        }

        if output.writer.is_none() {
            match open_append(&file_path(&self.config, "")) {
                Ok(file) => output.writer = Some(BufWriter::new(file)),
                Err(_) => return,
            }
        }

        if let Some(writer) = output.writer.as_mut() {
            let _ = writeln!(
                writer,
                "{}|{:<5}|{}|{}",
                now.format("[%Y-%m-%d %H:%M:%S%.3f]"),
                level.as_str(),
                target,
                message
            );
            let _ = writer.flush();
        }
    }

    ///
    /// Move the live file aside under `stamp` and drop the oldest rotated
    /// files beyond `KEEP_ROTATED`.
    ///
    fn rotate(&self, stamp: &str) {
        let live = file_path(&self.config, "");
        let rotated = file_path(&self.config, stamp);
        if !live.exists() || rotated.exists() || fs::rename(&live, &rotated).is_err() {
            return;
        }

        let prefix = format!("{}.", self.config.file);
        let Ok(dir) = fs::read_dir(&self.config.log_dir) else {
            return;
        };
        let mut old: Vec<PathBuf> = dir
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
            .map(|e| e.path())
            .collect();

        // stamps sort chronologically
        old.sort();
        if old.len() > KEEP_ROTATED {
            for path in &old[..old.len() - KEEP_ROTATED] {
                let _ = fs::remove_file(path);
            }
        }
    }
}

fn period_stamp(policy: TriggeringPolicy, t: DateTime<Local>) -> String {
    match policy {
        TriggeringPolicy::Hour => t.format(".%Y-%m-%d_%H").to_string(),
        TriggeringPolicy::Day => t.format(".%Y-%m-%d").to_string(),
    }
}

fn file_path(config: &LoggerConfig, suffix: &str) -> PathBuf {
    let mut path = OsString::from(&config.log_dir);
    path.push(std::path::MAIN_SEPARATOR_STR);
    path.push(&config.file);
    path.push(suffix);
    path.into()
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_period_stamp() {
        let t = Local.with_ymd_and_hms(2024, 6, 1, 13, 5, 0).unwrap();
        assert_eq!(period_stamp(TriggeringPolicy::Day, t), ".2024-06-01");
        assert_eq!(period_stamp(TriggeringPolicy::Hour, t), ".2024-06-01_13");
    }

    #[test]
    fn test_file_path() {
        let config = LoggerConfig::new("logs", "blacklist", "info", TriggeringPolicy::Day);
        let expected = format!("logs{}blacklist.log.2024-06-01", std::path::MAIN_SEPARATOR);
        assert_eq!(file_path(&config, ".2024-06-01"), PathBuf::from(expected));
    }

    #[test]
    fn test_level_filter() {
        let dir = std::env::temp_dir().join(format!("pecker-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let config = LoggerConfig::new(
            &dir.display().to_string(),
            "blacklist",
            "warn",
            TriggeringPolicy::Day,
        );
        let logger = Logger::new(config.clone());
        logger.write("dropped", Level::Info, "blacklist");
        logger.write("kept", Level::Warn, "blacklist");

        let content = fs::read_to_string(file_path(&config, "")).unwrap();
        assert!(content.contains("|WARN |blacklist|kept"));
        assert!(!content.contains("dropped"));
        let _ = fs::remove_dir_all(&dir);
    }
}
