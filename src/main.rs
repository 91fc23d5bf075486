use std::{env, path, process, time::Duration};

use ip_blacklist::{
    config::Config,
    duration::{format_duration, parse_duration},
    BlackList,
};
use log::error;
use pecker::{LoggerConfig, Pecker, TriggeringPolicy};

#[derive(Default)]
struct Args {
    config: Option<String>,
    log_dir: Option<String>,
    file: Option<String>,
    add: Option<String>,
    remove: Option<String>,
    duration: Option<String>,
    list: bool,
    cleanup: bool,
}

impl Args {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut parsed = Args::default();
        let mut i = 1;
        while i < args.len() {
            let flag = args[i].trim_start_matches('-');
            match flag {
                "list" => parsed.list = true,
                "cleanup" => parsed.cleanup = true,
                "c" | "l" | "file" | "add" | "remove" | "duration" => {
                    let Some(value) = args.get(i + 1) else {
                        return Err(format!("flag needs an argument: {}", args[i]));
                    };
                    let slot = match flag {
                        "c" => &mut parsed.config,
                        "l" => &mut parsed.log_dir,
                        "file" => &mut parsed.file,
                        "add" => &mut parsed.add,
                        "remove" => &mut parsed.remove,
                        _ => &mut parsed.duration,
                    };
                    *slot = Some(value.clone());
                    i += 1;
                }
                _ => return Err(format!("flag provided but not defined: {}", args[i])),
            }
            i += 1;
        }
        Ok(parsed)
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let args = match Args::parse(&args) {
        Ok(args) => args,
        Err(e) => {
            println!("{}", e);
            println!("usage: blacklist [-c config] [-l log_dir] [-file path] [-add ip [-duration d]] [-remove ip] [-list] [-cleanup]");
            process::exit(2);
        }
    };

    if let Err(e) = run(args) {
        println!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), String> {
    // 1、load config, flags win over file values
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| "/etc/blacklist/blacklist.toml".to_string());
    let mut config_path = path::PathBuf::from(config_path);
    if args.config.is_none() && !config_path.exists() {
        config_path = path::PathBuf::from("conf/blacklist.toml");
    }
    let config = Config::load(&config_path).map_err(|e| format!("Error loading config: {}", e))?;

    // 2、init logger
    if let Some(log_dir) = args.log_dir.as_deref().or(config.get_log_dir()) {
        init_logger(log_dir, &config);
    }

    let duration = match args.duration.as_deref() {
        Some(d) => parse_duration(d).map_err(|e| format!("Error parsing duration: {}", e))?,
        None => Duration::ZERO,
    };

    // 3、open store
    let file = args.file.as_deref().unwrap_or(config.get_file());
    let bl = BlackList::open(file).map_err(|e| {
        error!("open blacklist {} error. {:?}", file, e);
        format!("Error initializing global blacklist: {}", e)
    })?;

    if let Some(ip) = &args.add {
        bl.add(ip, duration)
            .map_err(|e| format!("Error adding IP to blacklist: {}", e))?;
        if duration.is_zero() {
            println!("Added {} to the blacklist", ip);
        } else {
            println!("Added {} to the blacklist for {}", ip, format_duration(duration));
        }
    }

    if let Some(ip) = &args.remove {
        bl.remove(ip)
            .map_err(|e| format!("Error removing IP from blacklist: {}", e))?;
        println!("Removed {} from the blacklist", ip);
    }

    if args.cleanup {
        let dropped = bl.cleanup();
        println!("Removed {} expired entries", dropped);
    }

    if args.list {
        println!("Global Blacklisted IPs:");
        for entry in bl.active_entries() {
            match entry.expires_at {
                Some(t) => println!("{} until {}", entry.ip, t.format("%Y-%m-%d %H:%M:%S UTC")),
                None => println!("{}", entry.ip),
            }
        }
    }

    Ok(())
}

fn init_logger(log_dir: &str, config: &Config) {
    let policy = TriggeringPolicy::from(config.get_log_policy().to_string());
    let configs = vec![
        LoggerConfig::new(log_dir, "default", "info", policy),
        LoggerConfig::new(log_dir, "blacklist", config.get_log_level(), policy),
        LoggerConfig::new(log_dir, "error", "error", policy),
    ];
    Pecker::default().init(log_dir, configs);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(s: &str) -> Vec<String> {
        std::iter::once("blacklist")
            .chain(s.split_whitespace())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_args() {
        let args = Args::parse(&argv("-file bl.json -add 10.0.0.1 -duration 24h -list")).unwrap();
        assert_eq!(args.file.as_deref(), Some("bl.json"));
        assert_eq!(args.add.as_deref(), Some("10.0.0.1"));
        assert_eq!(args.duration.as_deref(), Some("24h"));
        assert!(args.list);
        assert!(!args.cleanup);

        let args = Args::parse(&argv("--remove ::1 -cleanup -l /tmp/logs")).unwrap();
        assert_eq!(args.remove.as_deref(), Some("::1"));
        assert_eq!(args.log_dir.as_deref(), Some("/tmp/logs"));
        assert!(args.cleanup);
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(Args::parse(&argv("-add")).is_err());
        assert!(Args::parse(&argv("-bogus")).is_err());
    }
}
