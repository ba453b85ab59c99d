//! Shared stderr logger for the workspace binaries.

use std::env;
use std::io::Write;

use log::LevelFilter;

pub const LOG_ENV: &str = "VISCA_LOG";

/// Picks the level: explicit flag, then `VISCA_LOG`, then `debug`/`info`.
/// Unknown names fall through to the next source.
pub fn resolve_level(flag: Option<&str>, env_value: Option<&str>, debug: bool) -> LevelFilter {
    [flag, env_value]
        .into_iter()
        .flatten()
        .find_map(parse_level)
        .unwrap_or(if debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
}

fn parse_level(name: &str) -> Option<LevelFilter> {
    match name.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(LevelFilter::Trace),
        "debug" => Some(LevelFilter::Debug),
        "info" => Some(LevelFilter::Info),
        "warn" => Some(LevelFilter::Warn),
        "error" => Some(LevelFilter::Error),
        "off" => Some(LevelFilter::Off),
        _ => None,
    }
}

/// Human-readable `[binary] LEVEL message` lines on stderr; stdout carries
/// the JSON events.
pub fn init(binary: &'static str, flag: Option<&str>, debug: bool) {
    let env_value = env::var(LOG_ENV).ok();
    let level = resolve_level(flag, env_value.as_deref(), debug);
    if let Some(flag) = flag.filter(|f| parse_level(f).is_none()) {
        eprintln!("[{}] unknown log level {:?}, using {}", binary, flag, level);
    }

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .format(move |buf, record| {
            writeln!(buf, "[{}] {} {}", binary, record.level(), record.args())
        })
        .target(env_logger::Target::Stderr)
        .try_init();
}
