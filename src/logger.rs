//! Process-wide logging through `log4rs`.
//!
//! Library code only uses the `log` macros; an application decides where records go by
//! calling one of the functions here once at startup.

use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

/// Target of developer benchmark lines emitted by [`crate::dev6!`].
pub const DEV6_TARGET: &str = "docbridge::dev6";

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;
const DEFAULT_RETENTION: u32 = 7;

fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn rolling(
    base: &Path,
    stem: &str,
    keep: u32,
) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", base.join(format!("{stem}.{{}}.log")).display()), keep)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    Ok(RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))?)
}

/// Configures logging for the process with rolling files under `dir`.
/// - dir: base directory for logs; current directory when `None`.
/// - level: off|error|warn|info|debug|trace, `info` otherwise.
/// - retention: number of rolled files to keep (default 7).
///
/// # Errors
/// Returns an error when the log files cannot be created. A logger already installed
/// by someone else is left in place.
pub fn configure_logging(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    configure_logging_with_dev(dir, level, retention, false)
}

/// Same as [`configure_logging`], additionally persisting `dev6!` lines to `dev6.log`
/// when `enable_dev6` is set.
///
/// # Errors
/// See [`configure_logging`].
pub fn configure_logging_with_dev(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
    enable_dev6: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let base = match dir {
        Some(d) => PathBuf::from(d),
        None => std::env::current_dir()?,
    };
    std::fs::create_dir_all(&base)?;
    let keep = retention.map_or(DEFAULT_RETENTION, |r| u32::try_from(r).unwrap_or(u32::MAX));
    let lvl = parse_level(level);

    let mut builder = Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling(&base, "app", keep)?)));
    builder = if enable_dev6 {
        builder
            .appender(Appender::builder().build("dev6", Box::new(rolling(&base, "dev6", keep)?)))
            .logger(
                Logger::builder()
                    .appender("dev6")
                    .additive(false)
                    .build(DEV6_TARGET, LevelFilter::Trace),
            )
    } else {
        builder.logger(Logger::builder().additive(false).build(DEV6_TARGET, LevelFilter::Off))
    };
    let config = builder.build(Root::builder().appender("app").build(lvl))?;
    if let Err(e) = log4rs::init_config(config) {
        log::debug!("logger already installed: {e}");
    }
    Ok(())
}

/// Configures logging from environment variables when present:
/// - `DOCBRIDGE_LOG_DIR`
/// - `DOCBRIDGE_LOG_LEVEL`
/// - `DOCBRIDGE_LOG_RETENTION`
/// - `DOCBRIDGE_DEV6` (`1`, `true` or `yes`)
///
/// # Errors
/// See [`configure_logging`].
pub fn configure_from_env() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::var("DOCBRIDGE_LOG_DIR").ok().map(PathBuf::from);
    let level = std::env::var("DOCBRIDGE_LOG_LEVEL").ok();
    let retention =
        std::env::var("DOCBRIDGE_LOG_RETENTION").ok().and_then(|s| s.parse::<usize>().ok());
    let dev6 = std::env::var("DOCBRIDGE_DEV6")
        .is_ok_and(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));
    configure_logging_with_dev(dir.as_deref(), level.as_deref(), retention, dev6)
}
