//! Optional file-based logging setup for embedders that want it.
//!
//! The engine itself only ever calls the `log` macros; nothing in this
//! crate requires a logger to be configured (the default no-op `log`
//! target is fine for a library). These helpers exist for callers who
//! want the same rolling-file setup as the rest of the corpus.

use std::path::Path;

/// Initialize logging from a `log4rs` YAML config file at `path`.
///
/// # Errors
/// Returns an error if the file is missing or malformed.
pub fn init_from_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    log4rs::init_file(path, log4rs::config::Deserializers::default())?;
    Ok(())
}

/// Initialize a rolling-file logger rooted at `dir`, writing `streamdb.log`
/// (rolled at 10 MiB, 7 generations kept) at the given level
/// (`error`|`warn`|`info`|`debug`|`trace`, defaulting to `info`).
///
/// # Errors
/// Returns an error if the directory cannot be created or the logger
/// fails to initialize.
pub fn init_in_dir(dir: &Path, level: &str) -> Result<(), Box<dyn std::error::Error>> {
    use log::LevelFilter;
    use log4rs::append::rolling_file::RollingFileAppender;
    use log4rs::append::rolling_file::policy::compound::{
        CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
    };
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;
    use std::fs;

    fs::create_dir_all(dir)?;
    let lvl = match level.to_ascii_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };
    let pattern = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", dir.join("streamdb.{}.log").display()), 7)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(10 * 1024 * 1024)), Box::new(roller));
    let appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build(dir.join("streamdb.log"), Box::new(policy))?;
    let config = Config::builder()
        .appender(Appender::builder().build("file", Box::new(appender)))
        .build(Root::builder().appender("file").build(lvl))?;
    log4rs::init_config(config)?;
    Ok(())
}

/// Configure logging from environment variables, if present:
/// - `STREAMDB_LOG_DIR`
/// - `STREAMDB_LOG_LEVEL`
///
/// Silently does nothing if `STREAMDB_LOG_DIR` is unset.
pub fn configure_from_env() {
    let Some(dir) = std::env::var("STREAMDB_LOG_DIR").ok().map(std::path::PathBuf::from) else {
        return;
    };
    let level = std::env::var("STREAMDB_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let _ = init_in_dir(&dir, &level);
}
