//! Ambient log4rs initialization. The engine only calls `log` macros; this
//! module is the only place that touches `log4rs` directly.

use std::fs;
use std::path::Path;

/// Initializes logging from a `log4rs.yaml` in the working directory, if one
/// exists. Silently does nothing on failure, matching `log4rs::init_file`'s
/// "best effort" role as a default entry point.
pub fn init_file() {
    let _ = log4rs::init_file("log4rs.yaml", log4rs::config::Deserializers::default());
}

/// Initializes a rolling file appender under `{base_dir}/{store_name}_logs/`,
/// writing `{store_name}.log`.
///
/// # Errors
/// Returns an error if the log directory can't be created or the appender
/// can't be built.
pub fn init_for_store_in(base_dir: &Path, store_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    use log::LevelFilter;
    use log4rs::append::rolling_file::RollingFileAppender;
    use log4rs::append::rolling_file::policy::compound::{
        CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
    };
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;

    let mut dir = base_dir.to_path_buf();
    dir.push(format!("{store_name}_logs"));
    fs::create_dir_all(&dir)?;

    let pattern = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
    let log_path = dir.join(format!("{store_name}.log"));
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", dir.join(format!("{store_name}.{{}}.log")).display()), 7)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(10 * 1024 * 1024)), Box::new(roller));
    let appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build(log_path, Box::new(policy))?;

    let config = Config::builder()
        .appender(Appender::builder().build("store", Box::new(appender)))
        .build(Root::builder().appender("store").build(level_from_env()))?;
    log4rs::init_config(config)?;
    Ok(())
}

fn level_from_env() -> log::LevelFilter {
    use log::LevelFilter;
    match std::env::var("RESONANCEDB_LOG_LEVEL").unwrap_or_default().to_ascii_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}
