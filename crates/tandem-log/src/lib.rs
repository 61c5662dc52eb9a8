//! Structured logging and tracing for Tandem.
//!
//! Console output with uptime timestamps and module paths, plus optional JSON
//! file logging for post-session analysis of desync reports. The filter comes
//! from `RUST_LOG` when set, otherwise from the config's `debug.log_level`.

use std::path::Path;

use tandem_config::Config;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter used when neither `RUST_LOG` nor config provide one.
pub const DEFAULT_FILTER: &str = "info,tandem_net=info,tandem_sync=info";

/// Build the filter string from an optional config.
pub fn filter_string(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.is_empty() => {
            let level = config.debug.log_level.as_str();
            // A bare level applies to our crates too; a directive list is used verbatim.
            if level.contains('=') || level.contains(',') {
                level.to_string()
            } else {
                format!("{level},tandem_net={level},tandem_sync={level}")
            }
        }
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Initialize the tracing subscriber.
///
/// * `log_dir` - Directory for the JSON log file, used when `file_logging` is set
/// * `file_logging` - Whether to add the JSON file layer
/// * `config` - Optional configuration supplying the log level
///
/// # Examples
///
/// ```no_run
/// use tandem_log::init_logging;
/// use tandem_config::Config;
///
/// init_logging(None, false, None);
///
/// let config = Config::default();
/// init_logging(Some(std::path::Path::new("./logs")), true, Some(&config));
/// ```
pub fn init_logging(log_dir: Option<&Path>, file_logging: bool, config: Option<&Config>) {
    let filter_str = filter_string(config);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if file_logging
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join("tandem.log"))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        // try_init: tests and embedders may already have a global subscriber.
        let _ = subscriber.with(file_layer).try_init();
        return;
    }

    let _ = subscriber.try_init();
}

/// Initialize logging from a loaded config, honouring its debug section.
pub fn init_from_config(config: &Config) {
    init_logging(
        config.debug.log_dir.as_deref(),
        config.debug.file_logging,
        Some(config),
    );
}

/// Create an `EnvFilter` with the default filter string.
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}
