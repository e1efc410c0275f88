//! Logging for vigil
//!
//! Events go to a daily-rotated `vigil.log` in the XDG state directory. The
//! reconciler and transport actors run inside `reconciler` and `transport`
//! spans, and chunk inflation inside an `inflate` span carrying the module id,
//! so one module's traffic can be followed through the file.
//!
//! Filtering starts from `logging.level` and adds one directive per entry in
//! `logging.directives` (e.g. `vigil_core::transport=debug`). A non-empty
//! `RUST_LOG` replaces both.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::Directive,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Install the file subscriber. Keep the returned guard alive until exit.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let filter = build_filter(config)?;
    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("vigil.log")
        .max_log_files(config.max_files.max(1))
        .build(&log_dir)
        .map_err(|e| Error::Config(format!("failed to create log file: {}", e)))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        directives = config.directives.len(),
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Filter for the file subscriber, honouring `RUST_LOG` when set
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    filter_for(config, env.as_deref())
}

fn filter_for(config: &LoggingConfig, env: Option<&str>) -> Result<EnvFilter> {
    if let Some(spec) = env.filter(|s| !s.trim().is_empty()) {
        return EnvFilter::try_new(spec)
            .map_err(|e| Error::Config(format!("invalid {}: {}", EnvFilter::DEFAULT_ENV, e)));
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| Error::Config(format!("invalid logging.level {:?}: {}", config.level, e)))?;
    for directive in &config.directives {
        let parsed: Directive = directive
            .parse()
            .map_err(|e| Error::Config(format!("invalid log directive {:?}: {}", directive, e)))?;
        filter = filter.add_directive(parsed);
    }
    Ok(filter)
}

/// Initialize logging for tests (logs to stdout)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Flushes pending writes when dropped
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

pub fn log_file_path() -> PathBuf {
    Config::log_path()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logging(level: &str, directives: &[&str]) -> LoggingConfig {
        LoggingConfig {
            level: level.to_string(),
            directives: directives.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_log_file_path() {
        assert!(log_file_path().ends_with("vigil.log"));
    }

    #[test]
    fn test_directives_extend_base_level() {
        let config = logging("warn", &["vigil_core::transport=debug"]);
        let filter = filter_for(&config, None).unwrap().to_string();
        assert!(filter.contains("warn"), "filter: {filter}");
        assert!(filter.contains("vigil_core::transport=debug"), "filter: {filter}");
    }

    #[test]
    fn test_env_replaces_config() {
        let config = logging("warn", &["vigil_core::transport=debug"]);
        let filter = filter_for(&config, Some("vigil_core=trace")).unwrap().to_string();
        assert!(filter.contains("vigil_core=trace"), "filter: {filter}");
        assert!(!filter.contains("transport"), "filter: {filter}");

        // Blank RUST_LOG falls back to the config
        let filter = filter_for(&config, Some("  ")).unwrap().to_string();
        assert!(filter.contains("vigil_core::transport=debug"), "filter: {filter}");
    }

    #[test]
    fn test_invalid_directive_is_config_error() {
        let config = logging("info", &["vigil_core::transport=loud"]);
        match filter_for(&config, None) {
            Err(Error::Config(msg)) => assert!(msg.contains("transport=loud"), "{msg}"),
            other => panic!("expected config error, got {:?}", other.map(|f| f.to_string())),
        }
    }
}
