//! Logging setup

use tracing::Level;

use crate::error::{ClientError, Result};

/// Parse a textual level; unknown names fall back to INFO
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install a stderr subscriber.
///
/// Stdout belongs to the host in stdio setups, so logs always go to
/// stderr. `verbose` adds targets, thread ids and source locations.
pub fn init_logging(level: &str, verbose: bool) -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(parse_level(level))
        .with_target(verbose)
        .with_thread_ids(verbose)
        .with_file(verbose)
        .with_line_number(verbose)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| ClientError::ConfigError(format!("Failed to initialise logging: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("loud"), Level::INFO);
    }

    #[test]
    fn test_second_init_reports_error() {
        let _ = init_logging("info", false);
        assert!(init_logging("info", false).is_err());
    }
}
