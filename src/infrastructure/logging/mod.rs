// Logging module - Logging infrastructure
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use std::io;

/// Filter used when `RUST_LOG` is not set
pub fn default_filter(level: &str) -> String {
    format!("atport={},warn", level)
}

/// Initialize logging system.
///
/// `RUST_LOG` takes precedence over `level`. Output goes to stderr so
/// responses on stdout stay machine readable.
pub fn init_logging(level: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(level)))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
        )
        .try_init()?;

    tracing::debug!("AtPort logging system initialized");
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter("debug"), "atport=debug,warn");
    }

    #[test]
    fn test_logging_init() {
        // A second install in the same process reports an error instead of panicking
        let _ = init_logging("info");
        assert!(init_logging("info").is_err());
    }
}
