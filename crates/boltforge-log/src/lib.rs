// ABOUTME: Shared logging setup for the boltforge binaries
// ABOUTME: init() for stderr, init_file() for long-running replays, init_for() to focus one crate

use tracing_subscriber::EnvFilter;

/// Standard logging to stderr. Default: INFO level, RUST_LOG override.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();
}

/// Logging for `boltforge --log-file`: `replay` and `parse` write JSON lines to
/// stdout for other tools to consume, so runner warnings go to
/// ~/.config/boltforge/{app_name}.log instead (WARN unless RUST_LOG overrides).
/// A file that can't be opened is reported on stderr and the command runs unlogged.
pub fn init_file(app_name: &str) {
    if let Err(e) = init_file_inner(app_name) {
        eprintln!("Warning: failed to set up file logging: {e}");
    }
}

fn init_file_inner(app_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = log_dir().ok_or("could not determine config directory")?;
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(format!("{app_name}.log")))?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .with_ansi(false)
        .init();

    Ok(())
}

/// Directory log files are written to.
pub fn log_dir() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|dir| dir.join("boltforge"))
}

/// Crate-filtered logging to stderr. Default: INFO for the named crate, WARN for everything else.
pub fn init_for(crate_name: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(crate_filter(crate_name))
        .with_writer(std::io::stderr)
        .init();
}

fn crate_filter(crate_name: &str) -> EnvFilter {
    let directive = format!("{}=info", crate_name.replace('-', "_"));
    EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into())
        .add_directive(
            directive
                .parse()
                .unwrap_or_else(|_| tracing::Level::INFO.into()),
        )
}

#[cfg(test)]
mod tests {
    #[test]
    fn exports_init() {
        let _ = super::init as fn();
    }

    #[test]
    fn exports_init_file() {
        let _ = super::init_file as fn(&str);
    }

    #[test]
    fn crate_filter_normalizes_dashes() {
        let filter = super::crate_filter("boltforge-core");
        assert!(filter.to_string().contains("boltforge_core=info"));
    }

    #[test]
    fn log_dir_is_namespaced() {
        if let Some(dir) = super::log_dir() {
            assert!(dir.ends_with("boltforge"));
        }
    }
}
