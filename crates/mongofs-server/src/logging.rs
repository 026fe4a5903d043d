//! Logging setup

use crate::config::ServerConfig;
use tracing_subscriber::FmtSubscriber;

/// Install the global `tracing` subscriber described by `config`.
///
/// Only the first call in a process installs anything; later calls return
/// `false` and leave the existing subscriber in place, so test suites can
/// call this from every setup.
pub fn init(config: &ServerConfig) -> bool {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level.as_tracing())
        .with_ansi(config.colors)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = ServerConfig::new().colors(false);
        init(&config);
        assert!(!init(&config));
    }
}
