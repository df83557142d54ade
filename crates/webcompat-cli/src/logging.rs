//! Tracing subscriber wiring

use crate::config::Verbosity;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// Verbosity flags pick the default level; `RUST_LOG` overrides it.
/// Events go to stderr so probe lines and JSON stay alone on stdout.
pub fn init(verbosity: Verbosity) {
    let default_level = level_for(verbosity);
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

const fn level_for(verbosity: Verbosity) -> LevelFilter {
    match verbosity {
        Verbosity::Quiet => LevelFilter::ERROR,
        Verbosity::Normal => LevelFilter::WARN,
        Verbosity::Verbose => LevelFilter::INFO,
        Verbosity::Debug => LevelFilter::DEBUG,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn levels_follow_the_flag_ladder() {
        assert_eq!(level_for(Verbosity::Quiet), LevelFilter::ERROR);
        assert_eq!(level_for(Verbosity::Normal), LevelFilter::WARN);
        assert_eq!(level_for(Verbosity::Verbose), LevelFilter::INFO);
        assert_eq!(level_for(Verbosity::Debug), LevelFilter::DEBUG);
    }
}
