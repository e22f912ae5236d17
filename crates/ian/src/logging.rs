use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Targets that follow `--log-level`. Everything else is capped at warn.
const ENGINE_TARGETS: [&str; 5] = ["ian", "ian_transport", "ian_listener", "ian_packets", "ian_iface"];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

pub fn engine_filter(level: LogLevel) -> Targets {
    let level = level.as_filter();
    ENGINE_TARGETS.iter().fold(
        Targets::new().with_default(level.min(LevelFilter::WARN)),
        |targets, target| targets.with_target(*target, level),
    )
}

/// Logs go to stderr; stdout carries command output only.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false);
    let filter = engine_filter(level);

    let _ = match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(layer.with_filter(filter))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(layer.json().with_filter(filter))
            .try_init(),
    };
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn engine_targets_follow_level() {
        let filter = engine_filter(LogLevel::Debug);
        assert!(filter.would_enable("ian_iface::interface", &Level::DEBUG));
        assert!(filter.would_enable("ian_packets::reader", &Level::DEBUG));
        assert!(!filter.would_enable("ian_packets::reader", &Level::TRACE));
    }

    #[test]
    fn other_targets_capped_at_warn() {
        let filter = engine_filter(LogLevel::Trace);
        assert!(filter.would_enable("tokio::runtime", &Level::WARN));
        assert!(!filter.would_enable("tokio::runtime", &Level::INFO));

        let quiet = engine_filter(LogLevel::Error);
        assert!(!quiet.would_enable("tokio::runtime", &Level::WARN));
    }
}
