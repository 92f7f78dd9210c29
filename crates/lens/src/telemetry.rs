use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `lens_worker=debug,info`.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Installs the global subscriber. Logs go to stderr so stdout stays usable
/// for command output.
pub fn init(cfg: &LogConfig) {
    let filter = EnvFilter::try_new(&cfg.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let base = fmt::layer().with_target(true).with_writer(std::io::stderr);
    let fmt_layer = match cfg.format {
        LogFormat::Json => base.json().boxed(),
        LogFormat::Text => base.boxed(),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
