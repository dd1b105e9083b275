use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::AppError;

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
pub fn init(cfg: &LoggingConfig) -> Result<(), AppError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .map_err(|e| AppError::Telemetry(e.to_string()))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match cfg.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.pretty().try_init(),
    };
    installed.map_err(|e| AppError::Telemetry(e.to_string()))
}
