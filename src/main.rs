use affixsms::{config::AppConfig, telemetry};

#[tokio::main]
async fn main() {
    let cfg = match AppConfig::load() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = telemetry::init(&cfg.logging) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    if let Err(e) = affixsms::serve(cfg).await {
        tracing::error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
}
