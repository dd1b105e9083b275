//! # affixsms
//!
//! Text a keyword, get this week's World of Warcraft Mythic+ affixes back.
//!
//! The service receives a Twilio messaging webhook, fetches the current
//! affixes from raider.io and answers with a TwiML reply:
//!
//! - `Current`: this week's affix title
//! - `<AffixName>`: that affix's description (exact, case-sensitive match)
//! - anything else: the command list
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use affixsms::{config::AppConfig, telemetry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), affixsms::AppError> {
//!     let cfg = AppConfig::load()?;
//!     telemetry::init(&cfg.logging)?;
//!     affixsms::serve(cfg).await
//! }
//! ```
//!
//! ## Configuration
//!
//! Defaults can be overridden from `config/*.toml` files or `AFFIXSMS__`
//! prefixed environment variables, e.g. `AFFIXSMS__SERVER__PORT=9000`.

pub mod config;
pub mod telemetry;

use affix_core::{FetchError, WebhookError};
use affix_raiderio::RaiderIoClient;
use affix_responder::{Responder, WebhookProcessor};
use affix_twilio::{SignatureKey, TwilioWebhook};
use affix_web_axum::AppState;
use axum::Router;
use std::sync::Arc;
use tracing::info;

pub use config::AppConfig;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ::config::ConfigError),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("logging setup failed: {0}")]
    Telemetry(String),
    #[error("upstream client: {0}")]
    Upstream(#[from] FetchError),
    #[error("webhook setup: {0}")]
    Webhook(#[from] WebhookError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire the fetcher, gateway contract and responder into an axum router.
pub fn build_app(cfg: &AppConfig) -> Result<Router, AppError> {
    let source = RaiderIoClient::new(
        cfg.upstream.base_url.clone(),
        cfg.upstream.region.as_str(),
        cfg.upstream.locale.as_str(),
        cfg.upstream.timeout(),
    )?;

    let mut hook = TwilioWebhook::new();
    if cfg.twilio.verify_signatures {
        let token = cfg.twilio.auth_token.clone().unwrap_or_default();
        let url = cfg.twilio.webhook_url.as_deref().unwrap_or_default();
        hook = hook.with_signature_key(SignatureKey::new(token, url)?);
    }

    let processor = WebhookProcessor::new(Arc::new(hook), Responder::new(Arc::new(source)));
    Ok(affix_web_axum::router(
        AppState { processor },
        &cfg.server.webhook_path,
    ))
}

pub async fn serve(cfg: AppConfig) -> Result<(), AppError> {
    let app = build_app(&cfg)?;
    let listener = tokio::net::TcpListener::bind(cfg.server.bind_addr()).await?;
    info!(
        addr = %listener.local_addr()?,
        path = %cfg.server.webhook_path,
        "affixsms started"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("affixsms stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// Common imports for affixsms usage
pub mod prelude {
    pub use crate::config::{AppConfig, LoggingConfig, ServerConfig, TwilioConfig, UpstreamConfig};
    pub use crate::{build_app, serve, AppError};
    pub use affix_core::*;
}
