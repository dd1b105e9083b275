//! # Affix Core
//!
//! Core traits and types for the affixsms responder.
//!
//! This crate provides the building blocks shared by every other crate:
//! - [`AffixSource`] trait for fetching the current week's affixes
//! - [`AffixSnapshot`] / [`AffixRecord`] for one fetch result
//! - [`InboundMessage`] / [`OutboundReply`] for the SMS side
//! - [`InboundWebhook`] trait for the SMS gateway's request/reply contract
//! - Error types and a framework-agnostic [`WebhookResponse`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use affix_core::AffixSource;
//!
//! let snapshot = source.fetch().await?;
//! if snapshot.has_affix("Fortified") {
//!     println!("{}", snapshot.describe_affix("Fortified").unwrap_or_default());
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors that can occur while fetching affix data
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The request could not be completed (DNS, connect, timeout, read)
    #[error("upstream unreachable: {0}")]
    Unreachable(String),
    /// Upstream answered with a non-success status
    #[error("upstream returned HTTP {0}")]
    Status(u16),
    /// Upstream body was not the expected JSON shape
    #[error("malformed upstream payload: {0}")]
    Malformed(String),
}

/// Errors raised while handling an inbound webhook
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("signature verification failed: {0}")]
    VerificationFailed(String),
    #[error("parsing failed: {0}")]
    ParseError(String),
    #[error("reply encoding failed: {0}")]
    Encode(String),
    #[error("affix fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

/// HTTP status code for web responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatus {
    Ok = 200,
    BadRequest = 400,
    Unauthorized = 401,
    InternalServerError = 500,
}

impl HttpStatus {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// One affix entry as published upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AffixRecord {
    pub id: i64,
    /// Lookup key. Matching is exact: case and whitespace sensitive.
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub wowhead_url: String,
}

/// Result of a single fetch. Built fresh per request and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AffixSnapshot {
    #[serde(default)]
    pub region: String,
    pub title: String,
    #[serde(default)]
    pub leaderboard_url: String,
    #[serde(rename = "affix_details")]
    pub affixes: Vec<AffixRecord>,
}

impl AffixSnapshot {
    /// True iff some record is named exactly `name`.
    pub fn has_affix(&self, name: &str) -> bool {
        self.affixes.iter().any(|a| a.name == name)
    }

    /// Description of the first record named exactly `name`.
    ///
    /// Upstream does not promise unique names; the first match in sequence
    /// order wins.
    pub fn describe_affix(&self, name: &str) -> Option<&str> {
        self.affixes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.description.as_str())
    }
}

/// Normalized inbound text message. Only `body` drives the reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundMessage {
    pub body: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub message_id: Option<String>,
}

impl InboundMessage {
    pub fn with_body<S: Into<String>>(body: S) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }
}

/// Text sent back to the sender, before it is wrapped in an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    pub text: String,
}

impl OutboundReply {
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self { text: text.into() }
    }
}

/// Generic webhook response that can be converted to any framework's response type
#[derive(Debug, Clone)]
pub struct WebhookResponse {
    pub status: HttpStatus,
    pub body: String,
    pub content_type: String,
}

impl WebhookResponse {
    pub fn xml(body: String) -> Self {
        Self {
            status: HttpStatus::Ok,
            body,
            content_type: "application/xml".to_string(),
        }
    }

    pub fn error(status: HttpStatus, message: &str) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": message }).to_string(),
            content_type: "application/json".to_string(),
        }
    }
}

/// Source of the current week's affixes.
#[async_trait]
pub trait AffixSource: Send + Sync {
    /// Stable source key, e.g. "raiderio".
    fn name(&self) -> &'static str;
    /// Fetch a fresh snapshot. Implementations must not cache.
    async fn fetch(&self) -> Result<AffixSnapshot, FetchError>;
}

/// SMS gateway contract: how inbound webhooks are read and replies written.
pub trait InboundWebhook: Send + Sync {
    /// Stable gateway key, e.g. "twilio".
    fn provider(&self) -> &'static str;
    /// Parse the incoming HTTP payload (headers + raw body) into a normalized `InboundMessage`.
    fn parse_inbound(&self, headers: &Headers, body: &[u8]) -> Result<InboundMessage, WebhookError>;
    /// Wrap reply text in the envelope the gateway expects.
    fn render_reply(&self, reply: &OutboundReply) -> Result<WebhookResponse, WebhookError>;

    /// Optional signature verification (no-op by default).
    fn verify(&self, _headers: &Headers, _body: &[u8]) -> Result<(), WebhookError> {
        Ok(())
    }
}

/// Lightweight header representation to avoid tying the core to any HTTP framework.
pub type Headers = Vec<(String, String)>;

/// Case-insensitive header lookup.
pub fn header_value<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
