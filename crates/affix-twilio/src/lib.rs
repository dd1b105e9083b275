//! Twilio side of the responder: decode the inbound form, check the
//! `X-Twilio-Signature` header, and wrap replies in a TwiML envelope.

use affix_core::{
    header_value, Headers, InboundMessage, InboundWebhook, OutboundReply, WebhookError,
    WebhookResponse,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use tracing::warn;

const PROVIDER: &str = "twilio";
const SIGNATURE_HEADER: &str = "x-twilio-signature";

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

type HmacSha1 = Hmac<Sha1>;

/// Fields of a Twilio messaging webhook that we read. Everything else is ignored.
#[derive(Debug, Clone, Default)]
pub struct TwilioInbound {
    /// Absent `Body` reads as empty.
    pub body: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub message_sid: Option<String>,
}

impl TwilioInbound {
    /// Build from decoded form pairs. Repeated fields keep their first value.
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let first = |name: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };
        Self {
            body: first("Body").unwrap_or_default(),
            from: first("From"),
            to: first("To"),
            message_sid: first("MessageSid"),
        }
    }
}

impl From<TwilioInbound> for InboundMessage {
    fn from(t: TwilioInbound) -> Self {
        InboundMessage {
            body: t.body,
            from: t.from,
            to: t.to,
            message_id: t.message_sid,
        }
    }
}

/// `<Response><Message><Body>..</Body></Message></Response>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "Response")]
pub struct MessagingResponse {
    #[serde(rename = "Message")]
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "Body")]
    pub body: String,
}

impl MessagingResponse {
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self {
            message: Message { body: text.into() },
        }
    }

    /// Serialize with the XML declaration prepended. Text is escaped by the encoder.
    pub fn to_xml(&self) -> Result<String, WebhookError> {
        let tree =
            quick_xml::se::to_string(self).map_err(|e| WebhookError::Encode(e.to_string()))?;
        Ok(format!("{XML_DECLARATION}{tree}"))
    }

    pub fn from_xml(xml: &str) -> Result<Self, WebhookError> {
        quick_xml::de::from_str(xml).map_err(|e| WebhookError::ParseError(e.to_string()))
    }
}

/// Credentials for checking `X-Twilio-Signature`.
#[derive(Clone, Debug)]
pub struct SignatureKey {
    auth_token: String,
    /// Public URL Twilio posts to, exactly as configured in the Twilio console.
    webhook_url: String,
}

impl SignatureKey {
    pub fn new<S: Into<String>>(auth_token: S, webhook_url: &str) -> Result<Self, WebhookError> {
        let parsed = url::Url::parse(webhook_url)
            .map_err(|e| WebhookError::ParseError(format!("webhook url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(WebhookError::ParseError(format!(
                "webhook url must be http(s): {webhook_url}"
            )));
        }
        Ok(Self {
            auth_token: auth_token.into(),
            webhook_url: webhook_url.to_string(),
        })
    }

    fn mac(&self, params: &[(String, String)]) -> Result<HmacSha1, WebhookError> {
        let mut sorted: Vec<&(String, String)> = params.iter().collect();
        sorted.sort();

        let mut mac = HmacSha1::new_from_slice(self.auth_token.as_bytes())
            .map_err(|e| WebhookError::VerificationFailed(e.to_string()))?;
        mac.update(self.webhook_url.as_bytes());
        for (k, v) in sorted {
            mac.update(k.as_bytes());
            mac.update(v.as_bytes());
        }
        Ok(mac)
    }

    /// Base64 HMAC-SHA1 over the URL followed by the sorted `key+value` pairs.
    pub fn sign(&self, params: &[(String, String)]) -> Result<String, WebhookError> {
        Ok(STANDARD.encode(self.mac(params)?.finalize().into_bytes()))
    }

    pub fn verify(&self, params: &[(String, String)], signature: &str) -> Result<(), WebhookError> {
        let provided = STANDARD
            .decode(signature.trim())
            .map_err(|e| WebhookError::VerificationFailed(format!("bad encoding: {e}")))?;
        self.mac(params)?
            .verify_slice(&provided)
            .map_err(|_| WebhookError::VerificationFailed("signature mismatch".into()))
    }
}

/// Twilio webhook contract. Signatures are only checked when a key is set.
#[derive(Clone, Debug, Default)]
pub struct TwilioWebhook {
    signature_key: Option<SignatureKey>,
}

impl TwilioWebhook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signature_key(mut self, key: SignatureKey) -> Self {
        self.signature_key = Some(key);
        self
    }
}

impl InboundWebhook for TwilioWebhook {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn parse_inbound(&self, _headers: &Headers, body: &[u8]) -> Result<InboundMessage, WebhookError> {
        // Twilio posts application/x-www-form-urlencoded.
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
            .map_err(|e| WebhookError::ParseError(format!("form decode: {e}")))?;
        Ok(TwilioInbound::from_pairs(&pairs).into())
    }

    fn render_reply(&self, reply: &OutboundReply) -> Result<WebhookResponse, WebhookError> {
        Ok(WebhookResponse::xml(
            MessagingResponse::new(reply.text.as_str()).to_xml()?,
        ))
    }

    fn verify(&self, headers: &Headers, body: &[u8]) -> Result<(), WebhookError> {
        let Some(key) = &self.signature_key else {
            return Ok(());
        };
        let signature = header_value(headers, SIGNATURE_HEADER).ok_or_else(|| {
            warn!("webhook rejected: missing signature header");
            WebhookError::VerificationFailed("missing X-Twilio-Signature".into())
        })?;
        let params: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
            .map_err(|e| WebhookError::ParseError(format!("form decode: {e}")))?;
        key.verify(&params, signature).inspect_err(|e| {
            warn!(error = %e, "webhook rejected");
        })
    }
}
