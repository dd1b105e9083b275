use affix_core::{
    AffixSnapshot, AffixSource, Headers, HttpStatus, InboundMessage, InboundWebhook,
    OutboundReply, WebhookError, WebhookResponse,
};
use std::sync::Arc;
use tracing::{debug, error, field, info_span, warn, Instrument, Span};
use uuid::Uuid;

pub const CURRENT_KEYWORD: &str = "Current";

pub const HELP_TEXT: &str = "WoW Affix SMS!

The following commands are available:
- Current: list this week's affixes
- [AffixName]: description of a specific affix";

pub const TOO_MANY_WORDS: &str = "Sorry! You must use 1-word commands.";

pub const UNAVAILABLE_TEXT: &str =
    "Sorry! Affix data is unavailable right now. Please try again later.";

/// What the sender asked for. Checked in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    TooManyWords,
    Current,
    Affix(String),
    Help,
}

/// Bodies are split on single spaces, so `" Fortified"` counts as two words.
pub fn is_multi_word(body: &str) -> bool {
    body.split(' ').nth(1).is_some()
}

impl Intent {
    pub fn classify(body: &str, snapshot: &AffixSnapshot) -> Self {
        if is_multi_word(body) {
            Intent::TooManyWords
        } else if body == CURRENT_KEYWORD {
            Intent::Current
        } else if snapshot.has_affix(body) {
            Intent::Affix(body.to_string())
        } else {
            Intent::Help
        }
    }

    pub fn render(&self, snapshot: &AffixSnapshot) -> OutboundReply {
        match self {
            Intent::TooManyWords => too_many_words(),
            Intent::Current => {
                OutboundReply::new(format!("This week's affixes: {}", snapshot.title))
            }
            Intent::Affix(name) => OutboundReply::new(format!(
                "{}: {}",
                name,
                snapshot.describe_affix(name).unwrap_or_default()
            )),
            Intent::Help => OutboundReply::new(HELP_TEXT),
        }
    }
}

fn too_many_words() -> OutboundReply {
    OutboundReply::new(format!("{TOO_MANY_WORDS}\n\n{HELP_TEXT}"))
}

/// Stateless request handler: one fresh fetch per single-word message.
#[derive(Clone)]
pub struct Responder {
    source: Arc<dyn AffixSource>,
}

impl Responder {
    pub fn new(source: Arc<dyn AffixSource>) -> Self {
        Self { source }
    }

    pub async fn respond(&self, message: &InboundMessage) -> Result<OutboundReply, WebhookError> {
        let body = message.body.as_str();
        if is_multi_word(body) {
            debug!("request: body content more than 1 word");
            return Ok(too_many_words());
        }

        let snapshot = self.source.fetch().await?;
        let intent = Intent::classify(body, &snapshot);
        match &intent {
            Intent::Current => debug!("request: current"),
            Intent::Affix(name) => debug!(affix = %name, "request: specific affix"),
            _ => debug!(body = %body, "request: unrecognized"),
        }
        Ok(intent.render(&snapshot))
    }
}

/// Framework-agnostic webhook processor: verify, parse, respond, render.
#[derive(Clone)]
pub struct WebhookProcessor {
    hook: Arc<dyn InboundWebhook>,
    responder: Responder,
}

impl WebhookProcessor {
    pub fn new(hook: Arc<dyn InboundWebhook>, responder: Responder) -> Self {
        Self { hook, responder }
    }

    /// Process an incoming webhook request and return a framework-agnostic response
    pub async fn process_webhook(&self, headers: Headers, body: &[u8]) -> WebhookResponse {
        let span = info_span!(
            "webhook",
            request_id = %Uuid::new_v4(),
            provider = self.hook.provider(),
            from = field::Empty
        );
        async {
            match self.process_webhook_internal(&headers, body).await {
                Ok(response) => response,
                Err(e) => self.error_to_response(e),
            }
        }
        .instrument(span)
        .await
    }

    async fn process_webhook_internal(
        &self,
        headers: &Headers,
        body: &[u8],
    ) -> Result<WebhookResponse, WebhookError> {
        self.hook.verify(headers, body)?;
        let message = self.hook.parse_inbound(headers, body)?;
        if let Some(from) = message.from.as_deref() {
            Span::current().record("from", from);
        }
        debug!("inbound message");

        let reply = self.responder.respond(&message).await?;
        debug!(reply = %reply.text, "respond");
        self.hook.render_reply(&reply)
    }

    fn error_to_response(&self, error: WebhookError) -> WebhookResponse {
        match error {
            WebhookError::VerificationFailed(msg) => WebhookResponse::error(
                HttpStatus::Unauthorized,
                &format!("verification failed: {}", msg),
            ),
            WebhookError::ParseError(msg) => {
                WebhookResponse::error(HttpStatus::BadRequest, &format!("parse error: {}", msg))
            }
            WebhookError::Fetch(e) => {
                error!(error = %e, "affix fetch failed; sending apology");
                self.hook
                    .render_reply(&OutboundReply::new(UNAVAILABLE_TEXT))
                    .unwrap_or_else(|e| self.encode_failure(e))
            }
            e @ WebhookError::Encode(_) => self.encode_failure(e),
        }
    }

    fn encode_failure(&self, error: WebhookError) -> WebhookResponse {
        warn!(error = %error, "reply could not be encoded");
        WebhookResponse::error(HttpStatus::InternalServerError, &error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use affix_core::{AffixRecord, FetchError};
    use affix_twilio::{MessagingResponse, SignatureKey, TwilioWebhook};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory source that counts fetches.
    struct StubSource {
        result: Result<AffixSnapshot, FetchError>,
        fetches: AtomicUsize,
    }

    impl StubSource {
        fn ok(snapshot: AffixSnapshot) -> Arc<Self> {
            Arc::new(Self {
                result: Ok(snapshot),
                fetches: AtomicUsize::new(0),
            })
        }

        fn failing(err: FetchError) -> Arc<Self> {
            Arc::new(Self {
                result: Err(err),
                fetches: AtomicUsize::new(0),
            })
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AffixSource for StubSource {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn fetch(&self) -> Result<AffixSnapshot, FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn snapshot() -> AffixSnapshot {
        AffixSnapshot {
            region: "us".into(),
            title: "Fortified, Sanguine, Necrotic".into(),
            leaderboard_url: String::new(),
            affixes: vec![
                AffixRecord {
                    id: 10,
                    name: "Fortified".into(),
                    description: "D".into(),
                    wowhead_url: String::new(),
                },
                AffixRecord {
                    id: 8,
                    name: "Sanguine".into(),
                    description: "Pools of <blood> & ichor.".into(),
                    wowhead_url: String::new(),
                },
            ],
        }
    }

    async fn reply_for(source: Arc<StubSource>, body: &str) -> String {
        Responder::new(source)
            .respond(&InboundMessage::with_body(body))
            .await
            .unwrap()
            .text
    }

    #[test]
    fn classification_order() {
        let s = snapshot();
        assert_eq!(Intent::classify("foo bar", &s), Intent::TooManyWords);
        assert_eq!(Intent::classify("Fortified Sanguine", &s), Intent::TooManyWords);
        assert_eq!(Intent::classify("Current", &s), Intent::Current);
        assert_eq!(Intent::classify("current", &s), Intent::Help);
        assert_eq!(
            Intent::classify("Fortified", &s),
            Intent::Affix("Fortified".into())
        );
        assert_eq!(Intent::classify("Xyz", &s), Intent::Help);
        assert_eq!(Intent::classify("", &s), Intent::Help);
    }

    #[test]
    fn affix_named_current_loses_to_keyword() {
        let mut s = snapshot();
        s.affixes[0].name = "Current".into();
        assert_eq!(Intent::classify("Current", &s), Intent::Current);
    }

    #[test]
    fn only_single_spaces_split_words() {
        assert!(is_multi_word("a b"));
        assert!(is_multi_word(" Fortified"));
        assert!(is_multi_word("Fortified "));
        assert!(!is_multi_word("Fortified"));
        assert!(!is_multi_word("foo\tbar"));
        assert!(!is_multi_word(""));
    }

    #[tokio::test]
    async fn multi_word_skips_fetch() {
        let source = StubSource::ok(snapshot());
        let text = reply_for(source.clone(), "foo bar").await;
        assert!(text.starts_with("Sorry! You must use 1-word commands."));
        assert!(text.ends_with(HELP_TEXT));
        assert_eq!(source.fetches(), 0);
    }

    #[tokio::test]
    async fn current_lists_title() {
        let source = StubSource::ok(snapshot());
        let text = reply_for(source.clone(), "Current").await;
        assert_eq!(text, "This week's affixes: Fortified, Sanguine, Necrotic");
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn affix_name_gets_description() {
        let text = reply_for(StubSource::ok(snapshot()), "Fortified").await;
        assert_eq!(text, "Fortified: D");
    }

    #[tokio::test]
    async fn unknown_and_lowercase_get_help() {
        assert_eq!(reply_for(StubSource::ok(snapshot()), "Xyz").await, HELP_TEXT);
        assert_eq!(reply_for(StubSource::ok(snapshot()), "current").await, HELP_TEXT);
    }

    #[tokio::test]
    async fn repeated_requests_are_identical() {
        let source = StubSource::ok(snapshot());
        let first = reply_for(source.clone(), "Sanguine").await;
        let second = reply_for(source.clone(), "Sanguine").await;
        assert_eq!(first, second);
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn fetch_failure_is_an_error_result() {
        let responder = Responder::new(StubSource::failing(FetchError::Status(502)));
        let err = responder
            .respond(&InboundMessage::with_body("Current"))
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::Fetch(FetchError::Status(502))));
    }

    fn processor(source: Arc<StubSource>) -> WebhookProcessor {
        WebhookProcessor::new(Arc::new(TwilioWebhook::new()), Responder::new(source))
    }

    fn decoded_body(response: &WebhookResponse) -> String {
        MessagingResponse::from_xml(&response.body)
            .unwrap()
            .message
            .body
    }

    #[tokio::test]
    async fn processor_wraps_reply_in_envelope() {
        let response = processor(StubSource::ok(snapshot()))
            .process_webhook(vec![], b"Body=Fortified&From=%2B15550001111")
            .await;
        assert_eq!(response.status.as_u16(), 200);
        assert_eq!(response.content_type, "application/xml");
        assert_eq!(decoded_body(&response), "Fortified: D");
    }

    #[tokio::test]
    async fn processor_escapes_descriptions() {
        let response = processor(StubSource::ok(snapshot()))
            .process_webhook(vec![], b"Body=Sanguine")
            .await;
        assert!(!response.body.contains("<blood>"));
        assert_eq!(decoded_body(&response), "Sanguine: Pools of <blood> & ichor.");
    }

    #[tokio::test]
    async fn processor_apologizes_when_upstream_is_down() {
        let source = StubSource::failing(FetchError::Unreachable("connection refused".into()));
        let p = processor(source.clone());

        for _ in 0..2 {
            let response = p.process_webhook(vec![], b"Body=Current").await;
            assert_eq!(response.status.as_u16(), 200);
            assert_eq!(decoded_body(&response), UNAVAILABLE_TEXT);
        }
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn processor_apologizes_on_malformed_payload() {
        let source = StubSource::failing(FetchError::Malformed("expected value".into()));
        let response = processor(source)
            .process_webhook(vec![], b"Body=Fortified")
            .await;
        assert_eq!(decoded_body(&response), UNAVAILABLE_TEXT);
    }

    #[tokio::test]
    async fn processor_rejects_bad_signature() {
        let key = SignatureKey::new("secret", "https://example.com/sms").unwrap();
        let p = WebhookProcessor::new(
            Arc::new(TwilioWebhook::new().with_signature_key(key)),
            Responder::new(StubSource::ok(snapshot())),
        );
        let headers: Headers = vec![("X-Twilio-Signature".into(), "AAAA".into())];
        let response = p.process_webhook(headers, b"Body=Current").await;
        assert_eq!(response.status.as_u16(), 401);
        assert!(response.body.contains("verification failed"));
    }

    /// Collects every value recorded into a span field named `from`.
    struct FromRecorder(Arc<std::sync::Mutex<Vec<String>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for FromRecorder {
        fn on_record(
            &self,
            _id: &tracing::span::Id,
            values: &tracing::span::Record<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            struct Visitor<'a>(&'a std::sync::Mutex<Vec<String>>);

            impl tracing::field::Visit for Visitor<'_> {
                fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                    if field.name() == "from" {
                        self.0.lock().unwrap().push(value.to_string());
                    }
                }

                fn record_debug(
                    &mut self,
                    _field: &tracing::field::Field,
                    _value: &dyn std::fmt::Debug,
                ) {
                }
            }

            values.record(&mut Visitor(&self.0));
        }
    }

    #[tokio::test]
    async fn request_span_carries_sender() {
        use tracing_subscriber::layer::SubscriberExt;

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(FromRecorder(seen.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let p = processor(StubSource::ok(snapshot()));
        p.process_webhook(vec![], b"Body=Current&From=%2B15550001111")
            .await;
        p.process_webhook(vec![], b"Body=Current").await;

        assert_eq!(*seen.lock().unwrap(), vec!["+15550001111".to_string()]);
    }
}
