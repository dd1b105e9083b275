use affix_core::{AffixSnapshot, AffixSource, FetchError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

const SOURCE: &str = "raiderio";

/// raider.io Mythic+ affixes client.
#[derive(Clone, Debug)]
pub struct RaiderIoClient {
    /// API base URL; override for testing/mocking.
    pub base_url: String,
    pub region: String,
    pub locale: String,
    http: reqwest::Client,
}

impl RaiderIoClient {
    /// `base_url` is normally `https://raider.io`; tests point it at a mock.
    pub fn new<S: Into<String>>(
        base_url: String,
        region: S,
        locale: S,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Unreachable(e.to_string()))?;
        Ok(Self {
            base_url,
            region: region.into(),
            locale: locale.into(),
            http,
        })
    }

    fn affixes_url(&self) -> String {
        format!(
            "{}/api/v1/mythic-plus/affixes",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl AffixSource for RaiderIoClient {
    fn name(&self) -> &'static str {
        SOURCE
    }

    async fn fetch(&self) -> Result<AffixSnapshot, FetchError> {
        let res = self
            .http
            .get(self.affixes_url())
            .query(&[("region", &self.region), ("locale", &self.locale)])
            .send()
            .await
            .map_err(|e| FetchError::Unreachable(e.to_string()))?;

        if !res.status().is_success() {
            return Err(FetchError::Status(res.status().as_u16()));
        }

        let raw_text = res
            .text()
            .await
            .map_err(|e| FetchError::Unreachable(e.to_string()))?;
        let snapshot: AffixSnapshot = serde_json::from_str(&raw_text)
            .map_err(|e| FetchError::Malformed(e.to_string()))?;

        debug!(
            source = SOURCE,
            affixes = snapshot.affixes.len(),
            "fetched affix snapshot"
        );
        Ok(snapshot)
    }
}
