//! Guest script sources

use crate::domain::ports::ScriptSource;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Downloads scripts over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpScriptSource {
    client: reqwest::Client,
}

impl HttpScriptSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ScriptSource for HttpScriptSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let content = response.text().await?;
        debug!(url = %url, bytes = content.len(), "Downloaded guest script");
        Ok(content)
    }
}

/// Serves scripts from memory, keyed by URL
#[derive(Debug, Clone, Default)]
pub struct InlineScriptSource {
    scripts: HashMap<String, String>,
}

impl InlineScriptSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(mut self, url: impl Into<String>, content: impl Into<String>) -> Self {
        self.scripts.insert(url.into(), content.into());
        self
    }
}

#[async_trait]
impl ScriptSource for InlineScriptSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.scripts
            .get(url)
            .cloned()
            .ok_or_else(|| Error::ResourceUnavailable {
                resource: format!("script {}", url),
                reason: "not found".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inline_source() {
        let source = InlineScriptSource::new().with_script("mem://setup.sh", "echo ok");
        assert_eq!(source.fetch("mem://setup.sh").await.unwrap(), "echo ok");
        assert!(source.fetch("mem://other.sh").await.is_err());
    }

    #[tokio::test]
    async fn test_http_source_unreachable_is_download_error() {
        let source = HttpScriptSource::new().unwrap();
        let err = source.fetch("http://127.0.0.1:1/setup.sh").await.unwrap_err();
        assert!(matches!(err, Error::ScriptDownload(_)));
    }
}
