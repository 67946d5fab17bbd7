use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Serialize, de::DeserializeOwned};

use crate::config::HttpCfg;
use crate::error::{CoreResult, StratChatError};

/// A boxed stream of raw body chunks from a streaming response.
pub type ByteStream = std::pin::Pin<
    Box<dyn futures_util::stream::Stream<Item = CoreResult<bytes::Bytes>> + Send>,
>;

/// Thin wrapper around reqwest::Client with defaults and helpers.
///
/// Carries a cookie store: the backend keeps per-conversation chat memory in
/// a session cookie, so consecutive turns must replay it.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    user_agent: String,
    request_timeout: Duration,
}

impl HttpClient {
    pub fn new_default() -> CoreResult<Self> {
        Self::with_config(&HttpCfg::default())
    }

    pub fn with_config(cfg: &HttpCfg) -> CoreResult<Self> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .cookie_store(true);
        if let Some(cap) = cfg.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(cap);
        }
        let inner = builder
            .build()
            .map_err(|e| StratChatError::Other(anyhow::anyhow!("http client build failed: {e}")))?;
        Ok(Self {
            inner,
            user_agent: "stratchat/0.1".to_string(),
            request_timeout: Duration::from_millis(cfg.request_timeout_ms),
        })
    }

    pub async fn post_json<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &T,
    ) -> CoreResult<R> {
        let resp = self
            .inner
            .post(url)
            .json(body)
            .header("User-Agent", &self.user_agent)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| StratChatError::Transport {
                message: e.to_string(),
            })?;
        Self::read_json(resp).await
    }

    pub async fn get_json<R: DeserializeOwned>(&self, url: &str) -> CoreResult<R> {
        let resp = self
            .inner
            .get(url)
            .header("User-Agent", &self.user_agent)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| StratChatError::Transport {
                message: e.to_string(),
            })?;
        Self::read_json(resp).await
    }

    /// POST JSON and return the raw body as a chunk stream. No overall
    /// deadline is applied; the response stays open for the life of the
    /// chat turn.
    pub async fn post_stream<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> CoreResult<ByteStream> {
        let resp = self
            .inner
            .post(url)
            .json(body)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| StratChatError::Transport {
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        use futures_util::StreamExt;
        let stream = resp.bytes_stream().map(|item| {
            item.map_err(|e| StratChatError::Transport {
                message: e.to_string(),
            })
        });
        Ok(Box::pin(stream))
    }

    async fn read_json<R: DeserializeOwned>(resp: reqwest::Response) -> CoreResult<R> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(map_http_error(status, &text));
        }
        resp.json::<R>()
            .await
            .map_err(|e| StratChatError::Decode(format!("json decode error: {e}")))
    }
}

fn map_http_error(status: StatusCode, body: &str) -> StratChatError {
    StratChatError::Server {
        code: status.as_u16().to_string(),
        message: truncate(body, 300),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        let mut t = s[..end].to_string();
        t.push_str("...");
        t
    } else {
        s.to_string()
    }
}
