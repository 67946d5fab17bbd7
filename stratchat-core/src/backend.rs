//! The chat/strategy backend as a capability seam.
//!
//! [`HttpBackend`] speaks to the live REST backend; [`NullBackend`] is a
//! canned in-process double for tests and offline smoke runs.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::CoreResult;
use crate::http_client::{ByteStream, HttpClient};
use crate::model::{
    AckResponse, BacktestParams, ChatTurnRequest, DeleteStrategyRequest, GenerateStrategyRequest,
    GeneratedStrategy, NameCheckRequest, NameCheckResponse, StrategyListResponse, StrategyRecord,
};

#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &str;

    /// POST `/chat`; the response body is a `data: `-framed stream.
    async fn chat_stream(&self, message: &str) -> CoreResult<ByteStream>;

    /// POST `/clear_memory`; drops the conversation state server-side.
    async fn clear_memory(&self) -> CoreResult<AckResponse>;

    /// POST `/set_backtest_params` with the selected dropdown values.
    async fn set_backtest_params(&self, params: &BacktestParams) -> CoreResult<AckResponse>;

    /// POST `/generate_strategy` over the collected transcript.
    async fn generate_strategy(&self, chat_history: &str) -> CoreResult<GeneratedStrategy>;

    /// POST `/check_strategy_name`; true if the name is already taken.
    async fn check_strategy_name(&self, name: &str) -> CoreResult<bool>;

    /// POST `/save_strategy`; returns the updated list.
    async fn save_strategy(&self, record: &StrategyRecord) -> CoreResult<Vec<StrategyRecord>>;

    /// GET `/get_strategies`.
    async fn get_strategies(&self) -> CoreResult<Vec<StrategyRecord>>;

    /// POST `/delete_strategy`; returns the updated list.
    async fn delete_strategy(&self, name: &str) -> CoreResult<Vec<StrategyRecord>>;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: HttpClient,
    base: String,
    name: String,
}

impl HttpBackend {
    pub fn new(http: HttpClient, base: String) -> Self {
        Self {
            http,
            base,
            name: "http".into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat_stream(&self, message: &str) -> CoreResult<ByteStream> {
        let req = ChatTurnRequest {
            message: message.to_string(),
        };
        tracing::debug!(url = %self.url("/chat"), "starting chat stream");
        self.http.post_stream(&self.url("/chat"), &req).await
    }

    async fn clear_memory(&self) -> CoreResult<AckResponse> {
        self.http
            .post_json(&self.url("/clear_memory"), &serde_json::json!({}))
            .await
    }

    async fn set_backtest_params(&self, params: &BacktestParams) -> CoreResult<AckResponse> {
        self.http
            .post_json(&self.url("/set_backtest_params"), params)
            .await
    }

    async fn generate_strategy(&self, chat_history: &str) -> CoreResult<GeneratedStrategy> {
        let req = GenerateStrategyRequest {
            chat_history: chat_history.to_string(),
        };
        self.http.post_json(&self.url("/generate_strategy"), &req).await
    }

    async fn check_strategy_name(&self, name: &str) -> CoreResult<bool> {
        let req = NameCheckRequest {
            name: name.to_string(),
        };
        let resp: NameCheckResponse = self
            .http
            .post_json(&self.url("/check_strategy_name"), &req)
            .await?;
        Ok(resp.exists)
    }

    async fn save_strategy(&self, record: &StrategyRecord) -> CoreResult<Vec<StrategyRecord>> {
        let resp: StrategyListResponse =
            self.http.post_json(&self.url("/save_strategy"), record).await?;
        Ok(resp.strategies)
    }

    async fn get_strategies(&self) -> CoreResult<Vec<StrategyRecord>> {
        self.http.get_json(&self.url("/get_strategies")).await
    }

    async fn delete_strategy(&self, name: &str) -> CoreResult<Vec<StrategyRecord>> {
        let req = DeleteStrategyRequest {
            name: name.to_string(),
        };
        let resp: StrategyListResponse =
            self.http.post_json(&self.url("/delete_strategy"), &req).await?;
        Ok(resp.strategies)
    }
}

/// A dummy backend that always returns canned responses.
/// Useful for tests or as a placeholder.
pub struct NullBackend;

#[async_trait]
impl ChatBackend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    async fn chat_stream(&self, _message: &str) -> CoreResult<ByteStream> {
        // Deliberately split mid-line to exercise the decoder's tail carry.
        let chunks: Vec<CoreResult<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: [null ")),
            Ok(Bytes::from_static(b"backend response]\n")),
            Ok(Bytes::from_static(b"data: [DONE]\n")),
        ];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn clear_memory(&self) -> CoreResult<AckResponse> {
        Ok(AckResponse {
            message: "memory cleared".into(),
        })
    }

    async fn set_backtest_params(&self, params: &BacktestParams) -> CoreResult<AckResponse> {
        Ok(AckResponse {
            message: format!("params set: {} {}", params.instrument, params.timeframe),
        })
    }

    async fn generate_strategy(&self, _chat_history: &str) -> CoreResult<GeneratedStrategy> {
        Ok(GeneratedStrategy {
            strategy_summary: "[null strategy summary]".into(),
            strategy_json: "{}".into(),
        })
    }

    async fn check_strategy_name(&self, _name: &str) -> CoreResult<bool> {
        Ok(false)
    }

    async fn save_strategy(&self, record: &StrategyRecord) -> CoreResult<Vec<StrategyRecord>> {
        Ok(vec![record.clone()])
    }

    async fn get_strategies(&self) -> CoreResult<Vec<StrategyRecord>> {
        Ok(Vec::new())
    }

    async fn delete_strategy(&self, _name: &str) -> CoreResult<Vec<StrategyRecord>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use serde_json::json;

    fn backend(server: &MockServer) -> HttpBackend {
        HttpBackend::new(HttpClient::new_default().unwrap(), server.base_url())
    }

    #[tokio::test]
    async fn chat_stream_sends_message_and_streams_body() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST)
                .path("/chat")
                .json_body(json!({"message": "hello"}));
            then.status(200)
                .header("content-type", "text/event-stream")
                .body("data: Hello\ndata: World\ndata: [DONE]\n");
        });

        let b = backend(&server);
        let mut stream = b.chat_stream("hello").await.unwrap();
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(bytes, b"data: Hello\ndata: World\ndata: [DONE]\n");
        m.assert();
    }

    #[tokio::test]
    async fn clear_memory_acks() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST).path("/clear_memory");
            then.status(200)
                .json_body(json!({"message": "Memory cleared successfully"}));
        });
        let ack = backend(&server).clear_memory().await.unwrap();
        assert_eq!(ack.message, "Memory cleared successfully");
        m.assert();
    }

    #[tokio::test]
    async fn set_backtest_params_posts_both_fields() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST)
                .path("/set_backtest_params")
                .json_body(json!({"instrument": "BTC-USD", "timeframe": "4h"}));
            then.status(200)
                .json_body(json!({"status": "success", "message": "ok"}));
        });
        let ack = backend(&server)
            .set_backtest_params(&BacktestParams {
                instrument: "BTC-USD".into(),
                timeframe: "4h".into(),
            })
            .await
            .unwrap();
        assert_eq!(ack.message, "ok");
        m.assert();
    }

    #[tokio::test]
    async fn generate_strategy_round_trips() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST)
                .path("/generate_strategy")
                .json_body_partial(r#"{"chat_history": "u: hi"}"#);
            then.status(200).json_body(json!({
                "strategy_summary": "SMA crossover",
                "strategy_json": "{\"fast\":10}"
            }));
        });
        let generated = backend(&server).generate_strategy("u: hi").await.unwrap();
        assert_eq!(generated.strategy_summary, "SMA crossover");
        assert_eq!(generated.decoded().unwrap()["fast"], 10);
    }

    #[tokio::test]
    async fn check_strategy_name_unwraps_exists() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST)
                .path("/check_strategy_name")
                .json_body(json!({"name": "sma"}));
            then.status(200).json_body(json!({"exists": true}));
        });
        assert!(backend(&server).check_strategy_name("sma").await.unwrap());
    }

    #[tokio::test]
    async fn save_and_delete_return_updated_lists() {
        let server = MockServer::start();
        let record = StrategyRecord {
            name: "sma".into(),
            summary: "s".into(),
            json: "{}".into(),
        };
        let _save = server.mock(|when, then| {
            when.method(POST)
                .path("/save_strategy")
                .json_body(json!({"name": "sma", "summary": "s", "json": "{}"}));
            then.status(200).json_body(json!({
                "strategies": [{"name": "sma", "summary": "s", "json": "{}"}]
            }));
        });
        let _delete = server.mock(|when, then| {
            when.method(POST)
                .path("/delete_strategy")
                .json_body(json!({"name": "sma"}));
            then.status(200).json_body(json!({"strategies": []}));
        });

        let b = backend(&server);
        let after_save = b.save_strategy(&record).await.unwrap();
        assert_eq!(after_save.len(), 1);
        let after_delete = b.delete_strategy("sma").await.unwrap();
        assert!(after_delete.is_empty());
    }

    #[tokio::test]
    async fn get_strategies_decodes_bare_array() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(GET).path("/get_strategies");
            then.status(200)
                .json_body(json!([{"name": "a", "summary": "s", "json": "{}"}]));
        });
        let list = backend(&server).get_strategies().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "a");
    }

    #[tokio::test]
    async fn null_backend_streams_a_framed_response() {
        let mut stream = NullBackend.chat_stream("hi").await.unwrap();
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk.unwrap());
        }
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("data: "));
        assert!(text.ends_with("data: [DONE]\n"));
    }
}
