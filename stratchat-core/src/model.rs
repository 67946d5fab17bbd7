use serde::{Deserialize, Serialize};

use crate::error::{CoreResult, StratChatError};

/// Request body for `POST /chat`. The response is a `data: `-framed stream,
/// not JSON; see `sse`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatTurnRequest {
    pub message: String,
}

/// Generic `{message}` acknowledgement returned by `/clear_memory` and
/// `/set_backtest_params`. Extra fields the backend may add are ignored.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AckResponse {
    pub message: String,
}

/// Selected dropdown values posted to `/set_backtest_params`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BacktestParams {
    pub instrument: String,
    pub timeframe: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GenerateStrategyRequest {
    pub chat_history: String,
}

/// Response of `POST /generate_strategy`.
///
/// `strategy_json` is double-encoded: a JSON string whose contents are
/// themselves JSON. Use [`decode_strategy_json`] before displaying it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GeneratedStrategy {
    pub strategy_summary: String,
    pub strategy_json: String,
}

impl GeneratedStrategy {
    pub fn decoded(&self) -> CoreResult<serde_json::Value> {
        decode_strategy_json(&self.strategy_json)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct NameCheckRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct NameCheckResponse {
    pub exists: bool,
}

/// One persisted strategy as returned by `/get_strategies` and the list
/// responses of `/save_strategy` / `/delete_strategy`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StrategyRecord {
    pub name: String,
    pub summary: String,
    pub json: String,
}

impl StrategyRecord {
    pub fn decoded(&self) -> CoreResult<serde_json::Value> {
        decode_strategy_json(&self.json)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DeleteStrategyRequest {
    pub name: String,
}

/// List wrapper returned by the mutating strategy endpoints.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StrategyListResponse {
    pub strategies: Vec<StrategyRecord>,
}

/// Parse the inner layer of a double-encoded strategy payload.
pub fn decode_strategy_json(encoded: &str) -> CoreResult<serde_json::Value> {
    serde_json::from_str(encoded)
        .map_err(|e| StratChatError::Decode(format!("strategy json: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_turn_request_roundtrip() {
        let req = ChatTurnRequest {
            message: "What is a moving average?".to_string(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"message\""));
        let de: ChatTurnRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req, de);
    }

    #[test]
    fn ack_ignores_extra_fields() {
        let ack: AckResponse =
            serde_json::from_str(r#"{"status":"success","message":"ok"}"#).unwrap();
        assert_eq!(ack.message, "ok");
    }

    #[test]
    fn backtest_params_roundtrip() {
        let p = BacktestParams {
            instrument: "BTC-USD".into(),
            timeframe: "1h".into(),
        };
        let json = serde_json::to_string(&p).unwrap();
        let de: BacktestParams = serde_json::from_str(&json).unwrap();
        assert_eq!(p, de);
    }

    #[test]
    fn strategy_json_is_double_encoded() {
        let generated: GeneratedStrategy = serde_json::from_str(
            r#"{"strategy_summary":"SMA crossover","strategy_json":"{\"fast\":10,\"slow\":50}"}"#,
        )
        .unwrap();
        let value = generated.decoded().unwrap();
        assert_eq!(value["fast"], 10);
        assert_eq!(value["slow"], 50);
    }

    #[test]
    fn malformed_inner_json_is_a_decode_error() {
        let err = decode_strategy_json("{not json").unwrap_err();
        assert!(matches!(err, StratChatError::Decode(_)));
    }

    #[test]
    fn strategy_list_roundtrip() {
        let json = r#"{"strategies":[{"name":"a","summary":"s","json":"{}"}]}"#;
        let list: StrategyListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(list.strategies.len(), 1);
        assert_eq!(list.strategies[0].name, "a");
        assert_eq!(list.strategies[0].decoded().unwrap(), serde_json::json!({}));
    }
}
