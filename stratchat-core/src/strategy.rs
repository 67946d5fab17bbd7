//! Strategy workflow: generate from the transcript, find a free name,
//! persist, and return the refreshed list.

use crate::backend::ChatBackend;
use crate::error::{CoreResult, StratChatError};
use crate::model::StrategyRecord;
use crate::normalize;

/// Probe ceiling for numeric name suffixes.
const MAX_NAME_PROBES: u32 = 100;

/// Outcome of [`generate_and_save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedStrategy {
    /// The name the strategy was actually saved under (may carry a numeric
    /// suffix when the requested one was taken).
    pub name: String,
    /// The list as returned by the backend after the save.
    pub strategies: Vec<StrategyRecord>,
}

/// Resolve a free name by probing the backend: `base`, then `base-2`,
/// `base-3`, … Exhausting the probe ceiling is a validation error.
pub async fn unique_name<B>(backend: &B, requested: &str) -> CoreResult<String>
where
    B: ChatBackend + ?Sized,
{
    let base = normalize::normalize_strategy_name(requested)?;
    if !backend.check_strategy_name(&base).await? {
        return Ok(base);
    }
    for n in 2..=MAX_NAME_PROBES {
        let candidate = format!("{base}-{n}");
        if !backend.check_strategy_name(&candidate).await? {
            return Ok(candidate);
        }
    }
    Err(StratChatError::Validation(format!(
        "no free name found for '{base}' after {MAX_NAME_PROBES} probes"
    )))
}

/// Generate a strategy from `chat_history`, validate its double-encoded
/// JSON, save it under a free variant of `requested_name`.
pub async fn generate_and_save<B>(
    backend: &B,
    chat_history: &str,
    requested_name: &str,
) -> CoreResult<SavedStrategy>
where
    B: ChatBackend + ?Sized,
{
    let generated = backend.generate_strategy(chat_history).await?;
    // Reject malformed payloads before they reach the saved list.
    generated.decoded()?;

    let name = unique_name(backend, requested_name).await?;
    let record = StrategyRecord {
        name: name.clone(),
        summary: generated.strategy_summary,
        json: generated.strategy_json,
    };
    let strategies = backend.save_strategy(&record).await?;
    tracing::info!(name = %name, total = strategies.len(), "strategy saved");
    Ok(SavedStrategy { name, strategies })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use crate::error::CoreResult;
    use crate::http_client::ByteStream;
    use crate::model::{AckResponse, BacktestParams, GeneratedStrategy};

    /// Stateful in-memory backend for workflow tests.
    struct MemoryBackend {
        taken: Mutex<HashSet<String>>,
        strategy_json: &'static str,
    }

    impl MemoryBackend {
        fn with_taken(names: &[&str]) -> Self {
            Self {
                taken: Mutex::new(names.iter().map(|s| s.to_string()).collect()),
                strategy_json: r#"{"fast":10,"slow":50}"#,
            }
        }
    }

    #[async_trait]
    impl ChatBackend for MemoryBackend {
        fn name(&self) -> &str {
            "memory"
        }

        async fn chat_stream(&self, _message: &str) -> CoreResult<ByteStream> {
            unimplemented!()
        }
        async fn clear_memory(&self) -> CoreResult<AckResponse> {
            unimplemented!()
        }
        async fn set_backtest_params(&self, _p: &BacktestParams) -> CoreResult<AckResponse> {
            unimplemented!()
        }

        async fn generate_strategy(&self, _h: &str) -> CoreResult<GeneratedStrategy> {
            Ok(GeneratedStrategy {
                strategy_summary: "SMA crossover".into(),
                strategy_json: self.strategy_json.into(),
            })
        }

        async fn check_strategy_name(&self, name: &str) -> CoreResult<bool> {
            Ok(self.taken.lock().unwrap().contains(name))
        }

        async fn save_strategy(&self, record: &StrategyRecord) -> CoreResult<Vec<StrategyRecord>> {
            self.taken.lock().unwrap().insert(record.name.clone());
            Ok(vec![record.clone()])
        }

        async fn get_strategies(&self) -> CoreResult<Vec<StrategyRecord>> {
            Ok(Vec::new())
        }
        async fn delete_strategy(&self, _n: &str) -> CoreResult<Vec<StrategyRecord>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn free_name_is_used_as_is() {
        let backend = MemoryBackend::with_taken(&[]);
        assert_eq!(unique_name(&backend, " sma ").await.unwrap(), "sma");
    }

    #[tokio::test]
    async fn taken_name_gets_a_numeric_suffix() {
        let backend = MemoryBackend::with_taken(&["sma", "sma-2"]);
        assert_eq!(unique_name(&backend, "sma").await.unwrap(), "sma-3");
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let backend = MemoryBackend::with_taken(&[]);
        let err = unique_name(&backend, "  ").await.unwrap_err();
        assert!(matches!(err, StratChatError::Validation(_)));
    }

    #[tokio::test]
    async fn generate_and_save_persists_under_free_name() {
        let backend = MemoryBackend::with_taken(&["sma"]);
        let saved = generate_and_save(&backend, "u: make me one", "sma")
            .await
            .unwrap();
        assert_eq!(saved.name, "sma-2");
        assert_eq!(saved.strategies.len(), 1);
        assert_eq!(saved.strategies[0].summary, "SMA crossover");
        assert!(backend.check_strategy_name("sma-2").await.unwrap());
    }

    #[tokio::test]
    async fn malformed_strategy_json_is_rejected_before_save() {
        let backend = MemoryBackend {
            taken: Mutex::new(HashSet::new()),
            strategy_json: "{broken",
        };
        let err = generate_and_save(&backend, "history", "sma").await.unwrap_err();
        assert!(matches!(err, StratChatError::Decode(_)));
        assert!(!backend.check_strategy_name("sma").await.unwrap());
    }
}
