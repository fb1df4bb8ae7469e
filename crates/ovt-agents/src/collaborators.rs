//! Seams to the outside world. Every agent holds its collaborators as
//! `Option<Arc<dyn ...>>` and degrades when one is absent.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use ovt_models::market::{Order, PriceBar, PriceHistory};
use ovt_models::records::BacktestResult;

use crate::alpha::AlphaFrame;
use crate::error::AgentError;

#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Stable identifier, also used as the headline cache key.
    fn name(&self) -> &str;

    async fn fetch_headlines(&self) -> Result<Vec<String>, AgentError>;
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, AgentError>;
}

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Daily closes for `instruments` inside `[start, end]`.
    async fn load_history(
        &self,
        instruments: &[String],
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<PriceHistory, AgentError>;
}

#[async_trait]
pub trait ExecutionBridge: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<(), AgentError>;

    /// Submit one order. Returns the broker-side identifier.
    async fn submit(&self, order: &Order) -> Result<String, AgentError>;
}

/// Parameters a backtest engine needs beyond signals and prices.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestSettings {
    pub topk: usize,
    pub n_drop: usize,
    pub initial_cash: f64,
    pub benchmark: String,
    pub verbose: bool,
}

#[async_trait]
pub trait BacktestEngine: Send + Sync {
    async fn simulate(
        &self,
        signals: &AlphaFrame,
        prices: &PriceHistory,
        benchmark: Option<&[PriceBar]>,
        settings: &BacktestSettings,
    ) -> Result<BacktestResult, AgentError>;
}

/// The set of optional collaborators a cycle is built from.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub news: Option<Arc<dyn NewsSource>>,
    pub research_model: Option<Arc<dyn LanguageModel>>,
    pub forecasting_model: Option<Arc<dyn LanguageModel>>,
    pub market_data: Option<Arc<dyn MarketDataSource>>,
    pub bridge: Option<Arc<dyn ExecutionBridge>>,
}

/// Await `fut`, failing with `AgentError::Timeout` once `limit` elapses.
pub async fn with_timeout<T, F>(limit: Duration, label: &str, fut: F) -> Result<T, AgentError>
where
    F: Future<Output = Result<T, AgentError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| AgentError::Timeout(label.to_string(), limit.as_secs()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_timeout_passes_through_results() {
        let value = with_timeout(Duration::from_secs(1), "quick", async { Ok::<_, AgentError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn with_timeout_reports_label() {
        let err = with_timeout(Duration::from_millis(10), "slow feed", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, AgentError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AgentError::Timeout(ref label, _) if label == "slow feed"));
    }
}
