use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ovt_models::agent_output::{AgentOutput, ForecastOutput, FORECAST};
use tracing::{info, warn};

use crate::agent::Agent;
use crate::alpha::AlphaModel;
use crate::collaborators::{with_timeout, LanguageModel, MarketDataSource};
use crate::context::SharedContext;
use crate::error::AgentError;
use crate::prompts::{commentary_prompt, commentary_system_prompt};

/// Loads history for the configured universe and scores it with the alpha
/// model. Without market data it fails, and that failure stops the cycle.
pub struct ForecastAgent {
    market_data: Option<Arc<dyn MarketDataSource>>,
    model: Arc<dyn AlphaModel>,
    commentary: Option<Arc<dyn LanguageModel>>,
}

impl ForecastAgent {
    pub fn new(
        market_data: Option<Arc<dyn MarketDataSource>>,
        model: Arc<dyn AlphaModel>,
        commentary: Option<Arc<dyn LanguageModel>>,
    ) -> Self {
        Self {
            market_data,
            model,
            commentary,
        }
    }
}

#[async_trait]
impl Agent for ForecastAgent {
    fn name(&self) -> &str {
        FORECAST
    }

    async fn run(&self, ctx: &mut SharedContext) -> Result<(), AgentError> {
        let source = self
            .market_data
            .as_ref()
            .ok_or_else(|| AgentError::Unavailable("market data source".to_string()))?;

        let data = ctx.config().data.clone();
        let limit = Duration::from_secs(data.timeout_seconds);
        let history = with_timeout(
            limit,
            "market data",
            source.load_history(&data.instruments, data.start_time, data.end_time),
        )
        .await?;
        if history.is_empty() {
            return Err(AgentError::Data(
                "no price history for configured instruments".to_string(),
            ));
        }

        let signals = self.model.generate(&history)?;
        if !signals.skipped.is_empty() {
            ctx.append_warning(format!(
                "{FORECAST}: insufficient history for {}",
                signals.skipped.join(", ")
            ));
        }

        let scores = signals.latest_scores();
        let top_n = ctx.config().agents.top_n;
        let mut ranked: Vec<(&String, f64)> = scores.iter().map(|(s, v)| (s, *v)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        let snapshot: BTreeMap<_, _> = ranked
            .iter()
            .take(top_n)
            .filter_map(|(symbol, _)| {
                signals
                    .latest
                    .get(*symbol)
                    .map(|(features, _)| ((*symbol).clone(), *features))
            })
            .collect();

        let commentary = match &self.commentary {
            None => None,
            Some(model) => {
                let limit = ctx
                    .config()
                    .llm_forecasting
                    .as_ref()
                    .map_or(ctx.config().llm_research.timeout_seconds, |c| c.timeout_seconds);
                let reply = with_timeout(
                    Duration::from_secs(limit),
                    "forecast commentary model",
                    model.complete(&commentary_system_prompt(), &commentary_prompt(&scores, top_n)),
                )
                .await;
                match reply {
                    Ok(text) => Some(text.trim().to_string()),
                    Err(e) => {
                        warn!(model = model.model(), error = %e, "Forecast commentary failed");
                        ctx.append_warning(format!("{FORECAST}: commentary model failed: {e}"));
                        None
                    }
                }
            }
        };

        info!(
            model = self.model.name(),
            instruments = scores.len(),
            as_of = ?signals.as_of(),
            "Alpha scores generated"
        );

        for (key, value) in [
            ("alpha", serde_json::to_value(&scores)?),
            ("market_data", serde_json::to_value(&snapshot)?),
        ] {
            if !ctx.insert_market(key, value) {
                warn!(key, "Market state already set, keeping existing value");
                ctx.append_warning(format!("{FORECAST}: market state `{key}` already set"));
            }
        }
        ctx.write(
            FORECAST,
            AgentOutput::Forecast(ForecastOutput {
                scores,
                as_of: signals.as_of(),
                snapshot,
                commentary,
            }),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alpha::MomentumAlpha;
    use crate::test_support::{trending_history, InMemoryMarketData, ScriptedModel};
    use ovt_models::config::TraderConfig;

    fn config(instruments: &[&str]) -> TraderConfig {
        let mut config = TraderConfig::default();
        config.data.instruments = instruments.iter().map(|s| s.to_string()).collect();
        config.data.start_time = chrono::NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        config
    }

    #[tokio::test]
    async fn missing_source_is_unavailable() {
        let agent = ForecastAgent::new(None, Arc::new(MomentumAlpha), None);
        let mut ctx = SharedContext::new(config(&["AAPL"]));
        let err = agent.run(&mut ctx).await.unwrap_err();
        assert!(matches!(err, AgentError::Unavailable(_)));
        assert!(ctx.forecast().is_none());
    }

    #[tokio::test]
    async fn writes_scores_and_market_state() {
        let history = trending_history(&[("UP", 0.01), ("DOWN", -0.01)], 40);
        let agent = ForecastAgent::new(
            Some(Arc::new(InMemoryMarketData::new(history))),
            Arc::new(MomentumAlpha),
            None,
        );
        let mut ctx = SharedContext::new(config(&["UP", "DOWN"]));
        agent.run(&mut ctx).await.unwrap();

        let forecast = ctx.forecast().unwrap();
        assert!(forecast.scores["UP"] > forecast.scores["DOWN"]);
        assert_eq!(forecast.snapshot.len(), 2);
        assert!(forecast.as_of.is_some());
        assert!(ctx.market("alpha").unwrap()["UP"].is_number());
        assert!(ctx.market("market_data").unwrap()["DOWN"]["close"].is_number());
    }

    #[tokio::test]
    async fn commentary_failure_is_a_warning() {
        let history = trending_history(&[("UP", 0.01)], 30);
        let agent = ForecastAgent::new(
            Some(Arc::new(InMemoryMarketData::new(history))),
            Arc::new(MomentumAlpha),
            Some(Arc::new(ScriptedModel::failing())),
        );
        let mut ctx = SharedContext::new(config(&["UP"]));
        agent.run(&mut ctx).await.unwrap();

        assert!(ctx.forecast().unwrap().commentary.is_none());
        assert!(ctx.warnings()[0].contains("commentary model failed"));
    }

    #[tokio::test]
    async fn short_history_is_a_data_error() {
        let history = trending_history(&[("UP", 0.01)], 10);
        let agent = ForecastAgent::new(
            Some(Arc::new(InMemoryMarketData::new(history))),
            Arc::new(MomentumAlpha),
            None,
        );
        let mut ctx = SharedContext::new(config(&["UP"]));
        let err = agent.run(&mut ctx).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
