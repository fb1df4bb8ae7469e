//! End-to-end cycles over the standard four-agent pipeline with in-process
//! collaborators.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ovt_agents::alpha::{AlphaFrame, AlphaSignals};
use ovt_agents::test_support::{
    forecast_output, trending_history, InMemoryMarketData, RecordingBridge, StaticNewsSource,
};
use ovt_agents::{
    AgentError, AlphaModel, Collaborators, ExecutionBridge, MomentumAlpha, Orchestrator,
};
use ovt_models::agent_output::{AgentOutput, EXECUTION, FORECAST, NEWS_SENTIMENT, PORTFOLIO};
use ovt_models::config::TraderConfig;
use ovt_models::decision::Action;
use ovt_models::market::{PriceHistory, Side};
use ovt_models::records::{AgentOutcome, DatedScores, RunStatus};
use ovt_store::HeadlineCache;
use rust_decimal_macros::dec;
use serde_json::json;

/// Scores every cycle with the same fixed values.
struct FixedAlpha(Vec<(&'static str, f64)>);

impl AlphaModel for FixedAlpha {
    fn name(&self) -> &str {
        "fixed"
    }

    fn generate(&self, _history: &PriceHistory) -> Result<AlphaSignals, AgentError> {
        let forecast = forecast_output(&self.0);
        let latest = forecast
            .snapshot
            .iter()
            .map(|(symbol, features)| (symbol.clone(), (*features, forecast.scores[symbol])))
            .collect();
        Ok(AlphaSignals {
            frame: AlphaFrame {
                rows: vec![DatedScores {
                    date: forecast.as_of.unwrap_or_default(),
                    values: forecast.scores.clone(),
                }],
            },
            latest,
            skipped: Vec::new(),
        })
    }
}

fn config(instruments: &[&str]) -> TraderConfig {
    let mut config = TraderConfig::default();
    config.data.instruments = instruments.iter().map(|s| s.to_string()).collect();
    config.data.start_time = chrono::NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    config.data.end_time = None;
    config
}

fn cache() -> HeadlineCache {
    HeadlineCache::new(16, Duration::from_secs(60))
}

fn collaborators(history: PriceHistory, bridge: Option<Arc<RecordingBridge>>) -> Collaborators {
    Collaborators {
        news: Some(Arc::new(StaticNewsSource::new(&["Chipmakers rally"]))),
        market_data: Some(Arc::new(InMemoryMarketData::new(history))),
        bridge: bridge.map(|b| b as Arc<dyn ExecutionBridge>),
        ..Collaborators::default()
    }
}

#[tokio::test]
async fn full_cycle_writes_one_entry_per_agent() {
    let history = trending_history(&[("UP", 0.01), ("DOWN", -0.01)], 40);
    let bridge = Arc::new(RecordingBridge::default());
    let orchestrator = Orchestrator::standard(
        &collaborators(history, Some(bridge.clone())),
        Arc::new(MomentumAlpha),
        cache(),
    );
    let cfg = config(&["UP", "DOWN"]);
    let record = orchestrator.run_cycle(&cfg, Some("nightly".to_string())).await;

    assert_eq!(record.status, RunStatus::Completed, "{:?}", record.summary.errors);
    let agents: Vec<&str> = record.shared_memory.iter().map(|e| e.agent.as_str()).collect();
    assert_eq!(agents, vec![NEWS_SENTIMENT, FORECAST, PORTFOLIO, EXECUTION]);
    assert!(record
        .agent_reports
        .iter()
        .all(|r| r.outcome == AgentOutcome::Succeeded));

    assert_eq!(record.config_snapshot.risk.position_limit, 0.1);
    assert_eq!(record.notes.as_deref(), Some("nightly"));
    assert!(record.market_state.contains_key("alpha"));
    assert_eq!(bridge.submitted().len(), record.summary.orders.len());
    assert!(!record.summary.orders.is_empty());
}

#[tokio::test]
async fn forecast_failure_stops_the_cycle() {
    let collaborators = Collaborators {
        bridge: Some(Arc::new(RecordingBridge::default())),
        ..Collaborators::default()
    };
    let orchestrator = Orchestrator::standard(&collaborators, Arc::new(MomentumAlpha), cache());
    let record = orchestrator.run_cycle(&config(&["UP"]), None).await;

    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.summary.orders.is_empty());
    assert!(record.summary.decision.is_none());
    assert_eq!(record.summary.errors.len(), 1);
    assert!(record.summary.errors[0].starts_with("Forecast:"));
    assert!(matches!(
        record.memory(FORECAST).unwrap().output,
        AgentOutput::Fault { .. }
    ));

    let outcomes: Vec<AgentOutcome> = record.agent_reports.iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            AgentOutcome::Succeeded,
            AgentOutcome::Failed,
            AgentOutcome::Skipped,
            AgentOutcome::Skipped
        ]
    );
}

#[tokio::test]
async fn missing_bridge_keeps_orders() {
    let history = trending_history(&[("UP", 0.01)], 40);
    let orchestrator = Orchestrator::standard(
        &collaborators(history, None),
        Arc::new(MomentumAlpha),
        cache(),
    );
    let record = orchestrator.run_cycle(&config(&["UP"]), None).await;

    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.summary.orders.len(), 1);
    assert_eq!(
        record.summary.errors,
        vec!["Execution: execution bridge unavailable"]
    );
    match &record.memory(EXECUTION).unwrap().output {
        AgentOutput::Execution(out) => assert!(!out.bridge_available),
        other => panic!("unexpected execution entry: {other:?}"),
    }
}

#[tokio::test]
async fn strong_signal_buys_up_to_position_limit() {
    let history = trending_history(&[("TEST", 0.0)], 5);
    let bridge = Arc::new(RecordingBridge::default());
    let orchestrator = Orchestrator::standard(
        &collaborators(history, Some(bridge.clone())),
        Arc::new(FixedAlpha(vec![("TEST", 0.8)])),
        cache(),
    );
    let mut cfg = config(&["TEST"]);
    cfg.risk.position_limit = 0.5;
    let record = orchestrator.run_cycle(&cfg, None).await;

    assert_eq!(record.status, RunStatus::Completed, "{:?}", record.summary.errors);
    let decision = record
        .summary
        .decision
        .as_ref()
        .and_then(|d| d.as_structured())
        .unwrap();
    assert_eq!(decision.symbol, "TEST");
    assert_eq!(decision.action, Action::Buy);
    assert_eq!(decision.target_weight, 0.5);

    assert_eq!(record.summary.orders.len(), 1);
    let order = &record.summary.orders[0];
    assert_eq!(order.symbol, "TEST");
    assert_eq!(order.side, Side::Buy);
    assert_eq!(order.quantity, dec!(0.5));
    assert_eq!(bridge.submitted().len(), 1);
}

#[tokio::test]
async fn held_positions_need_no_orders() {
    let history = trending_history(&[("TEST", 0.0)], 5);
    let orchestrator = Orchestrator::standard(
        &collaborators(history, Some(Arc::new(RecordingBridge::default()))),
        Arc::new(FixedAlpha(vec![("TEST", 0.8)])),
        cache(),
    );
    let mut cfg = config(&["TEST"]);
    cfg.risk.position_limit = 0.5;
    let market_state = BTreeMap::from([("positions".to_string(), json!({"TEST": 0.5}))]);
    let record = orchestrator.resume_cycle(&cfg, market_state, None).await;

    assert_eq!(record.status, RunStatus::Completed);
    assert!(record.summary.orders.is_empty());
    assert_eq!(record.market_state["positions"]["TEST"], json!(0.5));
}

#[tokio::test]
async fn orders_never_exceed_position_limit() {
    let history = trending_history(&[("A", 0.0), ("B", 0.0)], 5);
    let orchestrator = Orchestrator::standard(
        &collaborators(history, Some(Arc::new(RecordingBridge::default()))),
        Arc::new(FixedAlpha(vec![("A", 0.25), ("B", 0.75)])),
        cache(),
    );
    let record = orchestrator.run_cycle(&config(&["A", "B"]), None).await;

    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.summary.orders.len(), 2);
    for order in &record.summary.orders {
        assert_eq!(order.side, Side::Buy);
        assert!(order.quantity <= dec!(0.1), "{} over limit", order.symbol);
    }
    match &record.memory(PORTFOLIO).unwrap().output {
        AgentOutput::Portfolio(out) => {
            assert_eq!(out.targets["A"].raw_weight, 0.25);
            assert_eq!(out.targets["A"].weight, 0.1);
        }
        other => panic!("unexpected portfolio entry: {other:?}"),
    }
}

#[tokio::test]
async fn stale_alpha_is_replaced_on_resume() {
    let history = trending_history(&[("UP", 0.01)], 40);
    let orchestrator = Orchestrator::standard(
        &collaborators(history, Some(Arc::new(RecordingBridge::default()))),
        Arc::new(MomentumAlpha),
        cache(),
    );
    let market_state = BTreeMap::from([("alpha".to_string(), json!({"UP": -9.0}))]);
    let record = orchestrator
        .resume_cycle(&config(&["UP"]), market_state, None)
        .await;

    assert_eq!(record.status, RunStatus::Completed, "{:?}", record.summary.errors);
    let scores = match &record.memory(FORECAST).unwrap().output {
        AgentOutput::Forecast(out) => out.scores.clone(),
        other => panic!("unexpected forecast entry: {other:?}"),
    };
    assert!(scores["UP"] > 0.0);
    assert_eq!(record.market_state["alpha"]["UP"], json!(scores["UP"]));
    assert!(record
        .summary
        .warnings
        .iter()
        .all(|w| !w.contains("already set")));
}
