use std::sync::{Arc, Mutex};
use std::time::Duration;

use ovt_agents::demo::DEFAULT_INITIAL_BALANCE;
use ovt_agents::{
    AlphaModel, BacktestEngine, BacktestRunner, DemoRunner, MomentumAlpha, SignalBacktestEngine,
};
use ovt_models::config::TraderConfig;
use ovt_models::records::{BacktestRecord, DashboardData, DemoRunRecord, RunRecord};
use ovt_store::{HeadlineCache, RunStore, StoreError};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::{build_orchestrator, headline_cache, CollaboratorFactory};

/// Runs cycles, backtests and demos against the store's active config and
/// records every result.
///
/// The headline cache follows the active config: replacing or patching it
/// with a different `agents.news_cache_ttl_seconds` starts a fresh cache.
pub struct TradingService {
    store: Arc<RunStore>,
    factory: CollaboratorFactory,
    alpha: Arc<dyn AlphaModel>,
    engine: Arc<dyn BacktestEngine>,
    cache: Mutex<HeadlineCache>,
}

impl TradingService {
    pub fn new(store: Arc<RunStore>, factory: CollaboratorFactory) -> Self {
        let cache = match store.get_config() {
            Ok(config) => headline_cache(&config),
            Err(_) => headline_cache(&TraderConfig::default()),
        };
        Self {
            store,
            factory,
            alpha: Arc::new(MomentumAlpha),
            engine: Arc::new(SignalBacktestEngine),
            cache: Mutex::new(cache),
        }
    }

    fn headline_cache(&self) -> Result<HeadlineCache, StoreError> {
        self.cache
            .lock()
            .map(|cache| cache.clone())
            .map_err(|e| StoreError::Unavailable(format!("headline cache mutex poisoned: {e}")))
    }

    /// Swap in a new cache when the active config asks for another TTL.
    fn refresh_cache(&self, config: &TraderConfig) -> Result<(), StoreError> {
        let ttl = Duration::from_secs(config.agents.news_cache_ttl_seconds);
        let mut cache = self
            .cache
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("headline cache mutex poisoned: {e}")))?;
        if cache.ttl() != Some(ttl) {
            info!(ttl_seconds = ttl.as_secs(), "Rebuilding headline cache");
            *cache = headline_cache(config);
        }
        Ok(())
    }

    pub fn store(&self) -> &Arc<RunStore> {
        &self.store
    }

    /// The active config, or a merged copy when an override is given. An
    /// invalid override is rejected before anything runs.
    fn effective_config(
        &self,
        override_config: Option<&Value>,
    ) -> Result<TraderConfig, StoreError> {
        let config = self.store.get_config()?;
        match override_config {
            Some(patch) => Ok(config.merged(patch)?),
            None => Ok(config),
        }
    }

    pub async fn run_cycle(
        &self,
        notes: Option<String>,
        override_config: Option<&Value>,
    ) -> Result<RunRecord, StoreError> {
        let config = self.effective_config(override_config)?;
        let orchestrator = build_orchestrator(
            &config,
            &self.factory,
            self.alpha.clone(),
            self.headline_cache()?,
        );
        let record = orchestrator.run_cycle(&config, notes).await;
        info!(run_id = %record.id, status = ?record.status, "Cycle recorded");
        self.store.append_run(record.clone())?;
        Ok(record)
    }

    pub async fn run_backtest(
        &self,
        notes: Option<String>,
        override_config: Option<&Value>,
    ) -> Result<BacktestRecord, StoreError> {
        let config = self.effective_config(override_config)?;
        let runner = BacktestRunner::new(
            self.factory.build(&config).market_data,
            self.alpha.clone(),
            self.engine.clone(),
        );
        let record = runner.run_backtest(&config, notes).await;
        self.store.append_backtest(record.clone())?;
        Ok(record)
    }

    pub fn run_demo(
        &self,
        initial_balance: Option<f64>,
        notes: Option<String>,
    ) -> Result<DemoRunRecord, StoreError> {
        let config = self.store.get_config()?;
        let record = DemoRunner::new(self.alpha.clone()).run_demo(
            initial_balance.unwrap_or(DEFAULT_INITIAL_BALANCE),
            notes,
            &config,
        );
        self.store.append_demo(record.clone())?;
        Ok(record)
    }

    pub fn config(&self) -> Result<TraderConfig, StoreError> {
        self.store.get_config()
    }

    pub fn replace_config(&self, payload: Value) -> Result<TraderConfig, StoreError> {
        let config = self.store.replace_config_json(payload)?;
        self.refresh_cache(&config)?;
        Ok(config)
    }

    pub fn update_config(&self, patch: &Value) -> Result<TraderConfig, StoreError> {
        let config = self.store.update_config(patch)?;
        self.refresh_cache(&config)?;
        Ok(config)
    }

    pub fn runs(&self, limit: Option<usize>) -> Result<Vec<RunRecord>, StoreError> {
        self.store.list_runs(limit)
    }

    pub fn run(&self, id: Uuid) -> Result<Option<RunRecord>, StoreError> {
        self.store.get_run(id)
    }

    pub fn backtests(&self, limit: Option<usize>) -> Result<Vec<BacktestRecord>, StoreError> {
        self.store.list_backtests(limit)
    }

    pub fn dashboard(&self) -> Result<DashboardData, StoreError> {
        self.store.snapshot_dashboard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovt_agents::test_support::{trending_history, InMemoryMarketData, RecordingBridge};
    use ovt_agents::Collaborators;
    use ovt_models::records::RunStatus;
    use serde_json::json;

    fn service(collaborators: Collaborators) -> TradingService {
        let mut config = TraderConfig::default();
        config.data.instruments = vec!["UP".to_string(), "DOWN".to_string()];
        config.data.start_time = chrono::NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        TradingService::new(
            Arc::new(RunStore::new(config)),
            CollaboratorFactory::fixed(collaborators),
        )
    }

    fn market() -> Collaborators {
        let history = trending_history(&[("UP", 0.01), ("DOWN", -0.01)], 40);
        Collaborators {
            market_data: Some(Arc::new(InMemoryMarketData::new(history))),
            bridge: Some(Arc::new(RecordingBridge::default())),
            ..Collaborators::default()
        }
    }

    #[tokio::test]
    async fn cycles_are_stored() {
        let service = service(market());
        let record = service.run_cycle(Some("first".to_string()), None).await.unwrap();

        assert_eq!(record.status, RunStatus::Completed);
        let runs = service.runs(None).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, record.id);
        let stored = service.run(record.id).unwrap().unwrap();
        assert_eq!(stored.notes.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn override_applies_to_one_cycle_only() {
        let service = service(market());
        let patch = json!({"risk": {"position_limit": 0.05}});
        let record = service.run_cycle(None, Some(&patch)).await.unwrap();

        assert_eq!(record.config_snapshot.risk.position_limit, 0.05);
        assert_eq!(service.config().unwrap().risk.position_limit, 0.1);
    }

    #[tokio::test]
    async fn invalid_override_runs_nothing() {
        let service = service(market());
        let patch = json!({"risk": {"max_leverage": -1.0}});
        let err = service.run_cycle(None, Some(&patch)).await.unwrap_err();

        assert!(matches!(err, StoreError::Config(_)));
        assert!(service.runs(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_collaborators_still_record_a_run() {
        let service = service(Collaborators::default());
        let record = service.run_cycle(None, None).await.unwrap();

        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(service.dashboard().unwrap().metrics.total_runs, 1);
    }

    #[tokio::test]
    async fn backtest_failure_is_recorded() {
        let service = service(Collaborators::default());
        let record = service.run_backtest(None, None).await.unwrap();

        assert_eq!(record.status, RunStatus::Failed);
        assert!(record.error.is_some());
        assert_eq!(service.backtests(None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ttl_change_starts_a_fresh_cache() {
        let service = service(Collaborators::default());
        let before = service.headline_cache().unwrap();
        before.insert("wire".to_string(), vec!["Old".to_string()]).await;

        service
            .update_config(&json!({"risk": {"position_limit": 0.2}}))
            .unwrap();
        assert!(service.headline_cache().unwrap().get("wire").await.is_some());

        service
            .update_config(&json!({"agents": {"news_cache_ttl_seconds": 5}}))
            .unwrap();
        let after = service.headline_cache().unwrap();
        assert_eq!(after.ttl(), Some(Duration::from_secs(5)));
        assert_eq!(after.get("wire").await, None);
    }

    #[test]
    fn demo_defaults_to_hundred() {
        let service = service(Collaborators::default());
        let record = service.run_demo(None, Some("demo".to_string())).unwrap();

        assert_eq!(record.initial_balance, 100.0);
        assert_eq!(service.dashboard().unwrap().latest_demo.unwrap().id, record.id);
    }
}
