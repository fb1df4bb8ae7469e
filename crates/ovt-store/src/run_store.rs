use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use ovt_models::config::TraderConfig;
use ovt_models::records::{
    BacktestRecord, DashboardData, DashboardMetrics, DemoRunRecord, RunRecord,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;

/// How much history the store keeps and how much the dashboard shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    pub max_runs: usize,
    pub max_backtests: usize,
    pub max_demos: usize,
    pub dashboard_runs: usize,
    pub dashboard_backtests: usize,
    pub dashboard_demos: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            max_runs: 50,
            max_backtests: 20,
            max_demos: 10,
            dashboard_runs: 10,
            dashboard_backtests: 5,
            dashboard_demos: 5,
        }
    }
}

struct Inner {
    config: TraderConfig,
    runs: VecDeque<RunRecord>,
    backtests: VecDeque<BacktestRecord>,
    demos: VecDeque<DemoRunRecord>,
    metrics: DashboardMetrics,
}

/// Process-lifetime history of run, backtest and demo records plus the
/// active configuration.
///
/// All state sits behind one `Mutex`, so appends and snapshots never
/// interleave. Every read hands out clones. History is newest-first and
/// bounded; the metrics count every append since construction.
pub struct RunStore {
    inner: Mutex<Inner>,
    limits: HistoryLimits,
}

impl RunStore {
    pub fn new(config: TraderConfig) -> Self {
        Self::with_limits(config, HistoryLimits::default())
    }

    pub fn with_limits(config: TraderConfig, limits: HistoryLimits) -> Self {
        Self {
            inner: Mutex::new(Inner {
                config,
                runs: VecDeque::new(),
                backtests: VecDeque::new(),
                demos: VecDeque::new(),
                metrics: DashboardMetrics::default(),
            }),
            limits,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("run store mutex poisoned: {e}")))
    }

    pub fn append_run(&self, record: RunRecord) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        debug!(run_id = %record.id, status = ?record.status, "Storing run");
        push_bounded(&mut inner.runs, record, self.limits.max_runs);
        inner.metrics.total_runs += 1;
        Ok(())
    }

    pub fn append_backtest(&self, record: BacktestRecord) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        debug!(backtest_id = %record.id, status = ?record.status, "Storing backtest");
        push_bounded(&mut inner.backtests, record, self.limits.max_backtests);
        inner.metrics.total_backtests += 1;
        Ok(())
    }

    pub fn append_demo(&self, record: DemoRunRecord) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        debug!(demo_id = %record.id, "Storing demo");
        push_bounded(&mut inner.demos, record, self.limits.max_demos);
        inner.metrics.total_demos += 1;
        Ok(())
    }

    pub fn get_config(&self) -> Result<TraderConfig, StoreError> {
        Ok(self.lock()?.config.clone())
    }

    /// Swap in a whole new config. Nothing changes if it fails validation.
    pub fn replace_config(&self, config: TraderConfig) -> Result<TraderConfig, StoreError> {
        config.validate()?;
        let mut inner = self.lock()?;
        inner.config = config;
        info!("Configuration replaced");
        Ok(inner.config.clone())
    }

    /// Replace the config from an untyped payload that must carry every
    /// required section.
    pub fn replace_config_json(
        &self,
        payload: serde_json::Value,
    ) -> Result<TraderConfig, StoreError> {
        let config = TraderConfig::from_json(payload)?;
        self.replace_config(config)
    }

    /// Deep-merge a partial payload into the current config and replace it.
    pub fn update_config(&self, patch: &serde_json::Value) -> Result<TraderConfig, StoreError> {
        let mut inner = self.lock()?;
        let merged = inner.config.merged(patch)?;
        inner.config = merged;
        info!("Configuration updated");
        Ok(inner.config.clone())
    }

    pub fn list_runs(&self, limit: Option<usize>) -> Result<Vec<RunRecord>, StoreError> {
        Ok(take(&self.lock()?.runs, limit))
    }

    pub fn get_run(&self, id: Uuid) -> Result<Option<RunRecord>, StoreError> {
        Ok(self.lock()?.runs.iter().find(|r| r.id == id).cloned())
    }

    pub fn latest_run(&self) -> Result<Option<RunRecord>, StoreError> {
        Ok(self.lock()?.runs.front().cloned())
    }

    pub fn list_backtests(&self, limit: Option<usize>) -> Result<Vec<BacktestRecord>, StoreError> {
        Ok(take(&self.lock()?.backtests, limit))
    }

    pub fn list_demos(&self, limit: Option<usize>) -> Result<Vec<DemoRunRecord>, StoreError> {
        Ok(take(&self.lock()?.demos, limit))
    }

    pub fn latest_demo(&self) -> Result<Option<DemoRunRecord>, StoreError> {
        Ok(self.lock()?.demos.front().cloned())
    }

    pub fn metrics(&self) -> Result<DashboardMetrics, StoreError> {
        Ok(self.lock()?.metrics)
    }

    /// Consistent view of the whole store taken under a single lock.
    pub fn snapshot_dashboard(&self) -> Result<DashboardData, StoreError> {
        let inner = self.lock()?;
        Ok(DashboardData {
            config: inner.config.clone(),
            latest_run: inner.runs.front().cloned(),
            runs: take(&inner.runs, Some(self.limits.dashboard_runs)),
            backtests: take(&inner.backtests, Some(self.limits.dashboard_backtests)),
            latest_demo: inner.demos.front().cloned(),
            demos: take(&inner.demos, Some(self.limits.dashboard_demos)),
            metrics: inner.metrics,
        })
    }
}

fn push_bounded<T>(history: &mut VecDeque<T>, record: T, max: usize) {
    history.push_front(record);
    history.truncate(max);
}

fn take<T: Clone>(history: &VecDeque<T>, limit: Option<usize>) -> Vec<T> {
    let limit = limit.unwrap_or(history.len());
    history.iter().take(limit).cloned().collect()
}
