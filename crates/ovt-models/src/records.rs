use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent_output::MemoryEntry;
use crate::config::TraderConfig;
use crate::decision::Decision;
use crate::market::Order;
use crate::wallet::WalletPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// What happened to one agent during a cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentOutcome {
    Succeeded,
    Failed,
    /// Never ran because an earlier fatal fault stopped the cycle.
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentReport {
    pub agent_name: String,
    pub outcome: AgentOutcome,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Decision, orders and diagnostics of one cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub decision: Option<Decision>,
    pub orders: Vec<Order>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Immutable snapshot of one orchestrator cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub summary: RunSummary,
    pub shared_memory: Vec<MemoryEntry>,
    pub market_state: BTreeMap<String, serde_json::Value>,
    pub agent_reports: Vec<AgentReport>,
    pub duration_ms: u64,
    pub notes: Option<String>,
    pub config_snapshot: TraderConfig,
}

impl RunRecord {
    pub fn memory(&self, agent: &str) -> Option<&MemoryEntry> {
        self.shared_memory.iter().find(|e| e.agent == agent)
    }
}

/// Performance metrics plus the engine's opaque report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestResult {
    pub analysis: BTreeMap<String, f64>,
    pub report: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub notes: Option<String>,
    pub config_snapshot: TraderConfig,
    pub duration_ms: u64,
    pub result: Option<BacktestResult>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletSnapshot {
    pub label: String,
    pub starting_balance: f64,
    pub balance: f64,
    pub summary: String,
    pub history: Vec<WalletPoint>,
}

/// A per-date vector of values keyed by instrument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatedScores {
    pub date: NaiveDate,
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatedValue {
    pub date: NaiveDate,
    pub value: f64,
}

/// Result of the self-contained synthetic market scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DemoRunRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub notes: Option<String>,
    pub duration_ms: u64,
    pub initial_balance: f64,
    pub wallet: WalletSnapshot,
    /// Compounded return over the whole scenario.
    pub realized_return: f64,
    pub alpha: Vec<DatedScores>,
    pub weights: Vec<DatedScores>,
    pub portfolio_returns: Vec<DatedValue>,
    pub error: Option<String>,
    pub config_snapshot: TraderConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DashboardMetrics {
    pub total_runs: u64,
    pub total_backtests: u64,
    pub total_demos: u64,
}

/// Everything the dashboard renders in one payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardData {
    pub config: TraderConfig,
    pub latest_run: Option<RunRecord>,
    pub runs: Vec<RunRecord>,
    pub backtests: Vec<BacktestRecord>,
    pub latest_demo: Option<DemoRunRecord>,
    pub demos: Vec<DemoRunRecord>,
    pub metrics: DashboardMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serialization() {
        assert_eq!(
            serde_json::to_string(&RunStatus::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(
            serde_json::to_string(&AgentOutcome::Skipped).unwrap(),
            "\"skipped\""
        );
    }

    #[test]
    fn failed_backtest_has_no_result() {
        let record = BacktestRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            status: RunStatus::Failed,
            notes: None,
            config_snapshot: TraderConfig::default(),
            duration_ms: 3,
            result: None,
            error: Some("no price data".to_string()),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["result"].is_null());
        assert_eq!(json["error"], "no price data");
    }
}
