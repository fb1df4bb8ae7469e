use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sections a config payload must carry before it is even deserialized.
pub const REQUIRED_SECTIONS: [&str; 2] = ["data", "llm_research"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("missing required config section: {0}")]
    MissingSection(String),

    #[error("config payload must be a JSON object")]
    NotAnObject,

    #[error("malformed config: {0}")]
    Malformed(String),

    #[error("invalid config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Top-level configuration for the trading system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraderConfig {
    pub data: DataConfig,
    pub llm_research: LlmConfig,
    #[serde(default)]
    pub llm_forecasting: Option<LlmConfig>,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
}

impl Default for TraderConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            llm_research: LlmConfig::default(),
            llm_forecasting: None,
            execution: ExecutionConfig::default(),
            risk: RiskConfig::default(),
            backtest: BacktestConfig::default(),
            agents: AgentsConfig::default(),
        }
    }
}

/// Market data location and universe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataConfig {
    /// Directory holding one `<INSTRUMENT>.csv` price file per instrument.
    pub data_root: String,
    #[serde(default = "default_calendar")]
    pub calendar: String,
    #[serde(default = "default_instruments")]
    pub instruments: Vec<String>,
    #[serde(default = "default_data_start")]
    pub start_time: NaiveDate,
    #[serde(default)]
    pub end_time: Option<NaiveDate>,
    #[serde(default)]
    pub auto_update: bool,
    /// Upper bound for one history load.
    #[serde(default = "default_data_timeout")]
    pub timeout_seconds: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_root: "data/prices".to_string(),
            calendar: default_calendar(),
            instruments: default_instruments(),
            start_time: default_data_start(),
            end_time: None,
            auto_update: false,
            timeout_seconds: default_data_timeout(),
        }
    }
}

/// Settings for one language model used inside the agent network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    /// Provider identifier, e.g. `"claude-cli"` or `"openai"`.
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "claude-cli".to_string(),
            model: "claude-3-5-haiku-latest".to_string(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_llm_timeout(),
        }
    }
}

/// How orders leave the process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// No bridge installed. Orders are produced but never submitted.
    #[default]
    Disabled,
    /// In-process paper bridge that acknowledges every order.
    Paper,
}

/// Settings for the brokerage execution bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_account_aliases")]
    pub account_aliases: Vec<String>,
    #[serde(default = "default_execution_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            server_host: default_server_host(),
            server_port: default_server_port(),
            client_id: default_client_id(),
            account_aliases: default_account_aliases(),
            timeout_seconds: default_execution_timeout(),
        }
    }
}

/// Risk management and portfolio constraints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskConfig {
    /// Maximum gross exposure as a multiple of equity.
    pub max_leverage: f64,
    /// Drawdown at which no new exposure is taken.
    pub max_drawdown: f64,
    /// Absolute cap on any single target weight.
    pub position_limit: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub rebalance_frequency: String,
    #[serde(default = "default_gross_exposure")]
    pub target_gross_exposure: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_leverage: 2.0,
            max_drawdown: 0.2,
            position_limit: 0.1,
            stop_loss_pct: 0.05,
            take_profit_pct: 0.15,
            rebalance_frequency: "1d".to_string(),
            target_gross_exposure: default_gross_exposure(),
        }
    }
}

/// Parameters used when replaying the alpha signal over history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestConfig {
    pub benchmark: String,
    pub start_time: NaiveDate,
    pub end_time: NaiveDate,
    pub account: BTreeMap<String, f64>,
    #[serde(default = "default_true")]
    pub verbose: bool,
    /// Number of instruments held at once.
    #[serde(default = "default_topk")]
    pub topk: usize,
    /// Maximum holdings replaced per rebalance.
    #[serde(default = "default_n_drop")]
    pub n_drop: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            benchmark: "SH000300".to_string(),
            start_time: ymd(2018, 1, 1),
            end_time: ymd(2023, 12, 31),
            account: BTreeMap::from([("cash".to_string(), 1_000_000.0)]),
            verbose: true,
            topk: default_topk(),
            n_drop: default_n_drop(),
        }
    }
}

/// Orchestration knobs that are not tied to a single collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentsConfig {
    /// Upper bound for a single agent's `run` inside a cycle.
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_seconds: u64,
    #[serde(default = "default_news_sources")]
    pub news_sources: Vec<String>,
    /// Plain-text headline file, one headline per line.
    #[serde(default)]
    pub headlines_path: Option<String>,
    #[serde(default = "default_news_ttl")]
    pub news_cache_ttl_seconds: u64,
    #[serde(default = "default_news_timeout")]
    pub news_timeout_seconds: u64,
    /// Number of top and bottom ranked signals shown to the decision model.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            agent_timeout_seconds: default_agent_timeout(),
            news_sources: default_news_sources(),
            headlines_path: None,
            news_cache_ttl_seconds: default_news_ttl(),
            news_timeout_seconds: default_news_timeout(),
            top_n: default_top_n(),
        }
    }
}

impl TraderConfig {
    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.data.instruments.is_empty() {
            problems.push("data.instruments must not be empty".to_string());
        }
        if let Some(end) = self.data.end_time {
            if end < self.data.start_time {
                problems.push("data.end_time precedes data.start_time".to_string());
            }
        }

        let risk = &self.risk;
        if !(risk.position_limit > 0.0 && risk.position_limit <= 1.0) {
            problems.push(format!(
                "risk.position_limit must be in (0, 1], got {}",
                risk.position_limit
            ));
        }
        if risk.max_leverage <= 0.0 {
            problems.push("risk.max_leverage must be positive".to_string());
        }
        if !(risk.max_drawdown > 0.0 && risk.max_drawdown <= 1.0) {
            problems.push("risk.max_drawdown must be in (0, 1]".to_string());
        }
        if risk.stop_loss_pct < 0.0 || risk.take_profit_pct < 0.0 {
            problems.push("risk stop/take percentages must be non-negative".to_string());
        }
        if risk.target_gross_exposure <= 0.0 {
            problems.push("risk.target_gross_exposure must be positive".to_string());
        }

        let bt = &self.backtest;
        if bt.start_time >= bt.end_time {
            problems.push("backtest.start_time must precede backtest.end_time".to_string());
        }
        if bt.topk == 0 {
            problems.push("backtest.topk must be at least 1".to_string());
        }
        if bt.n_drop > bt.topk {
            problems.push("backtest.n_drop must not exceed backtest.topk".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    /// Parse a complete config from JSON, rejecting payloads without the
    /// required sub-objects.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        let object = value.as_object().ok_or(ConfigError::NotAnObject)?;
        for section in REQUIRED_SECTIONS {
            match object.get(section) {
                Some(v) if v.is_object() => {}
                _ => return Err(ConfigError::MissingSection(section.to_string())),
            }
        }

        let config: TraderConfig =
            serde_json::from_value(value).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Deep-merge a partial JSON patch into a copy of this config.
    pub fn merged(&self, patch: &serde_json::Value) -> Result<Self, ConfigError> {
        if !patch.is_object() {
            return Err(ConfigError::NotAnObject);
        }
        let mut base =
            serde_json::to_value(self).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        merge_json(&mut base, patch);
        Self::from_json(base)
    }
}

/// Objects merge key by key; every other value replaces the target.
fn merge_json(target: &mut serde_json::Value, patch: &serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(target), serde_json::Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_json(existing, value)
                    }
                    _ => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

fn default_calendar() -> String {
    "USNYSE".to_string()
}
fn default_instruments() -> Vec<String> {
    vec!["SP500".to_string()]
}
fn default_data_start() -> NaiveDate {
    ymd(2015, 1, 1)
}
fn default_data_timeout() -> u64 {
    30
}
fn default_temperature() -> f64 {
    0.2
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_llm_timeout() -> u64 {
    45
}
fn default_server_host() -> String {
    "127.0.0.1".to_string()
}
fn default_server_port() -> u16 {
    33333
}
fn default_client_id() -> String {
    "ov-trader".to_string()
}
fn default_account_aliases() -> Vec<String> {
    vec!["td".to_string(), "wealthsimple".to_string()]
}
fn default_execution_timeout() -> u64 {
    10
}
fn default_gross_exposure() -> f64 {
    1.0
}
fn default_true() -> bool {
    true
}
fn default_topk() -> usize {
    20
}
fn default_n_drop() -> usize {
    5
}
fn default_agent_timeout() -> u64 {
    120
}
fn default_news_sources() -> Vec<String> {
    vec![
        "https://newsapi.org/".to_string(),
        "https://cryptopanic.com/".to_string(),
    ]
}
fn default_news_ttl() -> u64 {
    300
}
fn default_news_timeout() -> u64 {
    15
}
fn default_top_n() -> usize {
    5
}
