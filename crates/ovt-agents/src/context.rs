use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ovt_models::agent_output::{AgentOutput, ForecastOutput, MemoryEntry, NewsSummary};
use ovt_models::config::TraderConfig;
use ovt_models::decision::Decision;
use ovt_models::market::Order;
use serde_json::Value;

use crate::error::ContextError;

/// Market-state keys written by the Forecast agent on every cycle.
pub const CYCLE_KEYS: &[&str] = &["alpha", "market_data"];

/// Working state threaded through one orchestrator cycle.
///
/// Agents receive `&mut SharedContext` in turn. Shared memory is
/// append-only with at most one entry per agent, and a market-state key
/// is never overwritten once set.
#[derive(Debug, Clone)]
pub struct SharedContext {
    timestamp: DateTime<Utc>,
    config: TraderConfig,
    market_state: BTreeMap<String, Value>,
    shared_memory: Vec<MemoryEntry>,
    decision: Option<Decision>,
    orders: Vec<Order>,
    warnings: Vec<String>,
    errors: Vec<String>,
}

/// Everything a finished cycle leaves behind.
#[derive(Debug, Clone)]
pub struct ContextParts {
    pub timestamp: DateTime<Utc>,
    pub config: TraderConfig,
    pub market_state: BTreeMap<String, Value>,
    pub shared_memory: Vec<MemoryEntry>,
    pub decision: Option<Decision>,
    pub orders: Vec<Order>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl SharedContext {
    pub fn new(config: TraderConfig) -> Self {
        Self::resume(config, BTreeMap::new())
    }

    /// Start a cycle from market state carried over by the caller, e.g.
    /// current `positions` or the running `drawdown`. Keys the cycle
    /// itself produces (see [`CYCLE_KEYS`]) are dropped from the seed.
    pub fn resume(config: TraderConfig, mut market_state: BTreeMap<String, Value>) -> Self {
        market_state.retain(|key, _| !CYCLE_KEYS.contains(&key.as_str()));
        Self {
            timestamp: Utc::now(),
            config,
            market_state,
            shared_memory: Vec::new(),
            decision: None,
            orders: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn config(&self) -> &TraderConfig {
        &self.config
    }

    pub fn market(&self, key: &str) -> Option<&Value> {
        self.market_state.get(key)
    }

    pub fn market_state(&self) -> &BTreeMap<String, Value> {
        &self.market_state
    }

    /// Set `key` unless it is already present. Returns whether it was set.
    #[must_use]
    pub fn insert_market(&mut self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if self.market_state.contains_key(&key) {
            return false;
        }
        self.market_state.insert(key, value);
        true
    }

    /// Append `agent`'s entry to shared memory.
    pub fn write(&mut self, agent: &str, output: AgentOutput) -> Result<(), ContextError> {
        if self.read(agent).is_some() {
            return Err(ContextError::DuplicateWrite(agent.to_string()));
        }
        if !output.fits(agent) {
            return Err(ContextError::ShapeMismatch {
                agent: agent.to_string(),
                found: output.builtin_owner().unwrap_or("Custom").to_string(),
            });
        }
        self.shared_memory.push(MemoryEntry {
            agent: agent.to_string(),
            output,
        });
        Ok(())
    }

    pub fn read(&self, agent: &str) -> Option<&AgentOutput> {
        self.shared_memory
            .iter()
            .find(|e| e.agent == agent)
            .map(|e| &e.output)
    }

    pub fn shared_memory(&self) -> &[MemoryEntry] {
        &self.shared_memory
    }

    /// The Forecast agent's output, if it ran and succeeded.
    pub fn forecast(&self) -> Option<&ForecastOutput> {
        self.shared_memory.iter().find_map(|e| match &e.output {
            AgentOutput::Forecast(f) => Some(f),
            _ => None,
        })
    }

    pub fn news(&self) -> Option<&NewsSummary> {
        self.shared_memory.iter().find_map(|e| match &e.output {
            AgentOutput::NewsSentiment(n) => Some(n),
            _ => None,
        })
    }

    pub fn set_decision(&mut self, decision: Decision) {
        self.decision = Some(decision);
    }

    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }

    pub fn append_order(&mut self, order: Order) {
        self.orders.push(order);
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn append_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn append_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn into_parts(self) -> ContextParts {
        ContextParts {
            timestamp: self.timestamp,
            config: self.config,
            market_state: self.market_state,
            shared_memory: self.shared_memory,
            decision: self.decision,
            orders: self.orders,
            warnings: self.warnings,
            errors: self.errors,
        }
    }
}
