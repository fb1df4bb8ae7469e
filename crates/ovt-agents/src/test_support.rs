//! Deterministic collaborators and stub agents for exercising the pipeline
//! without a model CLI, market data files or a broker.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use ovt_models::agent_output::{AgentOutput, FeatureSnapshot, ForecastOutput};
use ovt_models::market::{Order, PriceBar, PriceHistory};
use serde_json::json;

use crate::agent::Agent;
use crate::collaborators::{ExecutionBridge, LanguageModel, MarketDataSource, NewsSource};
use crate::context::SharedContext;
use crate::error::AgentError;

/// Returns a fixed headline list and counts fetches.
pub struct StaticNewsSource {
    headlines: Vec<String>,
    fetches: AtomicUsize,
}

impl StaticNewsSource {
    pub fn new(headlines: &[&str]) -> Self {
        Self {
            headlines: headlines.iter().map(|h| h.to_string()).collect(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NewsSource for StaticNewsSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_headlines(&self) -> Result<Vec<String>, AgentError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.headlines.clone())
    }
}

pub struct FailingNewsSource;

#[async_trait]
impl NewsSource for FailingNewsSource {
    fn name(&self) -> &str {
        "failing"
    }

    async fn fetch_headlines(&self) -> Result<Vec<String>, AgentError> {
        Err(AgentError::Unavailable("news feed".to_string()))
    }
}

/// Language model with a canned reply, or one that always errors.
pub struct ScriptedModel {
    reply: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _system: &str, _user: &str) -> Result<String, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .clone()
            .ok_or_else(|| AgentError::Cli("scripted failure".to_string()))
    }
}

/// Serves a prepared history, filtered the way the CSV source filters.
pub struct InMemoryMarketData {
    history: PriceHistory,
}

impl InMemoryMarketData {
    pub fn new(history: PriceHistory) -> Self {
        Self { history }
    }
}

#[async_trait]
impl MarketDataSource for InMemoryMarketData {
    async fn load_history(
        &self,
        instruments: &[String],
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<PriceHistory, AgentError> {
        let mut selected = PriceHistory::new();
        for instrument in instruments {
            if let Some(bars) = self.history.bars(instrument) {
                selected.insert(instrument.clone(), bars.to_vec());
            }
        }
        let window = selected.window(start, end);
        if window.is_empty() {
            return Err(AgentError::Data(format!(
                "no bars for {}",
                instruments.join(", ")
            )));
        }
        Ok(window)
    }
}

/// Daily closes starting at 100 and compounding by `drift` each day,
/// one bar per calendar day from 2024-01-01.
pub fn trending_history(drifts: &[(&str, f64)], days: usize) -> PriceHistory {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
    let mut history = PriceHistory::new();
    for (symbol, drift) in drifts {
        let bars = (0..days)
            .map(|i| PriceBar {
                date: start + chrono::Duration::days(i as i64),
                close: 100.0 * (1.0 + drift).powi(i as i32),
            })
            .collect();
        history.insert(*symbol, bars);
    }
    history
}

/// A forecast whose snapshot prices every symbol at 100.
pub fn forecast_output(scores: &[(&str, f64)]) -> ForecastOutput {
    let as_of = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap_or_default();
    let snapshot = scores
        .iter()
        .map(|(symbol, score)| {
            (
                symbol.to_string(),
                FeatureSnapshot {
                    as_of,
                    close: 100.0,
                    ma_5: 100.0,
                    ma_10: 100.0,
                    ma_21: 100.0,
                    momentum_5: *score,
                    momentum_10: *score,
                    momentum_21: *score,
                    volatility_21: 0.01,
                },
            )
        })
        .collect();
    ForecastOutput {
        scores: scores.iter().map(|(s, v)| (s.to_string(), *v)).collect(),
        as_of: Some(as_of),
        snapshot,
        commentary: None,
    }
}

/// Execution bridge that keeps every order it accepts.
#[derive(Default)]
pub struct RecordingBridge {
    reject: HashSet<String>,
    submitted: Mutex<Vec<Order>>,
    connects: AtomicUsize,
}

impl RecordingBridge {
    /// Rejects orders for the given symbols, accepts the rest.
    pub fn rejecting(symbols: &[&str]) -> Self {
        Self {
            reject: symbols.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn submitted(&self) -> Vec<Order> {
        self.submitted
            .lock()
            .map(|orders| orders.clone())
            .unwrap_or_default()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionBridge for RecordingBridge {
    fn name(&self) -> &str {
        "recording"
    }

    async fn connect(&self) -> Result<(), AgentError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn submit(&self, order: &Order) -> Result<String, AgentError> {
        if self.reject.contains(&order.symbol) {
            return Err(AgentError::Execution(format!("{} is not tradable", order.symbol)));
        }
        let mut submitted = self
            .submitted
            .lock()
            .map_err(|_| AgentError::Execution("recording bridge poisoned".to_string()))?;
        submitted.push(order.clone());
        Ok(format!("rec-{}", submitted.len()))
    }
}

enum StubBehavior {
    Ok,
    Fail(Mutex<Option<AgentError>>),
    Sleep(u64),
}

/// Agent with scripted behaviour. `ok` writes a custom entry under its own
/// name; `failing` returns its error once and writes nothing.
pub struct StubAgent {
    name: String,
    requires: Vec<&'static str>,
    behavior: StubBehavior,
}

impl StubAgent {
    pub fn ok(name: &str) -> Self {
        Self::with(name, StubBehavior::Ok)
    }

    pub fn failing(name: &str, error: AgentError) -> Self {
        Self::with(name, StubBehavior::Fail(Mutex::new(Some(error))))
    }

    pub fn sleeping(name: &str, millis: u64) -> Self {
        Self::with(name, StubBehavior::Sleep(millis))
    }

    pub fn requiring(mut self, agents: &[&'static str]) -> Self {
        self.requires = agents.to_vec();
        self
    }

    fn with(name: &str, behavior: StubBehavior) -> Self {
        Self {
            name: name.to_string(),
            requires: Vec::new(),
            behavior,
        }
    }
}

#[async_trait]
impl Agent for StubAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> &[&str] {
        &self.requires
    }

    async fn run(&self, ctx: &mut SharedContext) -> Result<(), AgentError> {
        match &self.behavior {
            StubBehavior::Ok => {}
            StubBehavior::Fail(error) => {
                let error = error.lock().ok().and_then(|mut e| e.take());
                return Err(error
                    .unwrap_or_else(|| AgentError::Execution("stub failed".to_string())));
            }
            StubBehavior::Sleep(millis) => {
                tokio::time::sleep(std::time::Duration::from_millis(*millis)).await;
            }
        }
        ctx.write(
            &self.name,
            AgentOutput::Custom(json!({ "agent": self.name })),
        )?;
        Ok(())
    }
}

/// Appends its name to a shared trace when run.
pub struct OrderingAgent {
    name: String,
    trace: Arc<Mutex<Vec<String>>>,
}

impl OrderingAgent {
    pub fn new(name: &str, trace: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            trace,
        }
    }
}

#[async_trait]
impl Agent for OrderingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut SharedContext) -> Result<(), AgentError> {
        if let Ok(mut trace) = self.trace.lock() {
            trace.push(self.name.clone());
        }
        ctx.write(&self.name, AgentOutput::Custom(json!({ "order": true })))?;
        Ok(())
    }
}
