use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ovt_models::agent_output::AgentOutput;
use ovt_models::config::TraderConfig;
use ovt_models::records::{AgentOutcome, AgentReport, RunRecord, RunStatus, RunSummary};
use ovt_store::HeadlineCache;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::agent::Agent;
use crate::alpha::AlphaModel;
use crate::collaborators::Collaborators;
use crate::context::SharedContext;
use crate::error::AgentError;
use crate::execution::ExecutionAgent;
use crate::forecast::ForecastAgent;
use crate::news::NewsSentimentAgent;
use crate::portfolio::PortfolioAgent;

/// Where a cycle is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleState {
    Pending,
    Running(String),
    Completed,
    Failed,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleState::Pending => write!(f, "pending"),
            CycleState::Running(agent) => write!(f, "running({agent})"),
            CycleState::Completed => write!(f, "completed"),
            CycleState::Failed => write!(f, "failed"),
        }
    }
}

/// Runs the agent pipeline strictly in order and turns each cycle into a
/// RunRecord. Nothing an agent does escapes as an error.
pub struct Orchestrator {
    agents: Vec<Arc<dyn Agent>>,
}

impl Orchestrator {
    pub fn new(agents: Vec<Arc<dyn Agent>>) -> Self {
        Self { agents }
    }

    /// NewsSentiment, Forecast, Portfolio, Execution over the given
    /// collaborators. The research model serves news and decisions; the
    /// forecasting model, when set, only comments on the alpha.
    pub fn standard(
        collaborators: &Collaborators,
        alpha: Arc<dyn AlphaModel>,
        cache: HeadlineCache,
    ) -> Self {
        Self::new(vec![
            Arc::new(NewsSentimentAgent::new(
                collaborators.news.clone(),
                collaborators.research_model.clone(),
                cache,
            )),
            Arc::new(ForecastAgent::new(
                collaborators.market_data.clone(),
                alpha,
                collaborators.forecasting_model.clone(),
            )),
            Arc::new(PortfolioAgent::new(collaborators.research_model.clone())),
            Arc::new(ExecutionAgent::new(collaborators.bridge.clone())),
        ])
    }

    /// Append an agent after the existing ones.
    pub fn push(&mut self, agent: Arc<dyn Agent>) {
        self.agents.push(agent);
    }

    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name()).collect()
    }

    pub async fn run_cycle(&self, config: &TraderConfig, notes: Option<String>) -> RunRecord {
        self.run_cycle_with_cancel(config, notes, CancellationToken::new())
            .await
    }

    pub async fn run_cycle_with_cancel(
        &self,
        config: &TraderConfig,
        notes: Option<String>,
        cancel: CancellationToken,
    ) -> RunRecord {
        self.run_from(SharedContext::new(config.clone()), notes, cancel)
            .await
    }

    /// Run a cycle over carried-over market state, e.g. current positions.
    pub async fn resume_cycle(
        &self,
        config: &TraderConfig,
        market_state: BTreeMap<String, serde_json::Value>,
        notes: Option<String>,
    ) -> RunRecord {
        let ctx = SharedContext::resume(config.clone(), market_state);
        self.run_from(ctx, notes, CancellationToken::new()).await
    }

    async fn run_from(
        &self,
        mut ctx: SharedContext,
        notes: Option<String>,
        cancel: CancellationToken,
    ) -> RunRecord {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        let limit = Duration::from_secs(ctx.config().agents.agent_timeout_seconds);
        let mut state = CycleState::Pending;
        let mut reports = Vec::with_capacity(self.agents.len());
        info!(%run_id, %state, agents = self.agents.len(), "Starting cycle");

        for (index, agent) in self.agents.iter().enumerate() {
            let name = agent.name().to_string();

            state = CycleState::Running(name.clone());
            debug!(%run_id, %state, "Cycle transition");

            let agent_start = Instant::now();
            let result = if cancel.is_cancelled() {
                Err(AgentError::Cancelled)
            } else {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(AgentError::Cancelled),
                    outcome = tokio::time::timeout(limit, agent.run(&mut ctx)) => {
                        outcome.unwrap_or_else(|_| {
                            Err(AgentError::Timeout(name.clone(), limit.as_secs()))
                        })
                    }
                }
            };
            let elapsed_ms = agent_start.elapsed().as_millis() as u64;

            match result {
                Ok(()) => {
                    if ctx.read(&name).is_none() {
                        warn!(agent = %name, "Agent finished without a shared memory entry");
                    }
                    info!(agent = %name, elapsed_ms, "Agent succeeded");
                    reports.push(AgentReport {
                        agent_name: name,
                        outcome: AgentOutcome::Succeeded,
                        error: None,
                        elapsed_ms,
                    });
                }
                Err(e) => {
                    let fatal = self.is_fatal(index, &e);
                    let message = format!("{name}: {e}");
                    if fatal {
                        error!(
                            agent = %name,
                            error = %e,
                            elapsed_ms,
                            "Agent failed, stopping cycle"
                        );
                    } else {
                        warn!(agent = %name, error = %e, elapsed_ms, "Agent failed");
                    }
                    ctx.append_error(message);
                    if ctx.read(&name).is_none() {
                        let fault = AgentOutput::Fault {
                            error: e.to_string(),
                        };
                        if let Err(write_err) = ctx.write(&name, fault) {
                            warn!(
                                agent = %name,
                                error = %write_err,
                                "Could not record fault entry"
                            );
                        }
                    }
                    reports.push(AgentReport {
                        agent_name: name,
                        outcome: AgentOutcome::Failed,
                        error: Some(e.to_string()),
                        elapsed_ms,
                    });

                    if fatal {
                        state = CycleState::Failed;
                        reports.extend(self.agents[index + 1..].iter().map(|a| AgentReport {
                            agent_name: a.name().to_string(),
                            outcome: AgentOutcome::Skipped,
                            error: None,
                            elapsed_ms: 0,
                        }));
                        break;
                    }
                }
            }
        }

        let status = if state == CycleState::Failed {
            RunStatus::Failed
        } else {
            state = CycleState::Completed;
            RunStatus::Completed
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        info!(%run_id, %state, duration_ms, "Cycle finished");

        let parts = ctx.into_parts();
        RunRecord {
            id: run_id,
            timestamp: parts.timestamp,
            status,
            summary: RunSummary {
                decision: parts.decision,
                orders: parts.orders,
                warnings: parts.warnings,
                errors: parts.errors,
            },
            shared_memory: parts.shared_memory,
            market_state: parts.market_state,
            agent_reports: reports,
            duration_ms,
            notes,
            config_snapshot: parts.config,
        }
    }

    /// A failure is fatal when it is a data error, or when a later agent
    /// depends on the one that failed.
    fn is_fatal(&self, index: usize, err: &AgentError) -> bool {
        if err.is_fatal() {
            return true;
        }
        let name = self.agents[index].name();
        self.agents[index + 1..]
            .iter()
            .any(|later| later.requires().contains(&name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{OrderingAgent, StubAgent};
    use ovt_models::agent_output::MemoryEntry;

    fn arc(agent: StubAgent) -> Arc<dyn Agent> {
        Arc::new(agent)
    }

    #[tokio::test]
    async fn every_agent_gets_one_entry() {
        let orchestrator = Orchestrator::new(vec![
            arc(StubAgent::ok("First")),
            arc(StubAgent::ok("Second")),
        ]);
        let record = orchestrator.run_cycle(&TraderConfig::default(), None).await;

        assert_eq!(record.status, RunStatus::Completed);
        let agents: Vec<&str> = record
            .shared_memory
            .iter()
            .map(|e: &MemoryEntry| e.agent.as_str())
            .collect();
        assert_eq!(agents, vec!["First", "Second"]);
    }

    #[tokio::test]
    async fn non_fatal_failure_continues() {
        let orchestrator = Orchestrator::new(vec![
            arc(StubAgent::failing("Flaky", AgentError::Unavailable("feed".into()))),
            arc(StubAgent::ok("After")),
        ]);
        let record = orchestrator.run_cycle(&TraderConfig::default(), None).await;

        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!(record.summary.errors, vec!["Flaky: feed unavailable"]);
        assert!(matches!(
            record.memory("Flaky").unwrap().output,
            AgentOutput::Fault { .. }
        ));
        assert_eq!(record.agent_reports[1].outcome, AgentOutcome::Succeeded);
    }

    #[tokio::test]
    async fn dependency_failure_is_fatal() {
        let orchestrator = Orchestrator::new(vec![
            arc(StubAgent::failing("Source", AgentError::Unavailable("feed".into()))),
            arc(StubAgent::ok("Sink").requiring(&["Source"])),
            arc(StubAgent::ok("Tail")),
        ]);
        let record = orchestrator.run_cycle(&TraderConfig::default(), None).await;

        assert_eq!(record.status, RunStatus::Failed);
        assert!(record.memory("Sink").is_none());
        let outcomes: Vec<AgentOutcome> = record.agent_reports.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![AgentOutcome::Failed, AgentOutcome::Skipped, AgentOutcome::Skipped]
        );
    }

    #[tokio::test]
    async fn missing_input_is_fatal_without_dependents() {
        let orchestrator = Orchestrator::new(vec![
            arc(StubAgent::failing("Needy", AgentError::MissingInput("scores".into()))),
            arc(StubAgent::ok("Tail")),
        ]);
        let record = orchestrator.run_cycle(&TraderConfig::default(), None).await;
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.agent_reports[1].outcome, AgentOutcome::Skipped);
    }

    #[tokio::test]
    async fn slow_agent_times_out() {
        let mut config = TraderConfig::default();
        config.agents.agent_timeout_seconds = 0;
        let orchestrator = Orchestrator::new(vec![arc(StubAgent::sleeping("Slow", 5_000))]);
        let record = orchestrator.run_cycle(&config, None).await;

        assert!(record.summary.errors[0].starts_with("Slow: Slow timed out"));
        assert_eq!(record.agent_reports[0].outcome, AgentOutcome::Failed);
    }

    #[tokio::test]
    async fn cancelled_cycle_fails_and_skips() {
        let token = CancellationToken::new();
        token.cancel();
        let orchestrator = Orchestrator::new(vec![
            arc(StubAgent::ok("First")),
            arc(StubAgent::ok("Second")),
        ]);
        let record = orchestrator
            .run_cycle_with_cancel(&TraderConfig::default(), None, token)
            .await;

        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.summary.errors, vec!["First: cycle cancelled"]);
        assert_eq!(record.agent_reports[1].outcome, AgentOutcome::Skipped);
    }

    #[tokio::test]
    async fn agents_run_in_order() {
        let trace = Arc::new(std::sync::Mutex::new(Vec::new()));
        let orchestrator = Orchestrator::new(vec![
            Arc::new(OrderingAgent::new("A", trace.clone())) as Arc<dyn Agent>,
            Arc::new(OrderingAgent::new("B", trace.clone())) as Arc<dyn Agent>,
            Arc::new(OrderingAgent::new("C", trace.clone())) as Arc<dyn Agent>,
        ]);
        orchestrator.run_cycle(&TraderConfig::default(), None).await;
        assert_eq!(*trace.lock().unwrap(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn snapshot_is_a_copy() {
        let mut config = TraderConfig::default();
        let orchestrator = Orchestrator::new(vec![arc(StubAgent::ok("Only"))]);
        let record = orchestrator
            .run_cycle(&config, Some("check".to_string()))
            .await;
        config.risk.max_leverage = 9.0;

        assert_eq!(record.config_snapshot.risk.max_leverage, 2.0);
        assert_eq!(record.notes.as_deref(), Some("check"));
    }
}
