pub mod agent_output;
pub mod config;
pub mod decision;
pub mod market;
pub mod records;
pub mod wallet;

pub use agent_output::{
    AgentOutput, ExecutionOutput, FeatureSnapshot, ForecastOutput, MemoryEntry, NewsSummary,
    OrderReport, OrderStatus, PortfolioOutput, TargetPosition,
};
pub use config::{
    AgentsConfig, BacktestConfig, ConfigError, DataConfig, ExecutionConfig, ExecutionMode,
    LlmConfig, RiskConfig, TraderConfig,
};
pub use decision::{Action, Decision, StructuredDecision};
pub use market::{Order, OrderType, PriceBar, PriceHistory, Side};
pub use records::{
    AgentOutcome, AgentReport, BacktestRecord, BacktestResult, DashboardData, DashboardMetrics,
    DatedScores, DatedValue, DemoRunRecord, RunRecord, RunStatus, RunSummary, WalletSnapshot,
};
pub use wallet::{VirtualWallet, WalletPoint};
