pub mod agent;
pub mod alpha;
pub mod backtest;
pub mod claude_cli;
pub mod collaborators;
pub mod context;
pub mod demo;
pub mod error;
pub mod execution;
pub mod forecast;
pub mod news;
pub mod orchestrator;
pub mod parser;
pub mod portfolio;
pub mod prompts;
pub mod sources;

pub mod test_support;

pub use agent::Agent;
pub use alpha::{AlphaModel, MomentumAlpha};
pub use backtest::{BacktestRunner, SignalBacktestEngine};
pub use claude_cli::ClaudeCliModel;
pub use collaborators::{
    BacktestEngine, Collaborators, ExecutionBridge, LanguageModel, MarketDataSource, NewsSource,
};
pub use context::SharedContext;
pub use demo::DemoRunner;
pub use error::{AgentError, ContextError};
pub use execution::ExecutionAgent;
pub use forecast::ForecastAgent;
pub use news::NewsSentimentAgent;
pub use orchestrator::{CycleState, Orchestrator};
pub use portfolio::PortfolioAgent;
pub use sources::{CsvMarketData, FileHeadlineSource, PaperBridge};
