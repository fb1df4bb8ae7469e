//! OV Trader - an agent pipeline that turns news, alpha signals and risk
//! limits into orders.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ovt::models::config::TraderConfig;
//! use ovt::store::RunStore;
//! use ovt::{CollaboratorFactory, TradingService};
//!
//! # async fn demo() {
//! let store = Arc::new(RunStore::new(TraderConfig::default()));
//! let service = TradingService::new(store, CollaboratorFactory::detect().await);
//! let record = service.run_cycle(None, None).await;
//! # }
//! ```

pub use ovt_agents as agents;
pub use ovt_models as models;
pub use ovt_store as store;

pub mod api;
pub mod service;

pub use service::TradingService;

use std::sync::Arc;
use std::time::Duration;

use ovt_agents::claude_cli::check_cli_available;
use ovt_agents::{
    AlphaModel, ClaudeCliModel, Collaborators, CsvMarketData, ExecutionBridge,
    FileHeadlineSource, LanguageModel, MarketDataSource, NewsSource, Orchestrator, PaperBridge,
};
use ovt_models::config::{ExecutionMode, LlmConfig, TraderConfig};
use ovt_store::HeadlineCache;
use tracing::info;

const CLI_PROVIDER: &str = "claude-cli";
const HEADLINE_CACHE_CAPACITY: u64 = 64;

/// Builds the collaborators for a cycle from the config it runs under.
///
/// The CLI probe happens once; the paper bridge is shared so its broker
/// ids keep counting across cycles.
#[derive(Clone)]
pub struct CollaboratorFactory {
    cli_available: bool,
    paper: Arc<PaperBridge>,
    fixed: Option<Collaborators>,
}

impl CollaboratorFactory {
    pub async fn detect() -> Self {
        let cli_available = check_cli_available().await;
        info!(cli_available, "Probed claude CLI");
        Self::new(cli_available)
    }

    pub fn new(cli_available: bool) -> Self {
        Self {
            cli_available,
            paper: Arc::new(PaperBridge::new()),
            fixed: None,
        }
    }

    /// Always hand out the same collaborators, whatever the config says.
    pub fn fixed(collaborators: Collaborators) -> Self {
        Self {
            fixed: Some(collaborators),
            ..Self::new(false)
        }
    }

    pub fn build(&self, config: &TraderConfig) -> Collaborators {
        if let Some(fixed) = &self.fixed {
            return fixed.clone();
        }

        let language_model = |llm: &LlmConfig| -> Option<Arc<dyn LanguageModel>> {
            (self.cli_available && llm.provider == CLI_PROVIDER)
                .then(|| Arc::new(ClaudeCliModel::from_config(llm)) as Arc<dyn LanguageModel>)
        };

        Collaborators {
            news: config
                .agents
                .headlines_path
                .as_ref()
                .map(|path| Arc::new(FileHeadlineSource::new(path)) as Arc<dyn NewsSource>),
            research_model: language_model(&config.llm_research),
            forecasting_model: config.llm_forecasting.as_ref().and_then(language_model),
            market_data: (!config.data.data_root.is_empty()).then(|| {
                let source = CsvMarketData::new(&config.data.data_root);
                Arc::new(source) as Arc<dyn MarketDataSource>
            }),
            bridge: match config.execution.mode {
                ExecutionMode::Paper => Some(self.paper.clone() as Arc<dyn ExecutionBridge>),
                ExecutionMode::Disabled => None,
            },
        }
    }
}

/// Headline cache sized and timed from the agents config.
pub fn headline_cache(config: &TraderConfig) -> HeadlineCache {
    HeadlineCache::new(
        HEADLINE_CACHE_CAPACITY,
        Duration::from_secs(config.agents.news_cache_ttl_seconds),
    )
}

/// Build the standard four-agent orchestrator for `config`.
pub fn build_orchestrator(
    config: &TraderConfig,
    factory: &CollaboratorFactory,
    alpha: Arc<dyn AlphaModel>,
    cache: HeadlineCache,
) -> Orchestrator {
    Orchestrator::standard(&factory.build(config), alpha, cache)
}
