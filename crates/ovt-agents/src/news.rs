use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ovt_models::agent_output::{AgentOutput, NewsSummary, NEWS_SENTIMENT};
use ovt_store::HeadlineCache;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::collaborators::{with_timeout, LanguageModel, NewsSource};
use crate::context::SharedContext;
use crate::error::AgentError;
use crate::prompts::{headline_digest, news_prompt, news_system_prompt};

/// Collects headlines and summarises their sentiment. Never fails a cycle:
/// every missing collaborator degrades to a warning.
pub struct NewsSentimentAgent {
    source: Option<Arc<dyn NewsSource>>,
    model: Option<Arc<dyn LanguageModel>>,
    cache: HeadlineCache,
}

impl NewsSentimentAgent {
    pub fn new(
        source: Option<Arc<dyn NewsSource>>,
        model: Option<Arc<dyn LanguageModel>>,
        cache: HeadlineCache,
    ) -> Self {
        Self {
            source,
            model,
            cache,
        }
    }

    async fn headlines(&self, ctx: &mut SharedContext) -> Option<Vec<String>> {
        let Some(source) = &self.source else {
            ctx.append_warning(format!("{NEWS_SENTIMENT}: no news source configured"));
            return None;
        };

        if let Some(cached) = self.cache.get(source.name()).await {
            debug!(source = source.name(), count = cached.len(), "Headline cache hit");
            return Some(cached);
        }

        let limit = Duration::from_secs(ctx.config().agents.news_timeout_seconds);
        match with_timeout(limit, "news source", source.fetch_headlines()).await {
            Ok(headlines) => {
                self.cache
                    .insert(source.name().to_string(), headlines.clone())
                    .await;
                Some(headlines)
            }
            Err(e) => {
                warn!(source = source.name(), error = %e, "Headline fetch failed");
                ctx.append_warning(format!("{NEWS_SENTIMENT}: headline fetch failed: {e}"));
                None
            }
        }
    }
}

#[async_trait]
impl Agent for NewsSentimentAgent {
    fn name(&self) -> &str {
        NEWS_SENTIMENT
    }

    async fn run(&self, ctx: &mut SharedContext) -> Result<(), AgentError> {
        let headlines = match self.headlines(ctx).await {
            Some(h) if !h.is_empty() => h,
            fetched => {
                if fetched.is_some() {
                    ctx.append_warning(format!(
                        "{NEWS_SENTIMENT}: news source returned no headlines"
                    ));
                }
                let placeholder = AgentOutput::NewsSentiment(NewsSummary::placeholder());
                ctx.write(NEWS_SENTIMENT, placeholder)?;
                return Ok(());
            }
        };

        let summary = match &self.model {
            None => {
                ctx.append_warning(format!(
                    "{NEWS_SENTIMENT}: LLM integration not configured, using headline digest"
                ));
                headline_digest(&headlines)
            }
            Some(model) => {
                let limit = Duration::from_secs(ctx.config().llm_research.timeout_seconds);
                let reply = with_timeout(
                    limit,
                    "news summary model",
                    model.complete(&news_system_prompt(), &news_prompt(&headlines)),
                )
                .await;
                match reply {
                    Ok(text) => text.trim().to_string(),
                    Err(e) => {
                        warn!(model = model.model(), error = %e, "News summary failed");
                        ctx.append_warning(format!("{NEWS_SENTIMENT}: summary model failed: {e}"));
                        headline_digest(&headlines)
                    }
                }
            }
        };

        info!(headlines = headlines.len(), "News sentiment summarised");
        ctx.write(
            NEWS_SENTIMENT,
            AgentOutput::NewsSentiment(NewsSummary {
                headlines,
                summary,
                placeholder: false,
            }),
        )?;
        Ok(())
    }
}
