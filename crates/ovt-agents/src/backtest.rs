use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use ovt_models::config::TraderConfig;
use ovt_models::market::{PriceBar, PriceHistory};
use ovt_models::records::{BacktestRecord, BacktestResult, RunStatus};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::alpha::{mean, sample_std, AlphaFrame, AlphaModel, MIN_BARS};
use crate::collaborators::{with_timeout, BacktestEngine, BacktestSettings, MarketDataSource};
use crate::error::AgentError;

const TRADING_DAYS: f64 = 252.0;

/// History loaded ahead of the window so features exist on its first day.
const LOOKBACK_DAYS: i64 = (MIN_BARS as i64) * 2 + 10;

/// Replays the alpha over the configured backtest window.
pub struct BacktestRunner {
    market_data: Option<Arc<dyn MarketDataSource>>,
    model: Arc<dyn AlphaModel>,
    engine: Arc<dyn BacktestEngine>,
}

impl BacktestRunner {
    pub fn new(
        market_data: Option<Arc<dyn MarketDataSource>>,
        model: Arc<dyn AlphaModel>,
        engine: Arc<dyn BacktestEngine>,
    ) -> Self {
        Self {
            market_data,
            model,
            engine,
        }
    }

    /// Always produces a record. Failures leave `result` empty and set `error`.
    pub async fn run_backtest(
        &self,
        config: &TraderConfig,
        notes: Option<String>,
    ) -> BacktestRecord {
        let start = Instant::now();
        let id = Uuid::new_v4();
        info!(backtest_id = %id, "Starting backtest");

        let (status, result, error) = match self.execute(config).await {
            Ok(result) => (RunStatus::Completed, Some(result), None),
            Err(e) => {
                warn!(backtest_id = %id, error = %e, "Backtest failed");
                (RunStatus::Failed, None, Some(e.to_string()))
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        info!(backtest_id = %id, status = ?status, duration_ms, "Backtest finished");

        BacktestRecord {
            id,
            timestamp: Utc::now(),
            status,
            notes,
            config_snapshot: config.clone(),
            duration_ms,
            result,
            error,
        }
    }

    async fn execute(&self, config: &TraderConfig) -> Result<BacktestResult, AgentError> {
        let source = self
            .market_data
            .as_ref()
            .ok_or_else(|| AgentError::Unavailable("market data source".to_string()))?;
        let bt = &config.backtest;
        let limit = Duration::from_secs(config.data.timeout_seconds);
        let load_from = bt.start_time - chrono::Duration::days(LOOKBACK_DAYS);

        let history = with_timeout(
            limit,
            "market data",
            source.load_history(&config.data.instruments, load_from, Some(bt.end_time)),
        )
        .await?;

        let signals = self.model.generate(&history)?;
        let frame = signals.frame.between(bt.start_time, bt.end_time);
        if frame.is_empty() {
            return Err(AgentError::Data(format!(
                "no alpha signals between {} and {}",
                bt.start_time, bt.end_time
            )));
        }

        let benchmark = match with_timeout(
            limit,
            "benchmark data",
            source.load_history(
                std::slice::from_ref(&bt.benchmark),
                bt.start_time,
                Some(bt.end_time),
            ),
        )
        .await
        {
            Ok(h) => h.bars(&bt.benchmark).map(<[PriceBar]>::to_vec),
            Err(e) => {
                warn!(benchmark = %bt.benchmark, error = %e, "Benchmark unavailable");
                None
            }
        };

        let settings = BacktestSettings {
            topk: bt.topk,
            n_drop: bt.n_drop,
            initial_cash: bt.account.get("cash").copied().unwrap_or(1_000_000.0),
            benchmark: bt.benchmark.clone(),
            verbose: bt.verbose,
        };
        self.engine
            .simulate(&frame, &history, benchmark.as_deref(), &settings)
            .await
    }
}

/// Long-only top-k portfolio with at most `n_drop` replacements per
/// rebalance. Holdings chosen on one signal date earn the equal-weighted
/// return to the next signal date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalBacktestEngine;

#[async_trait]
impl BacktestEngine for SignalBacktestEngine {
    async fn simulate(
        &self,
        signals: &AlphaFrame,
        prices: &PriceHistory,
        benchmark: Option<&[PriceBar]>,
        settings: &BacktestSettings,
    ) -> Result<BacktestResult, AgentError> {
        if signals.rows.len() < 2 {
            return Err(AgentError::Backtest(
                "need at least two signal dates".to_string(),
            ));
        }
        if settings.initial_cash <= 0.0 {
            return Err(AgentError::Backtest("initial cash must be positive".to_string()));
        }

        let mut holdings: BTreeSet<String> = BTreeSet::new();
        let mut value = settings.initial_cash;
        let mut peak = value;
        let mut max_drawdown = 0.0f64;
        let mut daily_returns = Vec::with_capacity(signals.rows.len() - 1);
        let mut equity_curve = vec![json!({"date": signals.rows[0].date, "value": value})];
        let mut positions = Vec::new();
        let mut turnover = 0usize;

        for pair in signals.rows.windows(2) {
            let (today, next) = (&pair[0], &pair[1]);
            let rebalanced = topk_dropout(&holdings, &today.values, settings.topk, settings.n_drop);
            turnover += rebalanced.difference(&holdings).count();
            holdings = rebalanced;

            let step: Vec<f64> = holdings
                .iter()
                .filter_map(|symbol| {
                    let from = prices.close_on(symbol, today.date)?;
                    let to = prices.close_on(symbol, next.date)?;
                    Some(to / from - 1.0)
                })
                .collect();
            let ret = if step.is_empty() { 0.0 } else { mean(&step) };

            value *= 1.0 + ret;
            peak = peak.max(value);
            max_drawdown = max_drawdown.max((peak - value) / peak);
            daily_returns.push(ret);
            equity_curve.push(json!({"date": next.date, "value": value}));
            if settings.verbose {
                positions.push(json!({"date": today.date, "holdings": holdings}));
            }
        }

        let periods = daily_returns.len() as f64;
        let total_return = value / settings.initial_cash - 1.0;
        let vol = sample_std(&daily_returns);
        let mut analysis = BTreeMap::from([
            ("total_return".to_string(), total_return),
            (
                "annualized_return".to_string(),
                (1.0 + total_return).powf(TRADING_DAYS / periods) - 1.0,
            ),
            ("annualized_volatility".to_string(), vol * TRADING_DAYS.sqrt()),
            (
                "sharpe".to_string(),
                if vol > 0.0 {
                    mean(&daily_returns) / vol * TRADING_DAYS.sqrt()
                } else {
                    0.0
                },
            ),
            ("max_drawdown".to_string(), max_drawdown),
            ("final_value".to_string(), value),
            ("trading_days".to_string(), periods),
            ("turnover".to_string(), turnover as f64),
        ]);

        let first = signals.rows[0].date;
        let last = signals.rows[signals.rows.len() - 1].date;
        if let Some(bench) = benchmark.and_then(|bars| period_return(bars, first, last)) {
            analysis.insert("benchmark_return".to_string(), bench);
            analysis.insert("excess_return".to_string(), total_return - bench);
        }

        Ok(BacktestResult {
            analysis,
            report: json!({
                "benchmark": settings.benchmark,
                "topk": settings.topk,
                "n_drop": settings.n_drop,
                "positions": positions,
                "equity_curve": equity_curve,
            }),
        })
    }
}

/// Next holdings: fill empty slots from the best unheld names, then swap out
/// up to `n_drop` held names that fall outside the top `topk` of the
/// combined ranking. Held names without a score today rank last.
pub fn topk_dropout(
    held: &BTreeSet<String>,
    scores: &BTreeMap<String, f64>,
    topk: usize,
    n_drop: usize,
) -> BTreeSet<String> {
    let score = |s: &String| scores.get(s).copied().unwrap_or(f64::NEG_INFINITY);

    let mut candidates: Vec<&String> = scores.keys().filter(|s| !held.contains(*s)).collect();
    candidates.sort_by(|a, b| score(b).total_cmp(&score(a)));
    let free = topk.saturating_sub(held.len());
    candidates.truncate(n_drop + free);

    let mut combined: Vec<&String> = held.iter().chain(candidates.iter().copied()).collect();
    combined.sort_by(|a, b| score(b).total_cmp(&score(a)));

    let mut sell: Vec<&String> = combined
        .iter()
        .skip(topk)
        .filter(|s| held.contains(**s))
        .copied()
        .collect();
    sell.reverse();
    sell.truncate(n_drop);

    let mut next: BTreeSet<String> = held.iter().filter(|s| !sell.contains(s)).cloned().collect();
    let slots = topk.saturating_sub(next.len());
    next.extend(candidates.into_iter().take(slots).cloned());
    next
}

fn period_return(bars: &[PriceBar], from: NaiveDate, to: NaiveDate) -> Option<f64> {
    let start = bars.iter().find(|b| b.date >= from)?;
    let end = bars.iter().rev().find(|b| b.date <= to)?;
    (end.date > start.date).then(|| end.close / start.close - 1.0)
}
