use std::sync::Arc;
use std::time::Instant;

use chrono::{Datelike, NaiveDate, Utc, Weekday};
use ovt_models::config::TraderConfig;
use ovt_models::market::{PriceBar, PriceHistory};
use ovt_models::records::{DatedScores, DatedValue, DemoRunRecord, RunStatus, WalletSnapshot};
use ovt_models::wallet::VirtualWallet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::alpha::AlphaModel;
use crate::error::AgentError;
use crate::portfolio::long_only_weights;

pub const DEFAULT_INITIAL_BALANCE: f64 = 100.0;
const DEMO_DAYS: usize = 90;

/// (symbol, first close, daily drift, wave amplitude, wave phase)
const DEMO_UNIVERSE: [(&str, f64, f64, f64, f64); 3] = [
    ("AAPL", 180.0, 0.0009, 0.04, 0.0),
    ("MSFT", 330.0, 0.0006, 0.03, 1.3),
    ("GOOG", 130.0, 0.0004, 0.05, 2.6),
];

/// Business-day closes from 2023-01-02 following
/// `p0 * exp(drift*i + amp*sin(i/7 + phase))`. Identical on every call.
pub fn synthetic_market() -> PriceHistory {
    let mut dates = Vec::with_capacity(DEMO_DAYS);
    let mut day = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap_or_default();
    while dates.len() < DEMO_DAYS {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(day);
        }
        day = day.succ_opt().unwrap_or(day);
    }

    let mut history = PriceHistory::new();
    for (symbol, start, drift, amp, phase) in DEMO_UNIVERSE {
        let bars = dates
            .iter()
            .enumerate()
            .map(|(i, date)| {
                let t = i as f64;
                PriceBar {
                    date: *date,
                    close: start * (drift * t + amp * (t / 7.0 + phase).sin()).exp(),
                }
            })
            .collect();
        history.insert(symbol, bars);
    }
    history
}

/// Replays the alpha over the synthetic market into a virtual wallet.
pub struct DemoRunner {
    model: Arc<dyn AlphaModel>,
}

struct DemoOutcome {
    wallet: VirtualWallet,
    alpha: Vec<DatedScores>,
    weights: Vec<DatedScores>,
    returns: Vec<DatedValue>,
}

impl DemoRunner {
    pub fn new(model: Arc<dyn AlphaModel>) -> Self {
        Self { model }
    }

    pub fn run_demo(
        &self,
        initial_balance: f64,
        notes: Option<String>,
        config: &TraderConfig,
    ) -> DemoRunRecord {
        let start = Instant::now();
        let id = Uuid::new_v4();

        let (status, outcome, error) = match self.simulate(initial_balance) {
            Ok(outcome) => (RunStatus::Completed, Some(outcome), None),
            Err(e) => {
                warn!(demo_id = %id, error = %e, "Demo failed");
                (RunStatus::Failed, None, Some(e.to_string()))
            }
        };
        let DemoOutcome {
            wallet,
            alpha,
            weights,
            returns,
        } = outcome.unwrap_or_else(|| DemoOutcome {
            wallet: VirtualWallet::new(initial_balance),
            alpha: Vec::new(),
            weights: Vec::new(),
            returns: Vec::new(),
        });

        let duration_ms = start.elapsed().as_millis() as u64;
        let realized_return = wallet.total_return();
        info!(
            demo_id = %id,
            status = ?status,
            balance = wallet.balance,
            realized_return,
            duration_ms,
            "Demo finished"
        );

        DemoRunRecord {
            id,
            timestamp: Utc::now(),
            status,
            notes,
            duration_ms,
            initial_balance,
            wallet: WalletSnapshot {
                summary: wallet.summary(),
                label: wallet.label,
                starting_balance: wallet.starting_balance,
                balance: wallet.balance,
                history: wallet.history,
            },
            realized_return,
            alpha,
            weights,
            portfolio_returns: returns,
            error,
            config_snapshot: config.clone(),
        }
    }

    fn simulate(&self, initial_balance: f64) -> Result<DemoOutcome, AgentError> {
        if !initial_balance.is_finite() || initial_balance <= 0.0 {
            return Err(AgentError::Data(format!(
                "initial balance must be positive, got {initial_balance}"
            )));
        }
        let market = synthetic_market();
        let alpha = self.model.generate(&market)?.frame.rows;

        let weights: Vec<DatedScores> = alpha
            .iter()
            .map(|row| DatedScores {
                date: row.date,
                values: long_only_weights(&row.values),
            })
            .collect();

        let mut wallet = VirtualWallet::new(initial_balance);
        let mut returns = Vec::with_capacity(weights.len().saturating_sub(1));
        for pair in weights.windows(2) {
            let (today, next) = (&pair[0], &pair[1]);
            let value: f64 = today
                .values
                .iter()
                .filter_map(|(symbol, weight)| {
                    let from = market.close_on(symbol, today.date)?;
                    let to = market.close_on(symbol, next.date)?;
                    Some(weight * (to / from - 1.0))
                })
                .sum();
            wallet.apply_return(value, Some(next.date.to_string()));
            returns.push(DatedValue {
                date: next.date,
                value,
            });
        }

        Ok(DemoOutcome {
            wallet,
            alpha,
            weights,
            returns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alpha::{MomentumAlpha, MIN_BARS};

    fn runner() -> DemoRunner {
        DemoRunner::new(Arc::new(MomentumAlpha))
    }

    #[test]
    fn market_is_deterministic_business_days() {
        let a = synthetic_market();
        let dates = a.dates();
        assert_eq!(dates.len(), DEMO_DAYS);
        assert!(dates
            .iter()
            .all(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)));
        assert_eq!(a, synthetic_market());
        assert_eq!(a.bars("AAPL").unwrap()[0].close, 180.0);
    }

    #[test]
    fn balance_matches_realized_return() {
        let record = runner().run_demo(100.0, Some("demo".to_string()), &TraderConfig::default());

        assert_eq!(record.status, RunStatus::Completed);
        let expected = record.initial_balance * (1.0 + record.realized_return);
        assert!((record.wallet.balance - expected).abs() < 1e-9);

        let compounded = record
            .portfolio_returns
            .iter()
            .fold(1.0, |acc, r| acc * (1.0 + r.value))
            - 1.0;
        assert!((record.realized_return - compounded).abs() < 1e-12);
        assert_eq!(record.wallet.history.len(), record.portfolio_returns.len() + 1);
    }

    #[test]
    fn weights_are_long_only_and_normalized() {
        let record = runner().run_demo(100.0, None, &TraderConfig::default());
        assert_eq!(record.weights.len(), DEMO_DAYS - MIN_BARS + 1);
        for row in &record.weights {
            let total: f64 = row.values.values().sum();
            assert!((total - 1.0).abs() < 1e-9);
            assert!(row.values.values().all(|w| *w >= 0.0));
        }
        assert_eq!(record.portfolio_returns[0].date, record.weights[1].date);
    }

    #[test]
    fn bad_balance_fails_without_panicking() {
        let record = runner().run_demo(0.0, None, &TraderConfig::default());
        assert_eq!(record.status, RunStatus::Failed);
        assert!(record.error.unwrap().contains("initial balance"));
        assert!(record.portfolio_returns.is_empty());
    }
}
