//! Momentum alpha: technical features per instrument and the linear blend
//! that turns them into a cross-sectional score.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ovt_models::agent_output::FeatureSnapshot;
use ovt_models::market::{PriceBar, PriceHistory};
use ovt_models::records::DatedScores;

use crate::error::AgentError;

/// Bars needed before the first feature row: 21 returns need 22 closes.
pub const MIN_BARS: usize = 22;

const WINDOWS: [usize; 3] = [5, 10, 21];

/// Alpha scores per date, ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlphaFrame {
    pub rows: Vec<DatedScores>,
}

impl AlphaFrame {
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.values.is_empty())
    }

    pub fn latest(&self) -> Option<&DatedScores> {
        self.rows.last()
    }

    /// Rows dated inside `[start, end]`.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> AlphaFrame {
        AlphaFrame {
            rows: self
                .rows
                .iter()
                .filter(|r| r.date >= start && r.date <= end)
                .cloned()
                .collect(),
        }
    }
}

/// Output of one alpha pass over a price history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlphaSignals {
    pub frame: AlphaFrame,
    /// Most recent features and score for every instrument that had enough bars.
    pub latest: BTreeMap<String, (FeatureSnapshot, f64)>,
    /// Instruments dropped for lack of history.
    pub skipped: Vec<String>,
}

impl AlphaSignals {
    pub fn latest_scores(&self) -> BTreeMap<String, f64> {
        self.latest
            .iter()
            .map(|(symbol, (_, score))| (symbol.clone(), *score))
            .collect()
    }

    pub fn as_of(&self) -> Option<NaiveDate> {
        self.latest.values().map(|(f, _)| f.as_of).max()
    }
}

pub trait AlphaModel: Send + Sync {
    fn name(&self) -> &str;

    fn generate(&self, history: &PriceHistory) -> Result<AlphaSignals, AgentError>;
}

/// `0.4*mom10 + 0.3*mom21 - 0.1*vol21 + 0.2*(close/ma10 - 1)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MomentumAlpha;

impl MomentumAlpha {
    pub fn score(features: &FeatureSnapshot) -> f64 {
        0.4 * features.momentum_10 + 0.3 * features.momentum_21 - 0.1 * features.volatility_21
            + 0.2 * (features.close / features.ma_10 - 1.0)
    }
}

impl AlphaModel for MomentumAlpha {
    fn name(&self) -> &str {
        "momentum"
    }

    fn generate(&self, history: &PriceHistory) -> Result<AlphaSignals, AgentError> {
        let mut by_date: BTreeMap<NaiveDate, BTreeMap<String, f64>> = BTreeMap::new();
        let mut signals = AlphaSignals::default();

        for (symbol, bars) in &history.series {
            let features = build_features(bars);
            let Some(last) = features.last().copied() else {
                signals.skipped.push(symbol.clone());
                continue;
            };
            for f in &features {
                by_date
                    .entry(f.as_of)
                    .or_default()
                    .insert(symbol.clone(), Self::score(f));
            }
            signals
                .latest
                .insert(symbol.clone(), (last, Self::score(&last)));
        }

        if signals.latest.is_empty() {
            return Err(AgentError::Data(format!(
                "no instrument has the {MIN_BARS} daily bars the alpha needs"
            )));
        }

        signals.frame.rows = by_date
            .into_iter()
            .map(|(date, values)| DatedScores { date, values })
            .collect();
        Ok(signals)
    }
}

/// Feature rows for every bar where all windows are defined. Rows with a
/// non-finite feature are dropped.
pub fn build_features(bars: &[PriceBar]) -> Vec<FeatureSnapshot> {
    if bars.len() < MIN_BARS {
        return Vec::new();
    }
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let returns: Vec<f64> = closes.windows(2).map(|w| w[1] / w[0] - 1.0).collect();

    (MIN_BARS - 1..closes.len())
        .filter_map(|i| {
            let [ma_5, ma_10, ma_21] = WINDOWS.map(|w| mean(&closes[i + 1 - w..=i]));
            let [momentum_5, momentum_10, momentum_21] =
                WINDOWS.map(|w| closes[i] / closes[i - w] - 1.0);
            // returns[j] is the change into bar j + 1
            let volatility_21 = sample_std(&returns[i - 21..i]);

            let row = FeatureSnapshot {
                as_of: bars[i].date,
                close: closes[i],
                ma_5,
                ma_10,
                ma_21,
                momentum_5,
                momentum_10,
                momentum_21,
                volatility_21,
            };
            is_finite(&row).then_some(row)
        })
        .collect()
}

fn is_finite(f: &FeatureSnapshot) -> bool {
    [
        f.close,
        f.ma_5,
        f.ma_10,
        f.ma_21,
        f.momentum_5,
        f.momentum_10,
        f.momentum_21,
        f.volatility_21,
    ]
    .iter()
    .all(|v| v.is_finite())
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation with one degree of freedom removed.
pub(crate) fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0);
    var.sqrt()
}
