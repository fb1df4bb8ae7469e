use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    #[default]
    Market,
    Limit,
}

/// An instruction produced by portfolio construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub symbol: String,
    /// Fraction of equity to trade. Always non-negative; `side` carries the sign.
    pub quantity: Decimal,
    pub side: Side,
    #[serde(default)]
    pub order_type: OrderType,
    /// Limit price. None = market order.
    #[serde(default)]
    pub price: Option<Decimal>,
}

impl Order {
    pub fn market(symbol: impl Into<String>, quantity: Decimal, side: Side) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            side,
            order_type: OrderType::Market,
            price: None,
        }
    }

    /// Quantity with sign: positive buys, negative sells.
    pub fn signed_quantity(&self) -> Decimal {
        match self.side {
            Side::Buy => self.quantity,
            Side::Sell => -self.quantity,
        }
    }
}

/// One daily close.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub close: f64,
}

/// Daily closes per instrument, each series sorted by date.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PriceHistory {
    pub series: BTreeMap<String, Vec<PriceBar>>,
}

impl PriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a series, sorting it and dropping duplicate dates.
    pub fn insert(&mut self, instrument: impl Into<String>, mut bars: Vec<PriceBar>) {
        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);
        self.series.insert(instrument.into(), bars);
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn bars(&self, instrument: &str) -> Option<&[PriceBar]> {
        self.series.get(instrument).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(Vec::is_empty)
    }

    /// Keep only bars inside `[start, end]` (end inclusive when present).
    pub fn window(&self, start: NaiveDate, end: Option<NaiveDate>) -> PriceHistory {
        let series = self
            .series
            .iter()
            .map(|(instrument, bars)| {
                let kept = bars
                    .iter()
                    .filter(|b| b.date >= start && end.map_or(true, |e| b.date <= e))
                    .copied()
                    .collect();
                (instrument.clone(), kept)
            })
            .collect();
        PriceHistory { series }
    }

    /// Close for `instrument` on `date`, if that bar exists.
    pub fn close_on(&self, instrument: &str, date: NaiveDate) -> Option<f64> {
        self.series.get(instrument).and_then(|bars| {
            bars.binary_search_by_key(&date, |b| b.date)
                .ok()
                .map(|i| bars[i].close)
        })
    }

    /// Every date that appears in at least one series, ascending.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self
            .series
            .values()
            .flat_map(|bars| bars.iter().map(|b| b.date))
            .collect();
        dates.sort();
        dates.dedup();
        dates
    }
}
