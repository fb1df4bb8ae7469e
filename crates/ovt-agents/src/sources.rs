//! File-backed and in-process collaborator implementations.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use ovt_models::market::{Order, PriceBar, PriceHistory};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::collaborators::{ExecutionBridge, MarketDataSource, NewsSource};
use crate::error::AgentError;

/// Headlines read from a plain-text file, one per non-empty line.
#[derive(Debug, Clone)]
pub struct FileHeadlineSource {
    path: PathBuf,
    name: String,
}

impl FileHeadlineSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("file:{}", path.display());
        Self { path, name }
    }
}

#[async_trait]
impl NewsSource for FileHeadlineSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_headlines(&self) -> Result<Vec<String>, AgentError> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct CloseRecord {
    date: NaiveDate,
    close: f64,
}

/// Daily closes from `<root>/<INSTRUMENT>.csv` files with at least `date`
/// and `close` columns.
#[derive(Debug, Clone)]
pub struct CsvMarketData {
    root: PathBuf,
}

impl CsvMarketData {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_series(path: &Path) -> Result<Vec<PriceBar>, AgentError> {
        let mut reader = csv::Reader::from_reader(File::open(path)?);
        let mut bars = Vec::new();
        let mut invalid = 0usize;
        for record in reader.deserialize() {
            let record: CloseRecord = record?;
            if !record.close.is_finite() || record.close <= 0.0 {
                invalid += 1;
                continue;
            }
            bars.push(PriceBar {
                date: record.date,
                close: record.close,
            });
        }
        if invalid > 0 {
            warn!(path = %path.display(), invalid, "Skipped rows with unusable close");
        }
        Ok(bars)
    }
}

#[async_trait]
impl MarketDataSource for CsvMarketData {
    async fn load_history(
        &self,
        instruments: &[String],
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<PriceHistory, AgentError> {
        let mut history = PriceHistory::new();
        for instrument in instruments {
            let path = self.root.join(format!("{instrument}.csv"));
            if !path.exists() {
                warn!(instrument = %instrument, path = %path.display(), "No price file");
                continue;
            }
            let bars = Self::read_series(&path)?;
            debug!(instrument = %instrument, bars = bars.len(), "Loaded price file");
            history.insert(instrument.clone(), bars);
        }

        let history = history.window(start, end);
        if history.is_empty() {
            return Err(AgentError::Data(format!(
                "no price data under {} for {}",
                self.root.display(),
                instruments.join(", ")
            )));
        }
        Ok(history)
    }
}

/// In-process bridge that acknowledges every order with a sequential id.
#[derive(Debug, Default)]
pub struct PaperBridge {
    connected: AtomicBool,
    next_id: AtomicU64,
}

impl PaperBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionBridge for PaperBridge {
    fn name(&self) -> &str {
        "paper"
    }

    async fn connect(&self) -> Result<(), AgentError> {
        if !self.connected.swap(true, Ordering::SeqCst) {
            info!("Paper bridge connected");
        }
        Ok(())
    }

    async fn submit(&self, order: &Order) -> Result<String, AgentError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(AgentError::Execution("paper bridge not connected".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            symbol = %order.symbol,
            side = ?order.side,
            quantity = %order.quantity,
            "Paper fill"
        );
        Ok(format!("paper-{id}"))
    }
}
