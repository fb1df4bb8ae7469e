use serde::{Deserialize, Serialize};

/// A labelled balance observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletPoint {
    pub label: String,
    pub balance: f64,
}

/// Virtual balance that compounds simulated returns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VirtualWallet {
    pub label: String,
    pub starting_balance: f64,
    pub balance: f64,
    pub history: Vec<WalletPoint>,
}

impl VirtualWallet {
    pub fn new(starting_balance: f64) -> Self {
        Self::with_label(starting_balance, "USD")
    }

    pub fn with_label(starting_balance: f64, label: &str) -> Self {
        Self {
            label: label.to_string(),
            starting_balance,
            balance: starting_balance,
            history: vec![WalletPoint {
                label: "initial".to_string(),
                balance: starting_balance,
            }],
        }
    }

    /// Compound a fractional return into the balance.
    pub fn apply_return(&mut self, return_pct: f64, label: Option<String>) -> f64 {
        self.balance *= 1.0 + return_pct;
        let label = label.unwrap_or_else(|| format!("step-{}", self.history.len()));
        self.record(label)
    }

    pub fn deposit(&mut self, amount: f64, label: Option<String>) -> f64 {
        self.balance += amount;
        let label = label.unwrap_or_else(|| format!("deposit-{}", self.history.len()));
        self.record(label)
    }

    pub fn withdraw(&mut self, amount: f64, label: Option<String>) -> f64 {
        self.balance -= amount;
        let label = label.unwrap_or_else(|| format!("withdraw-{}", self.history.len()));
        self.record(label)
    }

    fn record(&mut self, label: String) -> f64 {
        self.history.push(WalletPoint {
            label,
            balance: self.balance,
        });
        self.balance
    }

    /// Fractional change since the start.
    pub fn total_return(&self) -> f64 {
        if self.starting_balance == 0.0 {
            0.0
        } else {
            self.balance / self.starting_balance - 1.0
        }
    }

    pub fn summary(&self) -> String {
        let change = self.balance - self.starting_balance;
        let direction = if change >= 0.0 { "gained" } else { "lost" };
        format!(
            "Virtual wallet {direction} {:.2} {label} ({:+.2}%) and now holds {:.2} {label}.",
            change.abs(),
            self.total_return() * 100.0,
            self.balance,
            label = self.label,
        )
    }
}
