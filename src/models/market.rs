use serde::{Deserialize, Serialize};

// ========== Market overview ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexQuote {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub change: f64,
    pub change_percent: f64,
    pub prev_close: f64,
    /// Symbol that actually supplied the data (primary or an alternate).
    pub fetched_from: String,
}

/// One index, always keyed by its primary symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub symbol: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<IndexQuote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IndexEntry {
    pub fn unavailable(symbol: &str, name: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            quote: None,
            error: Some("Data unavailable".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketOverview {
    pub indices: Vec<IndexEntry>,
}

impl MarketOverview {
    pub fn available(&self) -> impl Iterator<Item = (&IndexEntry, &IndexQuote)> {
        self.indices.iter().filter_map(|e| e.quote.as_ref().map(|q| (e, q)))
    }
}

// ========== Sector movement ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorRow {
    pub sector_name: String,
    pub change_percent: f64,
    pub advances: u32,
    pub declines: u32,
    pub num_companies: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SectorMovement {
    pub sectors: Vec<SectorRow>,
}

// ========== Institutional activity ==========

/// Net flow figures in ₹ crore.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowFigures {
    pub buy: f64,
    pub sell: f64,
    pub net: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionalActivity {
    pub fii: FlowFigures,
    pub dii: FlowFigures,
    pub source: String,
}

impl Default for InstitutionalActivity {
    fn default() -> Self {
        Self {
            fii: FlowFigures::default(),
            dii: FlowFigures::default(),
            source: "No data available".to_string(),
        }
    }
}

// ========== Top performers ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMove {
    pub name: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TopPerformers {
    pub gainers: Vec<StockMove>,
    pub losers: Vec<StockMove>,
}

// ========== Technical snapshot ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalReading {
    pub name: String,
    pub symbol: String,
    pub close: f64,
    /// Lowest close of the last 20 sessions.
    pub support: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
}

impl TechnicalReading {
    pub fn rsi_zone(&self) -> &'static str {
        if self.rsi >= 70.0 {
            "overbought"
        } else if self.rsi <= 30.0 {
            "oversold"
        } else {
            "neutral"
        }
    }

    pub fn macd_bias(&self) -> &'static str {
        if self.macd >= self.macd_signal { "bullish" } else { "bearish" }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    /// Previous weekday, e.g. "March 14, 2025".
    pub as_of: String,
    pub readings: Vec<TechnicalReading>,
}

// ========== Financial indicators ==========

pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorData {
    pub name: String,
    pub value: String,
    pub percent_change: String,
    pub remarks: String,
}

impl IndicatorData {
    pub fn unavailable(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: NOT_AVAILABLE.to_string(),
            percent_change: NOT_AVAILABLE.to_string(),
            remarks: NOT_AVAILABLE.to_string(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.value != NOT_AVAILABLE
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FinancialIndicators {
    pub indicators: Vec<IndicatorData>,
}
