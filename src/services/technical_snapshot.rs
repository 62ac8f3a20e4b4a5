use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::error::SourceError;
use crate::models::market::{TechnicalReading, TechnicalSnapshot};
use crate::models::record::NormalizedRecord;
use crate::models::section::{SectionData, SectionName, SectionReport};
use crate::services::ai_service::{InsightBrief, DEFAULT_DENY_LIST};
use crate::services::quote_history::QuoteHistory;
use crate::services::source::{SectionSource, SourceContext};
use crate::services::technical_indicators::{calc_macd, calc_rsi, last_value, support_level};
use crate::utils::parse::round2;

const SOURCE_NAME: &str = "Yahoo Finance";
const MIN_BARS: usize = 50;
const SUPPORT_WINDOW: usize = 20;

pub const TECHNICAL_INDICES: [(&str, &str); 5] = [
    ("Nifty 50", "^NSEI"),
    ("Sensex", "^BSESN"),
    ("Nifty Bank", "^NSEBANK"),
    ("Nifty IT", "^CNXIT"),
    ("Nifty FMCG", "^CNXFMCG"),
];

/// Most recent weekday strictly before `today`.
pub fn previous_trading_day(today: NaiveDate) -> NaiveDate {
    let mut day = today - Duration::days(1);
    while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
        day -= Duration::days(1);
    }
    day
}

/// RSI(14), MACD(12, 26, 9) and 20-session support from daily closes.
pub fn reading_from_closes(name: &str, symbol: &str, closes: &[f64]) -> Result<TechnicalReading, SourceError> {
    if closes.len() < MIN_BARS {
        return Err(SourceError::Insufficient {
            what: format!("daily closes for {}", symbol),
            needed: MIN_BARS,
            got: closes.len(),
        });
    }
    let macd = calc_macd(closes, 12, 26, 9);
    let missing = || SourceError::parse(format!("indicator undefined for {}", symbol));

    Ok(TechnicalReading {
        name: name.to_string(),
        symbol: symbol.to_string(),
        close: round2(*closes.last().ok_or_else(missing)?),
        support: round2(support_level(closes, SUPPORT_WINDOW).ok_or_else(missing)?),
        rsi: round2(last_value(&calc_rsi(closes, 14)).ok_or_else(missing)?),
        macd: round2(last_value(&macd.line).ok_or_else(missing)?),
        macd_signal: round2(last_value(&macd.signal).ok_or_else(missing)?),
    })
}

pub struct TechnicalSnapshotSource {
    ctx: SourceContext,
}

impl TechnicalSnapshotSource {
    pub fn new(ctx: SourceContext) -> Self {
        Self { ctx }
    }

    pub async fn fetch(&self) -> NormalizedRecord<TechnicalSnapshot> {
        let session = match self.ctx.open_session("technical_snapshot") {
            Ok(s) => s,
            Err(e) => return NormalizedRecord::failed(SOURCE_NAME, e.to_string()),
        };
        let history = QuoteHistory::new(&session, &self.ctx.settings.sources.yahoo_chart, &self.ctx.settings.retry);

        let mut readings = Vec::new();
        let mut skipped = Vec::new();
        for (name, symbol) in TECHNICAL_INDICES {
            let result = match history.closes(symbol, "6mo").await {
                Ok(closes) => reading_from_closes(name, symbol, &closes),
                Err(e) => Err(e),
            };
            match result {
                Ok(reading) => {
                    log::info!("Processed {} with close price {}", name, reading.close);
                    readings.push(reading);
                }
                Err(e) => {
                    log::warn!("Skipping {} ({}): {}", name, symbol, e);
                    skipped.push(name);
                }
            }
        }

        let snapshot = TechnicalSnapshot {
            as_of: previous_trading_day(chrono::Local::now().date_naive()).format("%B %d, %Y").to_string(),
            readings,
        };
        if snapshot.readings.is_empty() {
            NormalizedRecord::failed_with(SOURCE_NAME, snapshot, "No index had enough history")
        } else if !skipped.is_empty() {
            NormalizedRecord::partial(SOURCE_NAME, snapshot, format!("skipped: {}", skipped.join(", ")))
        } else {
            NormalizedRecord::ok(SOURCE_NAME, snapshot)
        }
    }
}

pub fn summarize(snapshot: &TechnicalSnapshot) -> String {
    let rows: Vec<String> = snapshot
        .readings
        .iter()
        .map(|r| {
            format!(
                "{}: close {:.2}, support {:.2}, RSI {:.2} ({}), MACD {:.2} vs signal {:.2} ({})",
                r.name, r.close, r.support, r.rsi, r.rsi_zone(), r.macd, r.macd_signal, r.macd_bias()
            )
        })
        .collect();
    format!("Technical snapshot as of {}:\n{}", snapshot.as_of, rows.join("\n"))
}

#[async_trait]
impl SectionSource for TechnicalSnapshotSource {
    fn name(&self) -> SectionName {
        SectionName::TechnicalSnapshot
    }

    async fn collect(&self) -> SectionData {
        let record = self.fetch().await;
        if record.is_failed() {
            return SectionData::TechnicalSnapshot(SectionReport::failed(record));
        }
        let brief = InsightBrief {
            topic: "technical indicator",
            summary: summarize(&record.payload),
            count: 7,
            focus: "- Mention support levels, overbought/oversold RSI and MACD crossovers; each point under 15 words",
            deny: DEFAULT_DENY_LIST,
        };
        let insights = self.ctx.insights.generate(&brief).await;
        SectionData::TechnicalSnapshot(SectionReport::new(record, insights))
    }
}
