use async_trait::async_trait;
use futures::future::join_all;

use crate::models::market::{IndexEntry, IndexQuote, MarketOverview};
use crate::models::record::NormalizedRecord;
use crate::models::section::{SectionData, SectionName, SectionReport};
use crate::services::ai_service::{InsightBrief, DEFAULT_DENY_LIST};
use crate::services::quote_history::{DailyBar, QuoteHistory};
use crate::services::source::{SectionSource, SourceContext};
use crate::utils::parse::round2;

const SOURCE_NAME: &str = "Yahoo Finance";
const RANGES: [&str; 2] = ["5d", "1mo"];

/// An index and the alternate tickers Yahoo sometimes serves it under.
#[derive(Debug, Clone, Copy)]
pub struct IndexSpec {
    pub symbol: &'static str,
    pub name: &'static str,
    pub alternates: &'static [&'static str],
}

pub const INDEX_CATALOGUE: [IndexSpec; 6] = [
    IndexSpec { symbol: "^NSEI", name: "NIFTY 50", alternates: &["NIFTY50.NS", "NIFTY.NS"] },
    IndexSpec { symbol: "^BSESN", name: "SENSEX", alternates: &["SENSEX.BO", "BSE.NS"] },
    IndexSpec { symbol: "^CRSLDX", name: "CRSLDX", alternates: &["CRSLDX.NS"] },
    IndexSpec { symbol: "^NSEBANK", name: "BANK NIFTY", alternates: &["BANKNIFTY.NS", "NIFTYBANK.NS"] },
    IndexSpec { symbol: "^CNXIT", name: "NIFTY IT", alternates: &["CNXIT.NS", "NIFTYIT.NS"] },
    IndexSpec { symbol: "^NSEMDCP50", name: "NIFTY Midcap 50", alternates: &["NIFTYMDCP50.NS", "NIFTYMIDCAP50.NS"] },
];

pub struct MarketOverviewSource {
    ctx: SourceContext,
    catalogue: Vec<IndexSpec>,
}

impl MarketOverviewSource {
    pub fn new(ctx: SourceContext) -> Self {
        Self { ctx, catalogue: INDEX_CATALOGUE.to_vec() }
    }

    pub fn with_catalogue(ctx: SourceContext, catalogue: Vec<IndexSpec>) -> Self {
        Self { ctx, catalogue }
    }

    pub async fn fetch(&self) -> NormalizedRecord<MarketOverview> {
        let session = match self.ctx.open_session("market_overview") {
            Ok(s) => s,
            Err(e) => return NormalizedRecord::failed(SOURCE_NAME, e.to_string()),
        };
        let history = QuoteHistory::new(&session, &self.ctx.settings.sources.yahoo_chart, &self.ctx.settings.retry);

        let indices = join_all(self.catalogue.iter().map(|spec| fetch_index(&history, spec))).await;
        let overview = MarketOverview { indices };

        let found = overview.available().count();
        let total = overview.indices.len();
        log::info!("Market overview: {}/{} indices fetched", found, total);
        match found {
            0 => NormalizedRecord::failed_with(SOURCE_NAME, overview, "No index data could be fetched"),
            n if n < total => NormalizedRecord::partial(SOURCE_NAME, overview, format!("{} of {} indices unavailable", total - n, total)),
            _ => NormalizedRecord::ok(SOURCE_NAME, overview),
        }
    }
}

/// Primary first, then alternates; each range round tries every symbol.
/// A miss here only marks this index unavailable.
async fn fetch_index(history: &QuoteHistory<'_>, spec: &IndexSpec) -> IndexEntry {
    for range in RANGES {
        for symbol in std::iter::once(spec.symbol).chain(spec.alternates.iter().copied()) {
            match history.daily_bars(symbol, range).await {
                Ok(bars) => match quote_from_bars(&bars, symbol) {
                    Some(quote) => {
                        log::info!("Fetched {} using {} ({})", spec.symbol, symbol, range);
                        return IndexEntry {
                            symbol: spec.symbol.to_string(),
                            name: spec.name.to_string(),
                            quote: Some(quote),
                            error: None,
                        };
                    }
                    None => log::warn!("{} ({}) returned {} usable bars", symbol, range, bars.len()),
                },
                Err(e) => log::warn!("Failed to fetch {} with range {}: {}", symbol, range, e),
            }
        }
    }
    log::warn!("Could not fetch data for {} or any of its alternatives", spec.symbol);
    IndexEntry::unavailable(spec.symbol, spec.name)
}

/// Needs the last two sessions and a non-zero previous close.
pub fn quote_from_bars(bars: &[DailyBar], fetched_from: &str) -> Option<IndexQuote> {
    let [.., prev, last] = bars else { return None };
    if prev.close <= 0.0 {
        return None;
    }
    let change = last.close - prev.close;
    Some(IndexQuote {
        open: round2(last.open),
        high: round2(last.high),
        low: round2(last.low),
        close: round2(last.close),
        change: round2(change),
        change_percent: round2(change / prev.close * 100.0),
        prev_close: round2(prev.close),
        fetched_from: fetched_from.to_string(),
    })
}

fn summarize(overview: &MarketOverview) -> String {
    overview
        .available()
        .map(|(entry, q)| {
            format!(
                "{}: Open={:.2}, High={:.2}, Low={:.2}, Close={:.2}, Change={:+.2} ({:+.2}%)",
                entry.name, q.open, q.high, q.low, q.close, q.change, q.change_percent
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl SectionSource for MarketOverviewSource {
    fn name(&self) -> SectionName {
        SectionName::MarketOverview
    }

    async fn collect(&self) -> SectionData {
        let record = self.fetch().await;
        if record.is_failed() {
            return SectionData::MarketOverview(SectionReport::failed(record));
        }
        let brief = InsightBrief {
            topic: "Indian market index",
            summary: summarize(&record.payload),
            count: 6,
            focus: "- Cover overall sentiment, banking vs IT, notable outliers and a brief outlook",
            deny: DEFAULT_DENY_LIST,
        };
        let insights = self.ctx.insights.generate(&brief).await;
        SectionData::MarketOverview(SectionReport::new(record, insights))
    }
}
