use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::error::SourceError;
use crate::models::market::{StockMove, TopPerformers};
use crate::models::record::NormalizedRecord;
use crate::models::section::{SectionData, SectionName, SectionReport};
use crate::services::ai_service::InsightBrief;
use crate::services::source::{SectionSource, SourceContext};
use crate::utils::http::ScrapeSession;
use crate::utils::parse::{parse_change_cell, parse_number, squash_whitespace};

const SOURCE_NAME: &str = "Trendlyne";
const GAINERS_PATH: &str = "/stock-screeners/price-based/top-gainers/today/";
const LOSERS_PATH: &str = "/stock-screeners/price-based/top-losers/today/";
const MAX_ROWS: usize = 10;
const DENY: &[&str] = &["insight", "here", "following", "bullet"];

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::parse(format!("selector {}: {}", css, e)))
}

/// Full company name: link data-title / data-original-title / title,
/// then a titled span, then the visible text.
fn company_name(first: ElementRef) -> Result<String, SourceError> {
    let link_sel = selector("a")?;
    let span_sel = selector("span[title]")?;

    if let Some(link) = first.select(&link_sel).next() {
        for attr in ["data-title", "data-original-title", "title"] {
            if let Some(v) = link.value().attr(attr).map(str::trim).filter(|v| !v.is_empty()) {
                return Ok(v.to_string());
            }
        }
    }
    if let Some(v) = first
        .select(&span_sel)
        .next()
        .and_then(|s| s.value().attr("title"))
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Ok(v.to_string());
    }
    Ok(squash_whitespace(&first.text().collect::<String>()))
}

struct Columns {
    price: usize,
    change: Option<usize>,
}

fn detect_columns(headers: &[String]) -> Columns {
    let price = headers
        .iter()
        .position(|h| ["LTP", "Price", "Last"].iter().any(|t| h.contains(t)))
        .unwrap_or(1);
    let change = headers
        .iter()
        .position(|h| h.contains("Change(%)") || h.contains("Change %"))
        .or_else(|| headers.iter().position(|h| h.contains("Change")));
    Columns { price, change }
}

/// Parse the first `table.table` on a screener page, at most ten rows.
/// Rows without a numeric price are skipped; a table with no usable rows
/// is an error so the caller can mark that side missing.
pub fn parse_screener_table(html: &str) -> Result<Vec<StockMove>, SourceError> {
    let doc = Html::parse_document(html);
    let table_sel = selector("table.table")?;
    let th_sel = selector("thead th")?;
    let row_sel = selector("tbody tr")?;
    let td_sel = selector("td")?;

    let table = doc.select(&table_sel).next().ok_or_else(|| SourceError::no_match("screener table"))?;
    let headers: Vec<String> = table.select(&th_sel).map(|th| squash_whitespace(&th.text().collect::<String>())).collect();
    let cols = detect_columns(&headers);

    let mut stocks = Vec::new();
    for tr in table.select(&row_sel) {
        if stocks.len() >= MAX_ROWS {
            break;
        }
        let cells: Vec<ElementRef> = tr.select(&td_sel).collect();
        let Some(first) = cells.first() else { continue };
        let Some(price) = cells.get(cols.price).and_then(|c| parse_number(&c.text().collect::<String>())) else {
            log::debug!("Skipping screener row without numeric price");
            continue;
        };
        let (change, change_percent) = match cols.change.and_then(|i| cells.get(i)) {
            Some(cell) => {
                let text = squash_whitespace(&cell.text().collect::<String>());
                parse_change_cell(&text).unwrap_or_else(|| {
                    let v = parse_number(&text).unwrap_or(0.0);
                    if text.contains('%') { (0.0, v) } else { (v, 0.0) }
                })
            }
            None => (0.0, 0.0),
        };
        let name = company_name(*first)?;
        if name.is_empty() {
            continue;
        }
        stocks.push(StockMove { name, price, change, change_percent });
    }

    if stocks.is_empty() {
        return Err(SourceError::Insufficient { what: "screener rows".to_string(), needed: 1, got: 0 });
    }
    Ok(stocks)
}

/// Losers always carry negative changes regardless of how the page signs them.
fn force_negative(stocks: &mut [StockMove]) {
    for s in stocks {
        s.change = -s.change.abs();
        s.change_percent = -s.change_percent.abs();
    }
}

pub struct TopPerformersSource {
    ctx: SourceContext,
}

impl TopPerformersSource {
    pub fn new(ctx: SourceContext) -> Self {
        Self { ctx }
    }

    /// Gainers and losers are independent; one side missing is `partial`.
    pub async fn fetch(&self) -> NormalizedRecord<TopPerformers> {
        let session = match self.ctx.open_session("top_performers") {
            Ok(s) => s,
            Err(e) => return NormalizedRecord::failed(SOURCE_NAME, e.to_string()),
        };
        let base = self.ctx.settings.sources.trendlyne.trim_end_matches('/').to_string();
        let (gainers, losers) = futures::join!(
            self.fetch_side(&session, format!("{}{}", base, GAINERS_PATH)),
            self.fetch_side(&session, format!("{}{}", base, LOSERS_PATH)),
        );

        match (gainers, losers) {
            (Ok(gainers), Ok(mut losers)) => {
                force_negative(&mut losers);
                log::info!("Scraped {} gainers, {} losers", gainers.len(), losers.len());
                NormalizedRecord::ok(SOURCE_NAME, TopPerformers { gainers, losers })
            }
            (Ok(gainers), Err(e)) => {
                NormalizedRecord::partial(SOURCE_NAME, TopPerformers { gainers, losers: vec![] }, format!("losers unavailable: {}", e))
            }
            (Err(e), Ok(mut losers)) => {
                force_negative(&mut losers);
                NormalizedRecord::partial(SOURCE_NAME, TopPerformers { gainers: vec![], losers }, format!("gainers unavailable: {}", e))
            }
            (Err(g), Err(l)) => {
                log::error!("Top performers unavailable: gainers: {}; losers: {}", g, l);
                NormalizedRecord::failed(SOURCE_NAME, format!("gainers: {}; losers: {}", g, l))
            }
        }
    }

    async fn fetch_side(&self, session: &ScrapeSession, url: String) -> Result<Vec<StockMove>, SourceError> {
        let html = session.get_text_retrying(&self.ctx.settings.retry, &url).await?;
        parse_screener_table(&html)
    }
}

fn format_moves(moves: &[StockMove]) -> String {
    if moves.is_empty() {
        return "No data available".to_string();
    }
    moves
        .iter()
        .take(5)
        .map(|s| format!("{}: INR{:.2}, Change: {:+.2} ({:+.2}%)", s.name, s.price, s.change, s.change_percent))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl SectionSource for TopPerformersSource {
    fn name(&self) -> SectionName {
        SectionName::TopPerformers
    }

    async fn collect(&self) -> SectionData {
        let record = self.fetch().await;
        if record.is_failed() {
            return SectionData::TopPerformers(SectionReport::failed(record));
        }
        let brief = InsightBrief {
            topic: "top gainers and losers",
            summary: format!(
                "Date: {}\n\nTOP GAINERS:\n{}\n\nTOP LOSERS:\n{}",
                chrono::Local::now().format("%B %d, %Y"),
                format_moves(&record.payload.gainers),
                format_moves(&record.payload.losers)
            ),
            count: 5,
            focus: "- Cover sector patterns among movers, the breadth of the move and actionable takeaways",
            deny: DENY,
        };
        let insights = self.ctx.insights.generate(&brief).await;
        SectionData::TopPerformers(SectionReport::new(record, insights))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAINERS: &str = r#"
        <table class="table">
          <thead><tr><th>Stock</th><th>LTP</th><th>Day Change(%)</th><th>Volume</th></tr></thead>
          <tbody>
            <tr><td><a data-title="Hindustan Aeronautics Ltd." href="/x">HAL</a></td><td>4,210.50</td><td>201.30 (5.0%)</td><td>1.2M</td></tr>
            <tr><td><span title="Bharat Electronics Ltd.">BEL</span></td><td>INR 310.20</td><td>12.10 (4.1%)</td><td>900K</td></tr>
            <tr><td>Broken Co</td><td>--</td><td>1 (1%)</td><td>1</td></tr>
            <tr><td>Plain Name Ltd</td><td>99.5</td><td>2.5</td><td>1</td></tr>
          </tbody>
        </table>"#;

    #[test]
    fn test_parse_screener_table() {
        let stocks = parse_screener_table(GAINERS).unwrap();
        assert_eq!(stocks.len(), 3);
        assert_eq!(stocks[0].name, "Hindustan Aeronautics Ltd.");
        assert_eq!(stocks[0].price, 4210.5);
        assert_eq!(stocks[0].change, 201.3);
        assert_eq!(stocks[0].change_percent, 5.0);
        assert_eq!(stocks[1].name, "Bharat Electronics Ltd.");
        assert_eq!(stocks[2].name, "Plain Name Ltd");
        assert_eq!(stocks[2].change, 2.5);
    }

    #[test]
    fn test_price_falls_back_to_second_column() {
        let html = r#"<table class="table"><thead><tr><th>Name</th><th>Close</th><th>Change</th></tr></thead>
            <tbody><tr><td>ABC</td><td>50</td><td>-1.5 (-2.9%)</td></tr></tbody></table>"#;
        let stocks = parse_screener_table(html).unwrap();
        assert_eq!(stocks[0].price, 50.0);
        assert_eq!(stocks[0].change_percent, -2.9);
    }

    #[test]
    fn test_malformed_table_is_error() {
        let html = r#"<table class="table"><thead><tr><th>Stock</th><th>LTP</th></tr></thead>
            <tbody><tr><td>ABC</td><td>n/a</td></tr></tbody></table>"#;
        assert!(parse_screener_table(html).is_err());
        assert!(parse_screener_table("<div>captcha</div>").is_err());
    }

    #[test]
    fn test_losers_forced_negative() {
        let mut losers = vec![StockMove { name: "X".into(), price: 10.0, change: 1.2, change_percent: 10.7 }];
        force_negative(&mut losers);
        assert_eq!(losers[0].change, -1.2);
        assert_eq!(losers[0].change_percent, -10.7);
    }
}
