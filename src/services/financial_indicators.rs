use async_trait::async_trait;

use crate::error::SourceError;
use crate::models::market::{FinancialIndicators, IndicatorData, NOT_AVAILABLE};
use crate::models::record::NormalizedRecord;
use crate::models::section::{SectionData, SectionName, SectionReport};
use crate::services::ai_service::{InsightBrief, DEFAULT_DENY_LIST};
use crate::services::quote_history::QuoteHistory;
use crate::services::source::{SectionSource, SourceContext};
use crate::utils::http::ScrapeSession;
use crate::utils::parse::parse_number;

const SOURCE_NAME: &str = "Yahoo Finance / Alpha Vantage";
const TROY_OUNCE_GRAMS: f64 = 31.1035;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Remarks {
    UpDown,
    Rupee,
}

struct YahooIndicator {
    name: &'static str,
    symbol: &'static str,
    prefix: &'static str,
    suffix: &'static str,
    remarks: Remarks,
}

const YAHOO_INDICATORS: [YahooIndicator; 6] = [
    YahooIndicator { name: "Dow Jones", symbol: "^DJI", prefix: "", suffix: "", remarks: Remarks::UpDown },
    YahooIndicator { name: "Nasdaq", symbol: "^IXIC", prefix: "", suffix: "", remarks: Remarks::UpDown },
    YahooIndicator { name: "S&P 500", symbol: "^GSPC", prefix: "", suffix: "", remarks: Remarks::UpDown },
    YahooIndicator { name: "Nikkei", symbol: "^N225", prefix: "", suffix: "", remarks: Remarks::UpDown },
    YahooIndicator { name: "USD/INR", symbol: "INR=X", prefix: "₹", suffix: "", remarks: Remarks::Rupee },
    YahooIndicator { name: "10Y Yield", symbol: "^TNX", prefix: "", suffix: "%", remarks: Remarks::UpDown },
];

/// (display name, Alpha Vantage function)
const COMMODITIES: [(&str, &str); 2] = [("Crude Oil (WTI)", "WTI"), ("Crude Oil (Brent)", "BRENT")];
const GOLD_NAME: &str = "Gold";

pub fn percent_change(current: f64, previous: f64) -> String {
    if previous == 0.0 {
        return NOT_AVAILABLE.to_string();
    }
    format!("{:.2}%", (current - previous) / previous * 100.0)
}

fn indicator_from_pair(name: &str, current: f64, previous: Option<f64>, prefix: &str, suffix: &str, remarks: Remarks) -> IndicatorData {
    let value = format!("{}{:.2}{}", prefix, current, suffix);
    match previous {
        Some(prev) => IndicatorData {
            name: name.to_string(),
            value,
            percent_change: percent_change(current, prev),
            remarks: match (remarks, current > prev) {
                (Remarks::Rupee, true) => "INR weakened",
                (Remarks::Rupee, false) => "INR strengthened",
                (Remarks::UpDown, true) => "Up",
                (Remarks::UpDown, false) => "Down",
            }
            .to_string(),
        },
        None => IndicatorData {
            name: name.to_string(),
            value,
            percent_change: NOT_AVAILABLE.to_string(),
            remarks: "Previous data unavailable".to_string(),
        },
    }
}

/// Latest two numeric points of an Alpha Vantage commodity series (newest first).
pub fn parse_commodity_series(json: &serde_json::Value) -> Result<(f64, Option<f64>), SourceError> {
    check_alpha_vantage_notice(json)?;
    let values: Vec<f64> = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| SourceError::parse("missing data array"))?
        .iter()
        .filter_map(|row| row.get("value").and_then(|v| v.as_str()).and_then(parse_number))
        .take(2)
        .collect();
    match values.as_slice() {
        [] => Err(SourceError::Insufficient { what: "commodity prices".to_string(), needed: 1, got: 0 }),
        [current] => Ok((*current, None)),
        [current, prev, ..] => Ok((*current, Some(*prev))),
    }
}

/// (USD per troy ounce, last refreshed)
pub fn parse_gold_quote(json: &serde_json::Value) -> Result<(f64, String), SourceError> {
    check_alpha_vantage_notice(json)?;
    let rate = json
        .get("Realtime Currency Exchange Rate")
        .ok_or_else(|| SourceError::parse("Invalid response from API"))?;
    let price = rate
        .get("5. Exchange Rate")
        .and_then(|v| v.as_str())
        .and_then(parse_number)
        .ok_or_else(|| SourceError::parse("missing exchange rate"))?;
    let refreshed = rate.get("6. Last Refreshed").and_then(|v| v.as_str()).unwrap_or("").to_string();
    Ok((price, refreshed))
}

/// Alpha Vantage answers 200 with a "Note"/"Information" body when throttled.
fn check_alpha_vantage_notice(json: &serde_json::Value) -> Result<(), SourceError> {
    if let Some(msg) = json.get("Error Message").and_then(|v| v.as_str()) {
        return Err(SourceError::parse(format!("API Error: {}", msg)));
    }
    for key in ["Note", "Information"] {
        if let Some(msg) = json.get(key).and_then(|v| v.as_str()) {
            return Err(SourceError::Throttled { message: msg.to_string() });
        }
    }
    Ok(())
}

pub struct FinancialIndicatorsSource {
    ctx: SourceContext,
}

impl FinancialIndicatorsSource {
    pub fn new(ctx: SourceContext) -> Self {
        Self { ctx }
    }

    /// Every indicator is independent: a failure becomes an "N/A" entry and
    /// the others carry on.
    pub async fn fetch(&self) -> NormalizedRecord<FinancialIndicators> {
        let session = match self.ctx.open_session("financial_indicators") {
            Ok(s) => s,
            Err(e) => return NormalizedRecord::failed(SOURCE_NAME, e.to_string()),
        };

        let mut indicators = self.fetch_yahoo(&session).await;
        let usd_inr = indicators
            .iter()
            .find(|i| i.name == "USD/INR" && i.is_available())
            .and_then(|i| parse_number(&i.value));

        match &self.ctx.settings.alpha_vantage_key {
            Some(_) => {
                indicators.extend(self.fetch_commodities(&session).await);
                indicators.push(self.fetch_gold(&session, usd_inr).await);
            }
            None => log::warn!("ALPHA_VANTAGE_API_KEY not set; skipping crude oil and gold"),
        }

        let available = indicators.iter().filter(|i| i.is_available()).count();
        let total = indicators.len();
        let payload = FinancialIndicators { indicators };
        match available {
            0 => NormalizedRecord::failed_with(SOURCE_NAME, payload, "No indicator data available"),
            n if n < total => NormalizedRecord::partial(SOURCE_NAME, payload, format!("{} of {} indicators unavailable", total - n, total)),
            _ => NormalizedRecord::ok(SOURCE_NAME, payload),
        }
    }

    async fn fetch_yahoo(&self, session: &ScrapeSession) -> Vec<IndicatorData> {
        let history = QuoteHistory::new(session, &self.ctx.settings.sources.yahoo_chart, &self.ctx.settings.retry);
        let mut out = Vec::with_capacity(YAHOO_INDICATORS.len());
        for spec in &YAHOO_INDICATORS {
            let item = match history.closes(spec.symbol, "5d").await {
                Ok(closes) => match closes.as_slice() {
                    [] => {
                        log::info!("No data available for {}", spec.symbol);
                        IndicatorData { remarks: "No data available".to_string(), ..IndicatorData::unavailable(spec.name) }
                    }
                    [.., prev, last] => indicator_from_pair(spec.name, *last, Some(*prev), spec.prefix, spec.suffix, spec.remarks),
                    [last] => indicator_from_pair(spec.name, *last, None, spec.prefix, spec.suffix, spec.remarks),
                },
                Err(e) => {
                    log::error!("Error fetching data for {}: {}", spec.symbol, e);
                    IndicatorData { remarks: format!("Error: {}", e), ..IndicatorData::unavailable(spec.name) }
                }
            };
            out.push(item);
        }
        out
    }

    fn alpha_vantage_url(&self, query: &str) -> Result<String, SourceError> {
        let key = self
            .ctx
            .settings
            .alpha_vantage_key
            .as_ref()
            .ok_or_else(|| SourceError::MissingCredential { name: "ALPHA_VANTAGE_API_KEY".to_string() })?;
        Ok(format!(
            "{}/query?{}&apikey={}",
            self.ctx.settings.sources.alpha_vantage.trim_end_matches('/'),
            query,
            urlencoding::encode(key.expose())
        ))
    }

    async fn alpha_vantage_json(&self, session: &ScrapeSession, query: &str) -> Result<serde_json::Value, SourceError> {
        let url = self.alpha_vantage_url(query)?;
        let url = url.as_str();
        self.ctx
            .settings
            .retry
            .run_async("alpha_vantage", move || async move {
                let json = session.get_json(url).await?;
                check_alpha_vantage_notice(&json)?;
                Ok::<_, SourceError>(json)
            })
            .await
    }

    async fn fetch_commodities(&self, session: &ScrapeSession) -> Vec<IndicatorData> {
        let mut out = Vec::new();
        for (name, function) in COMMODITIES {
            let query = format!("function={}&interval=daily", function);
            let item = match self.alpha_vantage_json(session, &query).await.and_then(|j| parse_commodity_series(&j)) {
                Ok((current, prev)) => indicator_from_pair(name, current, prev, "$", "", Remarks::UpDown),
                Err(e) => {
                    log::warn!("Could not retrieve {} from Alpha Vantage: {}", name, e);
                    IndicatorData { remarks: "Data unavailable".to_string(), ..IndicatorData::unavailable(name) }
                }
            };
            out.push(item);
        }
        out
    }

    /// Spot gold in ₹ per 10 g when USD/INR is known, otherwise $ per ounce.
    async fn fetch_gold(&self, session: &ScrapeSession, usd_inr: Option<f64>) -> IndicatorData {
        let query = "function=CURRENCY_EXCHANGE_RATE&from_currency=XAU&to_currency=USD";
        match self.alpha_vantage_json(session, query).await.and_then(|j| parse_gold_quote(&j)) {
            Ok((usd_per_oz, refreshed)) => {
                let value = match usd_inr {
                    Some(rate) => format!("₹{:.2}/10g", usd_per_oz * rate * (10.0 / TROY_OUNCE_GRAMS)),
                    None => format!("${:.2}/oz", usd_per_oz),
                };
                IndicatorData {
                    name: GOLD_NAME.to_string(),
                    value,
                    percent_change: NOT_AVAILABLE.to_string(),
                    remarks: format!("Last updated: {}", refreshed),
                }
            }
            Err(e) => {
                log::warn!("Could not retrieve gold price: {}", e);
                IndicatorData { remarks: format!("API Error: {}", e), ..IndicatorData::unavailable(GOLD_NAME) }
            }
        }
    }
}

pub fn summarize(indicators: &FinancialIndicators) -> String {
    indicators
        .indicators
        .iter()
        .filter(|i| i.is_available())
        .map(|i| format!("{}: {} ({}), {}", i.name, i.value, i.percent_change, i.remarks))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl SectionSource for FinancialIndicatorsSource {
    fn name(&self) -> SectionName {
        SectionName::FinancialIndicators
    }

    async fn collect(&self) -> SectionData {
        let record = self.fetch().await;
        if record.is_failed() {
            return SectionData::FinancialIndicators(SectionReport::failed(record));
        }
        let brief = InsightBrief {
            topic: "financial indicators",
            summary: summarize(&record.payload),
            count: 6,
            focus: "- Cover global cues, the rupee, bond yields and commodities and their impact on Indian markets",
            deny: DEFAULT_DENY_LIST,
        };
        let insights = self.ctx.insights.generate(&brief).await;
        SectionData::FinancialIndicators(SectionReport::new(record, insights))
    }
}
