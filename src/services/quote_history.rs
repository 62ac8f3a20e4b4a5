use chrono::{DateTime, NaiveDate};

use crate::error::SourceError;
use crate::utils::http::ScrapeSession;
use crate::utils::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Daily bars from the Yahoo v8 chart endpoint, borrowed from the caller's session.
pub struct QuoteHistory<'a> {
    session: &'a ScrapeSession,
    base_url: &'a str,
    retry: &'a RetryPolicy,
}

impl<'a> QuoteHistory<'a> {
    pub fn new(session: &'a ScrapeSession, base_url: &'a str, retry: &'a RetryPolicy) -> Self {
        Self { session, base_url, retry }
    }

    /// range: 5d / 1mo / 6mo ...
    pub async fn daily_bars(&self, symbol: &str, range: &str) -> Result<Vec<DailyBar>, SourceError> {
        let url = format!(
            "{}/v8/finance/chart/{}?range={}&interval=1d",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(symbol),
            range
        );
        let text = self.session.get_text_retrying(self.retry, &url).await?;
        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| SourceError::parse(format!("chart JSON for {}: {}", symbol, e)))?;
        parse_chart(&json, symbol)
    }

    pub async fn closes(&self, symbol: &str, range: &str) -> Result<Vec<f64>, SourceError> {
        Ok(self.daily_bars(symbol, range).await?.into_iter().map(|b| b.close).collect())
    }
}

/// Rows with a null close are skipped; null open/high/low fall back to the close.
pub fn parse_chart(json: &serde_json::Value, symbol: &str) -> Result<Vec<DailyBar>, SourceError> {
    let chart = json.get("chart").ok_or_else(|| SourceError::parse("missing chart"))?;
    if let Some(desc) = chart.get("error").and_then(|e| e.get("description")).and_then(|d| d.as_str()) {
        return Err(SourceError::parse(format!("{}: {}", symbol, desc)));
    }
    let result = chart
        .get("result")
        .and_then(|r| r.as_array())
        .and_then(|r| r.first())
        .ok_or_else(|| SourceError::no_match(format!("chart result for {}", symbol)))?;

    let timestamps = result.get("timestamp").and_then(|t| t.as_array()).cloned().unwrap_or_default();
    let quote = result
        .get("indicators")
        .and_then(|i| i.get("quote"))
        .and_then(|q| q.as_array())
        .and_then(|q| q.first())
        .ok_or_else(|| SourceError::parse(format!("missing quote block for {}", symbol)))?;

    let series = |key: &str| -> Vec<Option<f64>> {
        quote
            .get(key)
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().map(|v| v.as_f64()).collect())
            .unwrap_or_default()
    };
    let (opens, highs, lows, closes) = (series("open"), series("high"), series("low"), series("close"));

    let mut bars = Vec::with_capacity(closes.len());
    for (i, close) in closes.iter().enumerate() {
        let Some(close) = *close else { continue };
        let Some(date) = timestamps
            .get(i)
            .and_then(|t| t.as_i64())
            .and_then(|t| DateTime::from_timestamp(t, 0))
            .map(|d| d.date_naive())
        else {
            continue;
        };
        let pick = |s: &[Option<f64>]| s.get(i).copied().flatten().unwrap_or(close);
        bars.push(DailyBar {
            date,
            open: pick(&opens),
            high: pick(&highs),
            low: pick(&lows),
            close,
        });
    }
    Ok(bars)
}
