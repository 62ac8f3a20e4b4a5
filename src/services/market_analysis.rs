use async_trait::async_trait;

use crate::models::market::{StockMove, NOT_AVAILABLE};
use crate::models::record::{Insight, NormalizedRecord};
use crate::models::section::{AggregatedSnapshot, SectionData, SectionName};
use crate::services::ai_service::{clean_bullets, InsightGenerator};
use crate::services::source::DerivedSection;

const SOURCE_NAME: &str = "Market Analysis";
const NO_DATA: &str = "No data available";
const MAX_POINTS: usize = 9;

const ANALYSIS_DENY: &[&str] = &["analysis", "here", "following", "bullet"];
const SUMMARY_DENY: &[&str] = &["summary", "takeaway", "here", "following"];
const PREDICTION_DENY: &[&str] = &["prediction", "forecast", "here", "following"];

fn or_no_data(block: String) -> String {
    if block.trim().is_empty() { NO_DATA.to_string() } else { block }
}

fn movers(list: &[StockMove]) -> String {
    list.iter()
        .take(3)
        .map(|s| format!("- {}: {:+.2}% (INR {:.2})", s.name, s.change_percent, s.price))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compact text of every primary section for the analysis prompt.
/// Missing or failed sections read "No data available".
pub fn key_data_digest(snapshot: &AggregatedSnapshot) -> String {
    let usable = |name| snapshot.get(name).filter(|s| !s.is_failed());

    let sectors = match usable(SectionName::SectorMovement) {
        Some(SectionData::SectorMovement(r)) => r
            .record
            .payload
            .sectors
            .iter()
            .take(5)
            .map(|s| format!("- {}: {:.2}% change, {} advances, {} declines", s.sector_name, s.change_percent, s.advances, s.declines))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    };

    let institutional = match usable(SectionName::InstitutionalActivity) {
        Some(SectionData::InstitutionalActivity(r)) => {
            let a = &r.record.payload;
            format!(
                "FII: Buy {:.2} Cr, Sell {:.2} Cr, Net {:.2} Cr\nDII: Buy {:.2} Cr, Sell {:.2} Cr, Net {:.2} Cr",
                a.fii.buy, a.fii.sell, a.fii.net, a.dii.buy, a.dii.sell, a.dii.net
            )
        }
        _ => String::new(),
    };

    let indices = match usable(SectionName::MarketOverview) {
        Some(SectionData::MarketOverview(r)) => r
            .record
            .payload
            .available()
            .map(|(entry, q)| format!("- {}: Close {:.2}, Change {:.2}%", entry.name, q.close, q.change_percent))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    };

    let technical = match usable(SectionName::TechnicalSnapshot) {
        Some(SectionData::TechnicalSnapshot(r)) => r
            .record
            .payload
            .readings
            .iter()
            .map(|t| format!("- {}: Close {:.2}, RSI {:.2}", t.name, t.close, t.rsi))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    };

    let indicators = match usable(SectionName::FinancialIndicators) {
        Some(SectionData::FinancialIndicators(r)) => r
            .record
            .payload
            .indicators
            .iter()
            .filter(|i| i.value != NOT_AVAILABLE)
            .map(|i| format!("- {}: {} ({})", i.name, i.value, i.percent_change))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    };

    let (gainers, losers) = match usable(SectionName::TopPerformers) {
        Some(SectionData::TopPerformers(r)) => (movers(&r.record.payload.gainers), movers(&r.record.payload.losers)),
        _ => (String::new(), String::new()),
    };

    let (impact, india) = match usable(SectionName::NewsHighlights) {
        Some(SectionData::NewsHighlights(r)) => {
            let impact = if r.insights.is_unavailable() { String::new() } else { r.insights.to_text() };
            (impact, r.record.payload.india_news.join("\n"))
        }
        _ => (String::new(), String::new()),
    };

    [
        ("SECTOR MOVEMENT", sectors),
        ("INSTITUTIONAL ACTIVITY", institutional),
        ("KEY MARKET INDICES", indices),
        ("TECHNICAL INDICATORS", technical),
        ("FINANCIAL INDICATORS", indicators),
        ("TOP GAINERS", gainers),
        ("TOP LOSERS", losers),
        ("IMPACT NEWS HIGHLIGHTS", impact),
        ("INDIA NEWS HIGHLIGHTS", india),
    ]
    .into_iter()
    .map(|(title, block)| format!("=== {} ===\n{}", title, or_no_data(block)))
    .collect::<Vec<_>>()
    .join("\n\n")
}

fn analysis_prompt(digest: &str) -> String {
    format!(
        "As a senior market analyst, provide a comprehensive analysis of the Indian stock market based on the following data:\n\
        \n\
        {digest}\n\
        \n\
        Provide exactly 8-9 concise bullet points covering overall sentiment and trend, sector rotation, \
        institutional activity, the technical outlook, global and local factors, investment themes, \
        risks, market breadth and liquidity.\n\
        \n\
        Guidelines:\n\
        - Each point is a single clear sentence under 20 words, starting with a dash (-)\n\
        - Be specific and quantitative where possible\n\
        - Use a professional, formal tone"
    )
}

fn summary_prompt(analysis: &str) -> String {
    format!(
        "Based on this market analysis:\n\
        \n\
        {analysis}\n\
        \n\
        Provide exactly 8-9 key takeaways for investors.\n\
        \n\
        Guidelines:\n\
        - Each point is a single clear sentence under 15 words, starting with a dash (-)\n\
        - Say what investors should do or watch, covering opportunities and risks\n\
        - Include specific levels or targets where relevant"
    )
}

fn prediction_prompt(analysis: &str) -> String {
    format!(
        "You are a senior financial market strategist.\n\
        \n\
        Using the market analysis below:\n\
        \n\
        {analysis}\n\
        \n\
        Generate exactly 8-9 distinct predictions for the next trading day.\n\
        \n\
        - Each prediction is a single bullet point starting with a dash (-), under 35 words\n\
        - Give a brief rationale (technical level, macro factor or sentiment driver)\n\
        - Use specific index levels, percentage changes or price zones\n\
        - Cover both upside and downside possibilities without repeating an angle"
    )
}

fn wrap(name: SectionName, record: NormalizedRecord<Insight>) -> SectionData {
    match name {
        SectionName::MarketSummary => SectionData::MarketSummary(record),
        SectionName::MarketPredictions => SectionData::MarketPredictions(record),
        _ => SectionData::MarketAnalysis(record),
    }
}

/// One of the three narrative sections built by the text-generation service.
pub struct NarrativeSection {
    name: SectionName,
    deny: &'static [&'static str],
    insights: InsightGenerator,
}

impl NarrativeSection {
    pub fn analysis(insights: InsightGenerator) -> Self {
        Self { name: SectionName::MarketAnalysis, deny: ANALYSIS_DENY, insights }
    }

    pub fn summary(insights: InsightGenerator) -> Self {
        Self { name: SectionName::MarketSummary, deny: SUMMARY_DENY, insights }
    }

    pub fn predictions(insights: InsightGenerator) -> Self {
        Self { name: SectionName::MarketPredictions, deny: PREDICTION_DENY, insights }
    }

    /// Prompt for this section, or the reason it cannot be built.
    fn prompt(&self, snapshot: &AggregatedSnapshot) -> Result<String, String> {
        if self.name == SectionName::MarketAnalysis {
            if !snapshot.any_primary_succeeded() {
                return Err("no primary section succeeded".to_string());
            }
            return Ok(analysis_prompt(&key_data_digest(snapshot)));
        }
        let analysis = snapshot
            .analysis()
            .filter(|r| !r.is_failed() && !r.payload.is_unavailable())
            .ok_or_else(|| "market analysis unavailable".to_string())?;
        let text = analysis.payload.to_text();
        Ok(match self.name {
            SectionName::MarketPredictions => prediction_prompt(&text),
            _ => summary_prompt(&text),
        })
    }
}

#[async_trait]
impl DerivedSection for NarrativeSection {
    fn name(&self) -> SectionName {
        self.name
    }

    async fn derive(&self, snapshot: &AggregatedSnapshot) -> SectionData {
        let prompt = match self.prompt(snapshot) {
            Ok(p) => p,
            Err(reason) => {
                log::warn!("Skipping {}: {}", self.name, reason);
                return wrap(self.name, NormalizedRecord::failed_with(SOURCE_NAME, Insight::unavailable(), reason));
            }
        };

        let record = match self.insights.complete(&prompt).await {
            Ok(raw) => {
                let lines = clean_bullets(&raw, self.deny, MAX_POINTS);
                if lines.is_empty() {
                    NormalizedRecord::failed_with(SOURCE_NAME, Insight::unavailable(), "empty reply from text generation service")
                } else {
                    NormalizedRecord::ok(SOURCE_NAME, Insight::new(lines))
                }
            }
            Err(e) => {
                log::error!("Error generating {}: {}", self.name, e);
                NormalizedRecord::failed_with(SOURCE_NAME, Insight::unavailable(), e.to_string())
            }
        };
        wrap(self.name, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::{SectorMovement, SectorRow};
    use crate::models::section::SectionReport;
    use crate::services::ai_service::TextGenerator;
    use std::sync::Arc;

    struct Echo;

    #[async_trait]
    impl TextGenerator for Echo {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok("Here is the analysis:\n- Banks led gains\n- IT lagged\n- Forecast: choppy".to_string())
        }
    }

    fn sectors_ok() -> SectionData {
        let payload = SectorMovement {
            sectors: vec![SectorRow {
                sector_name: "Banking".into(),
                change_percent: 1.25,
                advances: 10,
                declines: 2,
                num_companies: 12,
            }],
        };
        SectionData::SectorMovement(SectionReport::new(NormalizedRecord::ok("Trendlyne", payload), Insight::unavailable()))
    }

    #[test]
    fn test_digest_marks_failed_sections() {
        let mut snap = AggregatedSnapshot::new();
        snap.insert(sectors_ok());
        snap.insert(SectionData::failed(SectionName::InstitutionalActivity, "blocked"));
        let digest = key_data_digest(&snap);
        assert!(digest.contains("- Banking: 1.25% change, 10 advances, 2 declines"));
        assert!(digest.contains("=== INSTITUTIONAL ACTIVITY ===\nNo data available"));
        assert!(digest.contains("=== TOP LOSERS ===\nNo data available"));
    }

    #[tokio::test]
    async fn test_analysis_fails_without_any_primary_section() {
        let section = NarrativeSection::analysis(InsightGenerator::new(Arc::new(Echo)));
        let mut snap = AggregatedSnapshot::new();
        snap.insert(SectionData::failed(SectionName::MarketOverview, "down"));
        let out = section.derive(&snap).await;
        assert_eq!(out.name(), SectionName::MarketAnalysis);
        assert!(out.is_failed());
    }

    #[tokio::test]
    async fn test_analysis_applies_deny_list() {
        let section = NarrativeSection::analysis(InsightGenerator::new(Arc::new(Echo)));
        let mut snap = AggregatedSnapshot::new();
        snap.insert(sectors_ok());
        match section.derive(&snap).await {
            SectionData::MarketAnalysis(r) => {
                assert_eq!(r.payload.lines(), &["- Banks led gains", "- IT lagged", "- Forecast: choppy"]);
            }
            other => panic!("unexpected section {:?}", other.name()),
        }
    }

    #[tokio::test]
    async fn test_predictions_need_analysis() {
        let section = NarrativeSection::predictions(InsightGenerator::new(Arc::new(Echo)));
        let out = section.derive(&AggregatedSnapshot::new()).await;
        assert!(out.is_failed());
        assert_eq!(out.error(), Some("market analysis unavailable"));

        let mut snap = AggregatedSnapshot::new();
        snap.insert(SectionData::MarketAnalysis(NormalizedRecord::ok(SOURCE_NAME, Insight::new(vec!["- Banks led".into()]))));
        match section.derive(&snap).await {
            // "forecast" is on the predictions deny-list
            SectionData::MarketPredictions(r) => assert_eq!(r.payload.lines(), &["- Banks led gains", "- IT lagged"]),
            other => panic!("unexpected section {:?}", other.name()),
        }
    }
}
