use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::error::SourceError;
use crate::models::market::{FlowFigures, InstitutionalActivity};
use crate::models::record::NormalizedRecord;
use crate::models::section::{SectionData, SectionName, SectionReport};
use crate::services::ai_service::{InsightBrief, DEFAULT_DENY_LIST};
use crate::services::source::{SectionSource, SourceContext};
use crate::utils::http::ScrapeSession;
use crate::utils::parse::parse_number;

const SOURCE_NAME: &str = "FII/DII";
const TRENDLYNE_FII_PATH: &str = "/macro-data/fii-dii/latest/cash-pastmonth/";

/// Which table rows a candidate inspects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowPick {
    /// Data rows 1 and 2 (row 0 is the header).
    LatestTwo,
    /// Row 1 if present, else row 0.
    SecondElseFirst,
}

#[derive(Debug, Clone)]
pub struct FlowCandidate {
    pub source: &'static str,
    pub url: String,
    pub selectors: &'static [&'static str],
    pub rows: RowPick,
}

pub const MONEYCONTROL_SELECTORS: &[&str] = &[".mctable1", "table.mctable", "#fii-dii-table", ".data-table"];
pub const TRENDLYNE_SELECTORS: &[&str] = &[".table", ".data-table", "#fii-dii-data", ".table-responsive table"];

/// Six numbers in order: FII buy, sell, net, DII buy, sell, net.
/// Non-numeric cells (dates, labels) are skipped.
fn flows_from_row(row: ElementRef, td_sel: &Selector) -> Option<(FlowFigures, FlowFigures)> {
    let values: Vec<f64> = row
        .select(td_sel)
        .filter_map(|td| parse_number(&td.text().collect::<String>()))
        .collect();
    if values.len() < 6 {
        return None;
    }
    Some((
        FlowFigures { buy: values[0], sell: values[1], net: values[2] },
        FlowFigures { buy: values[3], sell: values[4], net: values[5] },
    ))
}

/// Evaluate one candidate page against its selector list.
pub fn parse_flow_page(html: &str, candidate: &FlowCandidate) -> Result<InstitutionalActivity, SourceError> {
    let doc = Html::parse_document(html);
    let tr_sel = Selector::parse("tr").map_err(|e| SourceError::parse(e.to_string()))?;
    let td_sel = Selector::parse("td").map_err(|e| SourceError::parse(e.to_string()))?;

    for css in candidate.selectors {
        let Ok(sel) = Selector::parse(css) else { continue };
        let Some(table) = doc.select(&sel).next() else { continue };
        let rows: Vec<ElementRef> = table.select(&tr_sel).collect();
        let picks: Vec<ElementRef> = match candidate.rows {
            RowPick::LatestTwo => rows.iter().skip(1).take(2).copied().collect(),
            RowPick::SecondElseFirst => rows.get(1).or_else(|| rows.first()).copied().into_iter().collect(),
        };
        if let Some((fii, dii)) = picks.into_iter().find_map(|row| flows_from_row(row, &td_sel)) {
            log::info!("Institutional data from {} using selector {}", candidate.source, css);
            return Ok(InstitutionalActivity {
                fii,
                dii,
                source: candidate.source.to_string(),
            });
        }
    }
    Err(SourceError::Insufficient {
        what: format!("numeric FII/DII cells on {}", candidate.source),
        needed: 6,
        got: 0,
    })
}

pub struct InstitutionalSource {
    ctx: SourceContext,
    candidates: Vec<FlowCandidate>,
}

impl InstitutionalSource {
    pub fn new(ctx: SourceContext) -> Self {
        let sources = &ctx.settings.sources;
        let candidates = vec![
            FlowCandidate {
                source: "MoneyControl",
                url: sources.moneycontrol_fii.clone(),
                selectors: MONEYCONTROL_SELECTORS,
                rows: RowPick::LatestTwo,
            },
            FlowCandidate {
                source: "Trendlyne",
                url: format!("{}{}", sources.trendlyne.trim_end_matches('/'), TRENDLYNE_FII_PATH),
                selectors: TRENDLYNE_SELECTORS,
                rows: RowPick::SecondElseFirst,
            },
        ];
        Self { ctx, candidates }
    }

    /// Candidates in priority order; the first one with a valid row wins.
    /// When all fail the payload is zeros with source "No data available".
    pub async fn fetch(&self) -> NormalizedRecord<InstitutionalActivity> {
        let session = match self.ctx.open_session("institutional_activity") {
            Ok(s) => s,
            Err(e) => return NormalizedRecord::failed(SOURCE_NAME, e.to_string()),
        };

        let mut errors = Vec::new();
        for candidate in &self.candidates {
            match self.try_candidate(&session, candidate).await {
                Ok(activity) => return NormalizedRecord::ok(candidate.source, activity),
                Err(e) => {
                    log::warn!("Institutional candidate {} failed: {}", candidate.source, e);
                    errors.push(format!("{}: {}", candidate.source, e));
                }
            }
        }
        log::warn!("No institutional data could be scraped from any source");
        NormalizedRecord::failed(SOURCE_NAME, errors.join("; "))
    }

    async fn try_candidate(&self, session: &ScrapeSession, candidate: &FlowCandidate) -> Result<InstitutionalActivity, SourceError> {
        let html = session.get_text_retrying(&self.ctx.settings.retry, &candidate.url).await?;
        parse_flow_page(&html, candidate)
    }
}

pub fn summarize(activity: &InstitutionalActivity) -> String {
    format!(
        "Institutional Activity:\n\
        FII: Buy INR{:.2} Cr, Sell INR{:.2} Cr, Net INR{:.2} Cr\n\
        DII: Buy INR{:.2} Cr, Sell INR{:.2} Cr, Net INR{:.2} Cr",
        activity.fii.buy, activity.fii.sell, activity.fii.net,
        activity.dii.buy, activity.dii.sell, activity.dii.net,
    )
}

#[async_trait]
impl SectionSource for InstitutionalSource {
    fn name(&self) -> SectionName {
        SectionName::InstitutionalActivity
    }

    async fn collect(&self) -> SectionData {
        let record = self.fetch().await;
        if record.is_failed() {
            return SectionData::InstitutionalActivity(SectionReport::failed(record));
        }
        let brief = InsightBrief {
            topic: "institutional investment",
            summary: summarize(&record.payload),
            count: 7,
            focus: "- Cover what the FII/DII pattern indicates, likely drivers, market impact and what retail investors should watch",
            deny: DEFAULT_DENY_LIST,
        };
        let insights = self.ctx.insights.generate(&brief).await;
        SectionData::InstitutionalActivity(SectionReport::new(record, insights))
    }
}
