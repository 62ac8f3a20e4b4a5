use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;

use crate::error::SourceError;
use crate::models::market::{SectorMovement, SectorRow};
use crate::models::record::NormalizedRecord;
use crate::models::section::{SectionData, SectionName, SectionReport};
use crate::services::ai_service::{InsightBrief, DEFAULT_DENY_LIST};
use crate::services::source::{SectionSource, SourceContext};
use crate::utils::parse::{parse_count, parse_number, squash_whitespace};

const SOURCE_NAME: &str = "Trendlyne";
const SECTOR_PATH: &str = "/equity/sector-industry-analysis/sector/day/";
const TABLE_SELECTORS: [&str; 4] = [
    ".table-responsive table",
    ".dataTables_wrapper table",
    ".table",
    "#sectors-table",
];
const MAX_SECTORS: usize = 11;

/// (standard sector, terms). First match wins, so order matters.
const SECTOR_TERMS: [(&str, &[&str]); 11] = [
    ("Information Technology", &["software", "tech", "information"]),
    ("Banking & Financial Services", &["bank", "finance", "financial", "nbfc"]),
    ("Pharmaceuticals & Healthcare", &["pharma", "health", "medical", "drug"]),
    ("Energy", &["energy", "oil", "gas", "petrol", "power"]),
    ("FMCG", &["fmcg", "consumer goods"]),
    ("Automobiles", &["auto", "automobile", "vehicle"]),
    ("Realty", &["real estate", "realty", "property"]),
    ("Infrastructure", &["infra", "construction", "cement"]),
    ("Metals and Mining", &["metal", "steel", "mining", "mineral"]),
    ("Telecom", &["telecom", "communication"]),
    ("Agriculture and Chemicals", &["agri", "chemical", "fertilizer"]),
];

/// Map a raw Trendlyne sector label onto one of the standard sectors.
/// Terms only match at the start of a word ("bank" covers "Banks" and
/// "Banking", "tech" stays out of "Biotechnology"); "IT" must be a whole word.
pub fn map_to_standard_sector(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    if words.contains(&"it") {
        return SECTOR_TERMS[0].0.to_string();
    }
    let padded = format!(" {}", words.join(" "));
    for (sector, terms) in SECTOR_TERMS {
        if terms.iter().any(|t| padded.contains(&format!(" {}", t))) {
            return sector.to_string();
        }
    }
    title_case(raw)
}

fn title_case(raw: &str) -> String {
    raw.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn cell_text(cell: &ElementRef) -> String {
    squash_whitespace(&cell.text().collect::<String>())
}

/// Rows need at least five cells: name, change %, -, advances, declines.
/// Rows with non-numeric cells are skipped; later rows for the same
/// standard sector replace earlier ones.
fn rows_from_table(table: ElementRef, row_sel: &Selector, td_sel: &Selector) -> Vec<SectorRow> {
    let mut by_sector: BTreeMap<String, SectorRow> = BTreeMap::new();
    for row in table.select(row_sel) {
        let cells: Vec<ElementRef> = row.select(td_sel).collect();
        if cells.len() < 5 {
            continue;
        }
        let name = cell_text(&cells[0]);
        let (Some(change), Some(advances), Some(declines)) = (
            parse_number(&cell_text(&cells[1])),
            parse_count(&cell_text(&cells[3])),
            parse_count(&cell_text(&cells[4])),
        ) else {
            log::debug!("Skipping sector row '{}': non-numeric cells", name);
            continue;
        };
        if name.is_empty() {
            continue;
        }
        let sector_name = map_to_standard_sector(&name);
        by_sector.insert(
            sector_name.clone(),
            SectorRow {
                sector_name,
                change_percent: change,
                advances,
                declines,
                num_companies: advances + declines,
            },
        );
    }
    by_sector.into_values().collect()
}

/// Try each table selector in turn; the first table that yields at least
/// one valid row wins. Sorted by change, strongest first.
pub fn parse_sector_page(html: &str) -> Result<Vec<SectorRow>, SourceError> {
    let doc = Html::parse_document(html);
    let row_sel = Selector::parse("tr").map_err(|e| SourceError::parse(e.to_string()))?;
    let td_sel = Selector::parse("td").map_err(|e| SourceError::parse(e.to_string()))?;

    for candidate in TABLE_SELECTORS {
        let Ok(sel) = Selector::parse(candidate) else { continue };
        for table in doc.select(&sel) {
            let mut rows = rows_from_table(table, &row_sel, &td_sel);
            if rows.is_empty() {
                continue;
            }
            rows.sort_by(|a, b| b.change_percent.total_cmp(&a.change_percent));
            rows.truncate(MAX_SECTORS);
            log::info!("Sector table matched '{}' with {} sectors", candidate, rows.len());
            return Ok(rows);
        }
    }
    Err(SourceError::no_match("sector table"))
}

pub struct SectorSource {
    ctx: SourceContext,
}

impl SectorSource {
    pub fn new(ctx: SourceContext) -> Self {
        Self { ctx }
    }

    pub async fn fetch(&self) -> NormalizedRecord<SectorMovement> {
        match self.try_fetch().await {
            Ok(sectors) => NormalizedRecord::ok(SOURCE_NAME, SectorMovement { sectors }),
            Err(e) => {
                log::error!("Error in sector scraping: {}", e);
                NormalizedRecord::failed(SOURCE_NAME, e.to_string())
            }
        }
    }

    async fn try_fetch(&self) -> Result<Vec<SectorRow>, SourceError> {
        let session = self.ctx.open_session("sector_movement")?;
        let url = format!("{}{}", self.ctx.settings.sources.trendlyne.trim_end_matches('/'), SECTOR_PATH);
        let html = session.get_text_retrying(&self.ctx.settings.retry, &url).await?;
        parse_sector_page(&html)
    }
}

pub fn summarize(movement: &SectorMovement) -> String {
    let lines: Vec<String> = movement
        .sectors
        .iter()
        .take(5)
        .map(|s| {
            format!(
                "- {}: {:.2}% change, {} advances, {} declines",
                s.sector_name, s.change_percent, s.advances, s.declines
            )
        })
        .collect();
    format!("Top 5 Sector Movements:\n{}", lines.join("\n"))
}

#[async_trait]
impl SectionSource for SectorSource {
    fn name(&self) -> SectionName {
        SectionName::SectorMovement
    }

    async fn collect(&self) -> SectionData {
        let record = self.fetch().await;
        if record.is_failed() {
            return SectionData::SectorMovement(SectionReport::failed(record));
        }
        let brief = InsightBrief {
            topic: "sector",
            summary: summarize(&record.payload),
            count: 7,
            focus: "- Cover strength/weakness, sector rotation, opportunities and what to watch next",
            deny: DEFAULT_DENY_LIST,
        };
        let insights = self.ctx.insights.generate(&brief).await;
        SectionData::SectorMovement(SectionReport::new(record, insights))
    }
}
