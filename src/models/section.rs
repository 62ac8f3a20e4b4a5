use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use super::market::*;
use super::news::NewsHighlights;
use super::record::{Insight, NormalizedRecord, RecordStatus};

/// Every section in declared order. The derived `Ord` is the emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionName {
    MarketOverview,
    SectorMovement,
    InstitutionalActivity,
    TopPerformers,
    TechnicalSnapshot,
    FinancialIndicators,
    NewsHighlights,
    MarketAnalysis,
    MarketSummary,
    MarketPredictions,
}

impl SectionName {
    pub const PRIMARY: [SectionName; 7] = [
        SectionName::MarketOverview,
        SectionName::SectorMovement,
        SectionName::InstitutionalActivity,
        SectionName::TopPerformers,
        SectionName::TechnicalSnapshot,
        SectionName::FinancialIndicators,
        SectionName::NewsHighlights,
    ];

    pub const DERIVED: [SectionName; 3] = [
        SectionName::MarketAnalysis,
        SectionName::MarketSummary,
        SectionName::MarketPredictions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionName::MarketOverview => "market_overview",
            SectionName::SectorMovement => "sector_movement",
            SectionName::InstitutionalActivity => "institutional_activity",
            SectionName::TopPerformers => "top_performers",
            SectionName::TechnicalSnapshot => "technical_snapshot",
            SectionName::FinancialIndicators => "financial_indicators",
            SectionName::NewsHighlights => "news_highlights",
            SectionName::MarketAnalysis => "market_analysis",
            SectionName::MarketSummary => "market_summary",
            SectionName::MarketPredictions => "market_predictions",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            SectionName::MarketOverview => "Market Overview",
            SectionName::SectorMovement => "Sector Movement",
            SectionName::InstitutionalActivity => "FII/DII Activity",
            SectionName::TopPerformers => "Top Gainers & Losers",
            SectionName::TechnicalSnapshot => "Technical Snapshot",
            SectionName::FinancialIndicators => "Financial Indicators",
            SectionName::NewsHighlights => "News Highlights",
            SectionName::MarketAnalysis => "Market Analysis",
            SectionName::MarketSummary => "Market Summary",
            SectionName::MarketPredictions => "Market Predictions",
        }
    }

    pub fn is_derived(&self) -> bool {
        Self::DERIVED.contains(self)
    }
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A primary section: the adapter's record plus the bullets generated from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionReport<T> {
    pub record: NormalizedRecord<T>,
    pub insights: Insight,
}

impl<T> SectionReport<T> {
    pub fn new(record: NormalizedRecord<T>, insights: Insight) -> Self {
        Self { record, insights }
    }

    /// Failed record; insight is the placeholder since there is nothing to describe.
    pub fn failed(record: NormalizedRecord<T>) -> Self {
        Self {
            record,
            insights: Insight::unavailable(),
        }
    }
}

/// One completed section. Serialized externally tagged, i.e. as
/// `{"<section_name>": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionData {
    MarketOverview(SectionReport<MarketOverview>),
    SectorMovement(SectionReport<SectorMovement>),
    InstitutionalActivity(SectionReport<InstitutionalActivity>),
    TopPerformers(SectionReport<TopPerformers>),
    TechnicalSnapshot(SectionReport<TechnicalSnapshot>),
    FinancialIndicators(SectionReport<FinancialIndicators>),
    NewsHighlights(SectionReport<NewsHighlights>),
    MarketAnalysis(NormalizedRecord<Insight>),
    MarketSummary(NormalizedRecord<Insight>),
    MarketPredictions(NormalizedRecord<Insight>),
}

/// Untagged view of a section, used where the name is already the map key.
#[derive(Serialize)]
#[serde(untagged)]
enum SectionBody<'a> {
    Overview(&'a SectionReport<MarketOverview>),
    Sectors(&'a SectionReport<SectorMovement>),
    Institutional(&'a SectionReport<InstitutionalActivity>),
    Movers(&'a SectionReport<TopPerformers>),
    Technical(&'a SectionReport<TechnicalSnapshot>),
    Indicators(&'a SectionReport<FinancialIndicators>),
    News(&'a SectionReport<NewsHighlights>),
    Derived(&'a NormalizedRecord<Insight>),
}

macro_rules! with_record {
    ($data:expr, $rec:ident => $body:expr) => {
        match $data {
            SectionData::MarketOverview(r) => { let $rec = &r.record; $body }
            SectionData::SectorMovement(r) => { let $rec = &r.record; $body }
            SectionData::InstitutionalActivity(r) => { let $rec = &r.record; $body }
            SectionData::TopPerformers(r) => { let $rec = &r.record; $body }
            SectionData::TechnicalSnapshot(r) => { let $rec = &r.record; $body }
            SectionData::FinancialIndicators(r) => { let $rec = &r.record; $body }
            SectionData::NewsHighlights(r) => { let $rec = &r.record; $body }
            SectionData::MarketAnalysis($rec)
            | SectionData::MarketSummary($rec)
            | SectionData::MarketPredictions($rec) => $body,
        }
    };
}

impl SectionData {
    pub fn name(&self) -> SectionName {
        match self {
            SectionData::MarketOverview(_) => SectionName::MarketOverview,
            SectionData::SectorMovement(_) => SectionName::SectorMovement,
            SectionData::InstitutionalActivity(_) => SectionName::InstitutionalActivity,
            SectionData::TopPerformers(_) => SectionName::TopPerformers,
            SectionData::TechnicalSnapshot(_) => SectionName::TechnicalSnapshot,
            SectionData::FinancialIndicators(_) => SectionName::FinancialIndicators,
            SectionData::NewsHighlights(_) => SectionName::NewsHighlights,
            SectionData::MarketAnalysis(_) => SectionName::MarketAnalysis,
            SectionData::MarketSummary(_) => SectionName::MarketSummary,
            SectionData::MarketPredictions(_) => SectionName::MarketPredictions,
        }
    }

    pub fn status(&self) -> RecordStatus {
        with_record!(self, rec => rec.status)
    }

    pub fn error(&self) -> Option<&str> {
        with_record!(self, rec => rec.error.as_deref())
    }

    pub fn source_name(&self) -> &str {
        with_record!(self, rec => rec.source_name.as_str())
    }

    pub fn is_failed(&self) -> bool {
        self.status() == RecordStatus::Failed
    }

    /// Placeholder for a section whose task never produced a value (panic, abort).
    pub fn failed(name: SectionName, error: impl Into<String>) -> Self {
        let error = error.into();
        let source = name.title();
        match name {
            SectionName::MarketOverview => SectionData::MarketOverview(SectionReport::failed(NormalizedRecord::failed(source, error))),
            SectionName::SectorMovement => SectionData::SectorMovement(SectionReport::failed(NormalizedRecord::failed(source, error))),
            SectionName::InstitutionalActivity => SectionData::InstitutionalActivity(SectionReport::failed(NormalizedRecord::failed(source, error))),
            SectionName::TopPerformers => SectionData::TopPerformers(SectionReport::failed(NormalizedRecord::failed(source, error))),
            SectionName::TechnicalSnapshot => SectionData::TechnicalSnapshot(SectionReport::failed(NormalizedRecord::failed(source, error))),
            SectionName::FinancialIndicators => SectionData::FinancialIndicators(SectionReport::failed(NormalizedRecord::failed(source, error))),
            SectionName::NewsHighlights => SectionData::NewsHighlights(SectionReport::failed(NormalizedRecord::failed(source, error))),
            SectionName::MarketAnalysis => SectionData::MarketAnalysis(NormalizedRecord::failed_with(source, Insight::unavailable(), error)),
            SectionName::MarketSummary => SectionData::MarketSummary(NormalizedRecord::failed_with(source, Insight::unavailable(), error)),
            SectionName::MarketPredictions => SectionData::MarketPredictions(NormalizedRecord::failed_with(source, Insight::unavailable(), error)),
        }
    }

    fn body(&self) -> SectionBody<'_> {
        match self {
            SectionData::MarketOverview(r) => SectionBody::Overview(r),
            SectionData::SectorMovement(r) => SectionBody::Sectors(r),
            SectionData::InstitutionalActivity(r) => SectionBody::Institutional(r),
            SectionData::TopPerformers(r) => SectionBody::Movers(r),
            SectionData::TechnicalSnapshot(r) => SectionBody::Technical(r),
            SectionData::FinancialIndicators(r) => SectionBody::Indicators(r),
            SectionData::NewsHighlights(r) => SectionBody::News(r),
            SectionData::MarketAnalysis(r) | SectionData::MarketSummary(r) | SectionData::MarketPredictions(r) => {
                SectionBody::Derived(r)
            }
        }
    }
}

// ========== Aggregated snapshot ==========

/// Sections collected for one request. Each slot is written once.
#[derive(Debug, Clone, Default)]
pub struct AggregatedSnapshot {
    sections: BTreeMap<SectionName, SectionData>,
}

impl AggregatedSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false (and keeps the first value) if the slot is already filled.
    pub fn insert(&mut self, data: SectionData) -> bool {
        let name = data.name();
        if self.sections.contains_key(&name) {
            log::warn!("section {} already recorded, ignoring duplicate", name);
            return false;
        }
        self.sections.insert(name, data);
        true
    }

    pub fn get(&self, name: SectionName) -> Option<&SectionData> {
        self.sections.get(&name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SectionData> {
        self.sections.values()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn any_primary_succeeded(&self) -> bool {
        self.sections
            .values()
            .any(|s| !s.name().is_derived() && !s.is_failed())
    }

    pub fn analysis(&self) -> Option<&NormalizedRecord<Insight>> {
        match self.get(SectionName::MarketAnalysis) {
            Some(SectionData::MarketAnalysis(r)) => Some(r),
            _ => None,
        }
    }
}

impl Serialize for AggregatedSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sections.len()))?;
        for (name, data) in &self.sections {
            map.serialize_entry(name.as_str(), &data.body())?;
        }
        map.end()
    }
}

// ========== Stream events ==========

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Start { timestamp: DateTime<Utc> },
    Section(SectionData),
    Error { section: SectionName, error: String },
    Complete { timestamp: DateTime<Utc>, succeeded: usize, failed: usize },
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Start { .. } => "start",
            StreamEvent::Section(_) => "section",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Complete { .. } => "complete",
        }
    }

    pub fn section(&self) -> Option<SectionName> {
        match self {
            StreamEvent::Section(data) => Some(data.name()),
            StreamEvent::Error { section, .. } => Some(*section),
            _ => None,
        }
    }

    /// JSON body of the event. Section events are keyed by section name.
    pub fn data(&self) -> serde_json::Value {
        match self {
            StreamEvent::Start { timestamp } => serde_json::json!({
                "status": "started",
                "timestamp": timestamp.to_rfc3339(),
                "sections": SectionName::PRIMARY.iter().chain(SectionName::DERIVED.iter()).map(|s| s.as_str()).collect::<Vec<_>>(),
            }),
            StreamEvent::Section(data) => serde_json::to_value(data).unwrap_or_else(|e| {
                serde_json::json!({ "section": data.name().as_str(), "error": e.to_string() })
            }),
            StreamEvent::Error { section, error } => serde_json::json!({
                "section": section.as_str(),
                "error": error,
            }),
            StreamEvent::Complete { timestamp, succeeded, failed } => serde_json::json!({
                "status": "complete",
                "timestamp": timestamp.to_rfc3339(),
                "succeeded": succeeded,
                "failed": failed,
            }),
        }
    }
}
