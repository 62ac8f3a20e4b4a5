//! Fakes shared by the integration tests.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use market_brief::models::record::{Insight, NormalizedRecord};
use market_brief::models::section::{SectionData, SectionName, SectionReport};
use market_brief::models::settings::{AppSettings, ExecutionMode};
use market_brief::services::ai_service::{InsightGenerator, TextGenerator};
use market_brief::services::market_analysis::NarrativeSection;
use market_brief::services::pipeline::Pipeline;
use market_brief::services::source::{DerivedSection, SectionSource};
use market_brief::utils::retry::RetryPolicy;

/// A successful section with an empty payload.
pub fn ok_section(name: SectionName) -> SectionData {
    let insights = Insight::new(vec!["- steady session".to_string()]);
    match name {
        SectionName::MarketOverview => SectionData::MarketOverview(SectionReport::new(NormalizedRecord::ok("Fake", Default::default()), insights)),
        SectionName::SectorMovement => SectionData::SectorMovement(SectionReport::new(NormalizedRecord::ok("Fake", Default::default()), insights)),
        SectionName::InstitutionalActivity => {
            SectionData::InstitutionalActivity(SectionReport::new(NormalizedRecord::ok("Fake", Default::default()), insights))
        }
        SectionName::TopPerformers => SectionData::TopPerformers(SectionReport::new(NormalizedRecord::ok("Fake", Default::default()), insights)),
        SectionName::TechnicalSnapshot => SectionData::TechnicalSnapshot(SectionReport::new(NormalizedRecord::ok("Fake", Default::default()), insights)),
        SectionName::FinancialIndicators => {
            SectionData::FinancialIndicators(SectionReport::new(NormalizedRecord::ok("Fake", Default::default()), insights))
        }
        SectionName::NewsHighlights => SectionData::NewsHighlights(SectionReport::new(NormalizedRecord::ok("Fake", Default::default()), insights)),
        SectionName::MarketAnalysis => SectionData::MarketAnalysis(NormalizedRecord::ok("Fake", insights)),
        SectionName::MarketSummary => SectionData::MarketSummary(NormalizedRecord::ok("Fake", insights)),
        SectionName::MarketPredictions => SectionData::MarketPredictions(NormalizedRecord::ok("Fake", insights)),
    }
}

/// Primary source that sleeps, counts its calls and then succeeds or fails.
/// `finished` counts the calls that got past the sleep.
pub struct FakeSource {
    pub name: SectionName,
    pub delay: Duration,
    pub fail: Option<&'static str>,
    pub calls: Arc<AtomicUsize>,
    pub finished: Arc<AtomicUsize>,
}

impl FakeSource {
    pub fn ok(name: SectionName) -> Self {
        Self {
            name,
            delay: Duration::ZERO,
            fail: None,
            calls: Arc::new(AtomicUsize::new(0)),
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(name: SectionName, error: &'static str) -> Self {
        Self { fail: Some(error), ..Self::ok(name) }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn counting(mut self, calls: Arc<AtomicUsize>) -> Self {
        self.calls = calls;
        self
    }

    pub fn counting_finished(mut self, finished: Arc<AtomicUsize>) -> Self {
        self.finished = finished;
        self
    }
}

#[async_trait]
impl SectionSource for FakeSource {
    fn name(&self) -> SectionName {
        self.name
    }

    async fn collect(&self) -> SectionData {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.finished.fetch_add(1, Ordering::SeqCst);
        match self.fail {
            Some(error) => SectionData::failed(self.name, error),
            None => ok_section(self.name),
        }
    }
}

/// Text generator that remembers every prompt and answers with a fixed reply.
#[derive(Default)]
pub struct RecordingGenerator {
    pub prompts: Mutex<Vec<String>>,
    pub reply: Option<String>,
}

impl RecordingGenerator {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self { prompts: Mutex::new(Vec::new()), reply: Some(reply.to_string()) })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for RecordingGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().ok_or_else(|| anyhow!("generator offline"))
    }
}

pub fn narrative_sections(generator: Arc<RecordingGenerator>) -> Vec<Arc<dyn DerivedSection>> {
    let insights = InsightGenerator::new(generator);
    vec![
        Arc::new(NarrativeSection::analysis(insights.clone())),
        Arc::new(NarrativeSection::summary(insights.clone())),
        Arc::new(NarrativeSection::predictions(insights)),
    ]
}

/// All seven primaries succeeding, no derived sections.
pub fn all_ok_pipeline(mode: ExecutionMode) -> Pipeline {
    let sources: Vec<Arc<dyn SectionSource>> = SectionName::PRIMARY
        .iter()
        .map(|name| Arc::new(FakeSource::ok(*name)) as Arc<dyn SectionSource>)
        .collect();
    Pipeline::new(sources, vec![], mode)
}

/// Settings pointing every upstream at `base` with an immediate retry.
pub fn mock_settings(base: &str) -> AppSettings {
    let mut settings = AppSettings::default();
    settings.sources.yahoo_chart = base.to_string();
    settings.sources.trendlyne = base.to_string();
    settings.sources.moneycontrol_fii = format!("{}/fii", base);
    settings.sources.cnbc_markets = format!("{}/cnbc/markets/", base);
    settings.sources.financial_express_markets = format!("{}/fe/market/", base);
    settings.sources.alpha_vantage = base.to_string();
    settings.retry = RetryPolicy::new(2, Duration::from_millis(5)).without_jitter();
    settings
}
