use async_trait::async_trait;
use std::sync::Arc;

use crate::error::SourceError;
use crate::models::section::{AggregatedSnapshot, SectionData, SectionName};
use crate::models::settings::AppSettings;
use crate::services::ai_service::InsightGenerator;
use crate::utils::http::ScrapeSession;

/// A primary section backed by one or more upstream sources.
///
/// `collect` never fails: every upstream problem ends up as a
/// `Failed` record inside the returned `SectionData`.
#[async_trait]
pub trait SectionSource: Send + Sync {
    fn name(&self) -> SectionName;
    async fn collect(&self) -> SectionData;
}

/// A section computed from sections already in the snapshot.
#[async_trait]
pub trait DerivedSection: Send + Sync {
    fn name(&self) -> SectionName;
    async fn derive(&self, snapshot: &AggregatedSnapshot) -> SectionData;
}

/// Shared, read-only dependencies of every adapter.
#[derive(Clone)]
pub struct SourceContext {
    pub settings: Arc<AppSettings>,
    pub insights: InsightGenerator,
}

impl SourceContext {
    pub fn new(settings: Arc<AppSettings>, insights: InsightGenerator) -> Self {
        Self { settings, insights }
    }

    pub fn from_settings(settings: Arc<AppSettings>) -> Self {
        let insights = InsightGenerator::from_config(&settings.ai);
        Self { settings, insights }
    }

    /// Fresh session for one adapter invocation.
    pub fn open_session(&self, label: &'static str) -> Result<ScrapeSession, SourceError> {
        ScrapeSession::open(label, &self.settings.http)
    }
}
