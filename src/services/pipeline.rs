use futures::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::section::{AggregatedSnapshot, SectionData, SectionName, StreamEvent};
use crate::models::settings::{AppSettings, ExecutionMode};
use crate::services::financial_indicators::FinancialIndicatorsSource;
use crate::services::institutional::InstitutionalSource;
use crate::services::market_analysis::NarrativeSection;
use crate::services::market_overview::MarketOverviewSource;
use crate::services::news_service::NewsSource;
use crate::services::sector_scraper::SectorSource;
use crate::services::source::{DerivedSection, SectionSource, SourceContext};
use crate::services::technical_snapshot::TechnicalSnapshotSource;
use crate::services::top_performers::TopPerformersSource;

/// Where finished sections go: nowhere (batch) or an event channel (stream).
enum Sink<'a> {
    Batch,
    Stream(&'a mpsc::Sender<StreamEvent>),
}

impl Sink<'_> {
    fn is_closed(&self) -> bool {
        matches!(self, Sink::Stream(tx) if tx.is_closed())
    }

    /// False once the receiver is gone.
    async fn emit(&self, event: StreamEvent) -> bool {
        match self {
            Sink::Batch => true,
            Sink::Stream(tx) => tx.send(event).await.is_ok(),
        }
    }

    async fn emit_section(&self, data: &SectionData) -> bool {
        let event = match data.error() {
            Some(error) if data.is_failed() => StreamEvent::Error { section: data.name(), error: error.to_string() },
            _ => StreamEvent::Section(data.clone()),
        };
        self.emit(event).await
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Runs every section for one request and assembles the snapshot.
///
/// Primary sections are emitted in declared order whatever order they finish
/// in; the derived sections run afterwards, one by one, each seeing
/// everything recorded before it. A section failing never stops the run. A
/// closed stream does, and so does dropping the run: outstanding section
/// tasks are aborted either way.
pub struct Pipeline {
    sources: Vec<Arc<dyn SectionSource>>,
    derived: Vec<Arc<dyn DerivedSection>>,
    mode: ExecutionMode,
}

impl Pipeline {
    pub fn new(mut sources: Vec<Arc<dyn SectionSource>>, mut derived: Vec<Arc<dyn DerivedSection>>, mode: ExecutionMode) -> Self {
        sources.sort_by_key(|s| s.name());
        derived.sort_by_key(|d| d.name());
        Self { sources, derived, mode }
    }

    pub fn from_context(ctx: SourceContext) -> Self {
        let sources: Vec<Arc<dyn SectionSource>> = vec![
            Arc::new(MarketOverviewSource::new(ctx.clone())),
            Arc::new(SectorSource::new(ctx.clone())),
            Arc::new(InstitutionalSource::new(ctx.clone())),
            Arc::new(TopPerformersSource::new(ctx.clone())),
            Arc::new(TechnicalSnapshotSource::new(ctx.clone())),
            Arc::new(FinancialIndicatorsSource::new(ctx.clone())),
            Arc::new(NewsSource::new(ctx.clone())),
        ];
        let derived: Vec<Arc<dyn DerivedSection>> = vec![
            Arc::new(NarrativeSection::analysis(ctx.insights.clone())),
            Arc::new(NarrativeSection::summary(ctx.insights.clone())),
            Arc::new(NarrativeSection::predictions(ctx.insights.clone())),
        ];
        Self::new(sources, derived, ctx.settings.execution)
    }

    pub fn from_settings(settings: Arc<AppSettings>) -> Self {
        Self::from_context(SourceContext::from_settings(settings))
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// One primary section on its own, as served by the single-section endpoints.
    pub async fn collect_section(&self, name: SectionName) -> Option<SectionData> {
        let source = self.sources.iter().find(|s| s.name() == name)?;
        Some(run_isolated(source.as_ref()).await)
    }

    /// Every section, no events.
    pub async fn collect_snapshot(&self) -> AggregatedSnapshot {
        self.run(Sink::Batch).await
    }

    /// Every section, reported on `tx` as it lands:
    /// `start`, then one `section` or `error` per section, then `complete`.
    /// Returns early (without `complete`) when the receiver is dropped.
    pub async fn stream(&self, tx: mpsc::Sender<StreamEvent>) -> AggregatedSnapshot {
        self.run(Sink::Stream(&tx)).await
    }

    async fn run(&self, sink: Sink<'_>) -> AggregatedSnapshot {
        let started = Instant::now();
        let mut snapshot = AggregatedSnapshot::new();

        if !sink.emit(StreamEvent::Start { timestamp: chrono::Utc::now() }).await {
            log::info!("Client disconnected before the first section");
            return snapshot;
        }

        let finished = match self.mode {
            ExecutionMode::Concurrent => self.run_concurrent(&sink, &mut snapshot).await,
            ExecutionMode::Sequential => self.run_sequential(&sink, &mut snapshot).await,
        };
        if !finished {
            log::info!("Client disconnected, stopped after {} sections", snapshot.len());
            return snapshot;
        }

        for section in &self.derived {
            if sink.is_closed() {
                log::info!("Client disconnected before {}", section.name());
                return snapshot;
            }
            let data = match AssertUnwindSafe(section.derive(&snapshot)).catch_unwind().await {
                Ok(data) => data,
                Err(panic) => SectionData::failed(section.name(), format!("section panicked: {}", panic_message(panic))),
            };
            if !self.record(&sink, &mut snapshot, data).await {
                return snapshot;
            }
        }

        let failed = snapshot.iter().filter(|s| s.is_failed()).count();
        let succeeded = snapshot.len() - failed;
        log::info!(
            "Pipeline finished in {:.1}s: {} succeeded, {} failed",
            started.elapsed().as_secs_f64(),
            succeeded,
            failed
        );
        sink.emit(StreamEvent::Complete { timestamp: chrono::Utc::now(), succeeded, failed }).await;
        snapshot
    }

    async fn run_concurrent(&self, sink: &Sink<'_>, snapshot: &mut AggregatedSnapshot) -> bool {
        let mut tasks = SectionTasks(
            self.sources
                .iter()
                .map(|source| {
                    let source = Arc::clone(source);
                    (source.name(), tokio::spawn(async move { source.collect().await }))
                })
                .collect(),
        );

        // handles stay in the guard while awaited so a dropped run aborts them too
        while let Some((name, handle)) = tasks.0.front_mut() {
            let name = *name;
            if sink.is_closed() {
                return false;
            }
            let joined = handle.await;
            tasks.0.pop_front();
            let data = match joined {
                Ok(data) => data,
                Err(e) => {
                    log::error!("Section {} task failed: {}", name, e);
                    SectionData::failed(name, format!("section task failed: {}", e))
                }
            };
            if !self.record(sink, snapshot, data).await {
                return false;
            }
        }
        true
    }

    async fn run_sequential(&self, sink: &Sink<'_>, snapshot: &mut AggregatedSnapshot) -> bool {
        for source in &self.sources {
            if sink.is_closed() {
                return false;
            }
            let data = run_isolated(source.as_ref()).await;
            if !self.record(sink, snapshot, data).await {
                return false;
            }
        }
        true
    }

    /// Store and emit one finished section. False when the client is gone.
    async fn record(&self, sink: &Sink<'_>, snapshot: &mut AggregatedSnapshot, data: SectionData) -> bool {
        if data.is_failed() {
            log::warn!("Section {} failed: {}", data.name(), data.error().unwrap_or("unknown error"));
        } else {
            log::info!("Section {} ready ({:?})", data.name(), data.status());
        }
        if !snapshot.insert(data.clone()) {
            return true;
        }
        sink.emit_section(&data).await
    }
}

/// Spawned primary sections in declared order. Whatever is still held when
/// the guard goes away is aborted, whether the run returned early or the
/// request future itself was dropped.
struct SectionTasks(VecDeque<(SectionName, JoinHandle<SectionData>)>);

impl Drop for SectionTasks {
    fn drop(&mut self) {
        if !self.0.is_empty() {
            log::debug!("Aborting {} outstanding section task(s)", self.0.len());
        }
        for (_, handle) in &self.0 {
            handle.abort();
        }
    }
}

/// Run one source on the current task, turning a panic into a failed section.
async fn run_isolated(source: &dyn SectionSource) -> SectionData {
    let name = source.name();
    match AssertUnwindSafe(source.collect()).catch_unwind().await {
        Ok(data) => data,
        Err(panic) => {
            let message = panic_message(panic);
            log::error!("Section {} panicked: {}", name, message);
            SectionData::failed(name, format!("section panicked: {}", message))
        }
    }
}
