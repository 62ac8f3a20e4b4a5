use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::models::section::AggregatedSnapshot;
use crate::services::report_renderer::{render_report, ReportKind};
use crate::AppState;

/// Collect what `kind` needs, render it off the async runtime and return it
/// as an attachment.
pub async fn pdf_report(state: &AppState, kind: ReportKind) -> Result<Response, ApiError> {
    log::info!("API call: {} PDF", kind.title());
    let snapshot = if kind.needs_derived() {
        state.pipeline.collect_snapshot().await
    } else {
        let results = futures::future::join_all(kind.sections().iter().map(|name| state.pipeline.collect_section(*name))).await;
        let mut snapshot = AggregatedSnapshot::new();
        for data in results.into_iter().flatten() {
            snapshot.insert(data);
        }
        snapshot
    };

    let report = tokio::task::spawn_blocking(move || render_report(kind, &snapshot))
        .await
        .map_err(|e| ApiError::Render(format!("render task failed: {}", e)))?
        .map_err(|e| ApiError::Render(format!("{:#}", e)))?;

    log::info!("API success: {} PDF - {} ({} bytes)", kind.title(), report.filename, report.bytes.len());
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", report.filename)),
        ],
        report.bytes,
    )
        .into_response())
}

pub async fn market_overview_pdf(State(state): State<AppState>) -> Result<Response, ApiError> {
    pdf_report(&state, ReportKind::MarketOverview).await
}

pub async fn sector_fii_pdf(State(state): State<AppState>) -> Result<Response, ApiError> {
    pdf_report(&state, ReportKind::SectorFii).await
}

pub async fn news_highlights_pdf(State(state): State<AppState>) -> Result<Response, ApiError> {
    pdf_report(&state, ReportKind::NewsHighlights).await
}

pub async fn indicators_pdf(State(state): State<AppState>) -> Result<Response, ApiError> {
    pdf_report(&state, ReportKind::Indicators).await
}

pub async fn technical_snapshot_pdf(State(state): State<AppState>) -> Result<Response, ApiError> {
    pdf_report(&state, ReportKind::TechnicalSnapshot).await
}

pub async fn top_performers_pdf(State(state): State<AppState>) -> Result<Response, ApiError> {
    pdf_report(&state, ReportKind::TopPerformers).await
}

pub async fn comprehensive_pdf(State(state): State<AppState>) -> Result<Response, ApiError> {
    pdf_report(&state, ReportKind::Comprehensive).await
}
