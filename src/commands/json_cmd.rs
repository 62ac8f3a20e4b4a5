use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::models::section::{AggregatedSnapshot, SectionData, SectionName};
use crate::AppState;

/// Run one section. A failed record becomes an error document; ok and
/// partial records are returned keyed by section name.
pub async fn section_json(state: &AppState, name: SectionName) -> Result<Json<SectionData>, ApiError> {
    log::info!("API call: {}", name);
    let data = state
        .pipeline
        .collect_section(name)
        .await
        .ok_or_else(|| ApiError::Setup(format!("no source registered for {}", name)))?;
    if data.is_failed() {
        return Err(ApiError::SectionUnavailable {
            section: name,
            message: data.error().unwrap_or("unknown error").to_string(),
        });
    }
    log::info!("API success: {} - {:?} from {}", name, data.status(), data.source_name());
    Ok(Json(data))
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn market_overview(State(state): State<AppState>) -> Result<Json<SectionData>, ApiError> {
    section_json(&state, SectionName::MarketOverview).await
}

pub async fn sector_performance(State(state): State<AppState>) -> Result<Json<SectionData>, ApiError> {
    section_json(&state, SectionName::SectorMovement).await
}

pub async fn fii_activity(State(state): State<AppState>) -> Result<Json<SectionData>, ApiError> {
    section_json(&state, SectionName::InstitutionalActivity).await
}

pub async fn news_highlights(State(state): State<AppState>) -> Result<Json<SectionData>, ApiError> {
    section_json(&state, SectionName::NewsHighlights).await
}

pub async fn indicators(State(state): State<AppState>) -> Result<Json<SectionData>, ApiError> {
    section_json(&state, SectionName::FinancialIndicators).await
}

pub async fn technical_snapshot(State(state): State<AppState>) -> Result<Json<SectionData>, ApiError> {
    section_json(&state, SectionName::TechnicalSnapshot).await
}

pub async fn top_performers(State(state): State<AppState>) -> Result<Json<SectionData>, ApiError> {
    section_json(&state, SectionName::TopPerformers).await
}

/// Every section in one document, failed ones included.
pub async fn market_snapshot(State(state): State<AppState>) -> Json<AggregatedSnapshot> {
    log::info!("API call: market_snapshot");
    let snapshot = state.pipeline.collect_snapshot().await;
    log::info!("API success: market_snapshot - {} sections", snapshot.len());
    Json(snapshot)
}
