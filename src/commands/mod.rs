pub mod json_cmd;
pub mod pdf_cmd;
pub mod stream_cmd;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::AppState;

/// Every endpoint. CORS is open to any origin.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/market-overview", get(json_cmd::market_overview))
        .route("/sector-performance", get(json_cmd::sector_performance))
        .route("/fii-activity", get(json_cmd::fii_activity))
        .route("/news-highlights", get(json_cmd::news_highlights))
        .route("/indicators", get(json_cmd::indicators))
        .route("/technical-snapshot", get(json_cmd::technical_snapshot))
        .route("/top-performers", get(json_cmd::top_performers))
        .route("/market-snapshot", get(json_cmd::market_snapshot))
        .route("/comprehensive-market-data", get(stream_cmd::comprehensive_market_data))
        .route("/pdf/market-overview-pdf", get(pdf_cmd::market_overview_pdf))
        .route("/pdf/sector-fii-data-pdf", get(pdf_cmd::sector_fii_pdf))
        .route("/pdf/news-highlights-pdf", get(pdf_cmd::news_highlights_pdf))
        .route("/pdf/indicators-pdf", get(pdf_cmd::indicators_pdf))
        .route("/pdf/technical-snapshot-pdf", get(pdf_cmd::technical_snapshot_pdf))
        .route("/pdf/top-performers-pdf", get(pdf_cmd::top_performers_pdf))
        .route("/pdf/comprehensive-market-data-pdf", get(pdf_cmd::comprehensive_pdf));

    Router::new()
        .route("/health", get(json_cmd::health))
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
