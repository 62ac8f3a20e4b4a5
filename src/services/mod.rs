pub mod ai_service;
pub mod financial_indicators;
pub mod institutional;
pub mod market_analysis;
pub mod market_overview;
pub mod news_service;
pub mod pipeline;
pub mod quote_history;
pub mod report_renderer;
pub mod sector_scraper;
pub mod source;
pub mod technical_indicators;
pub mod technical_snapshot;
pub mod top_performers;
