//! Source adapters against a local mock upstream.

mod common;

use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::mock_settings;
use market_brief::models::ai::{AIConfig, ApiKey};
use market_brief::models::record::RecordStatus;
use market_brief::models::section::{SectionData, SectionName, StreamEvent};
use market_brief::models::settings::AppSettings;
use market_brief::services::ai_service::InsightGenerator;
use market_brief::services::financial_indicators::FinancialIndicatorsSource;
use market_brief::services::institutional::InstitutionalSource;
use market_brief::services::market_overview::{IndexSpec, MarketOverviewSource};
use market_brief::services::news_service::{NewsSource, NEWS_IMPACT_UNAVAILABLE};
use market_brief::services::pipeline::Pipeline;
use market_brief::services::sector_scraper::SectorSource;
use market_brief::services::source::SourceContext;
use market_brief::services::technical_snapshot::TechnicalSnapshotSource;
use market_brief::services::top_performers::TopPerformersSource;
use tokio::sync::mpsc;

fn chart(closes: &[f64]) -> serde_json::Value {
    let timestamps: Vec<i64> = (0..closes.len() as i64).map(|i| 1_741_910_400 + i * 86_400).collect();
    json!({
        "chart": {
            "result": [{
                "timestamp": timestamps,
                "indicators": { "quote": [{
                    "open": closes,
                    "high": closes,
                    "low": closes,
                    "close": closes,
                }]}
            }],
            "error": null
        }
    })
}

fn context(settings: AppSettings) -> SourceContext {
    SourceContext::new(Arc::new(settings), InsightGenerator::disabled())
}

fn chat_reply(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 120, "completion_tokens": 40, "total_tokens": 160 }
    })
}

fn ai_config(base_url: &str) -> AIConfig {
    AIConfig {
        base_url: base_url.to_string(),
        api_key: ApiKey::from_env_value(Some("test-key".to_string())),
        ..AIConfig::default()
    }
}

// ==================== Market overview ====================

#[tokio::test]
async fn test_market_overview_falls_back_to_alternate_symbol() {
    let server = MockServer::start().await;
    // primary ^NSEI is not mounted and answers 404
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/NIFTY50.NS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chart(&[22397.2, 22552.5])))
        .mount(&server)
        .await;

    let source = MarketOverviewSource::with_catalogue(
        context(mock_settings(&server.uri())),
        vec![IndexSpec { symbol: "^NSEI", name: "NIFTY 50", alternates: &["NIFTY50.NS"] }],
    );
    let record = source.fetch().await;

    assert_eq!(record.status, RecordStatus::Ok);
    let entry = &record.payload.indices[0];
    assert_eq!(entry.symbol, "^NSEI");
    let quote = entry.quote.as_ref().unwrap();
    assert_eq!(quote.fetched_from, "NIFTY50.NS");
    assert_eq!(quote.close, 22552.5);
    assert_eq!(quote.prev_close, 22397.2);
    assert_eq!(quote.change, 155.3);
    assert_eq!(quote.change_percent, 0.69);
}

#[tokio::test]
async fn test_market_overview_partial_when_one_index_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/%5ENSEI"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chart(&[22000.0, 22100.0])))
        .mount(&server)
        .await;

    let source = MarketOverviewSource::with_catalogue(
        context(mock_settings(&server.uri())),
        vec![
            IndexSpec { symbol: "^NSEI", name: "NIFTY 50", alternates: &[] },
            IndexSpec { symbol: "^BSESN", name: "SENSEX", alternates: &["SENSEX.BO"] },
        ],
    );
    let record = source.fetch().await;

    assert_eq!(record.status, RecordStatus::Partial);
    assert_eq!(record.error.as_deref(), Some("1 of 2 indices unavailable"));
    assert_eq!(record.payload.indices[1].error.as_deref(), Some("Data unavailable"));
}

// ==================== Institutional activity ====================

#[tokio::test]
async fn test_institutional_retries_after_rate_limit() {
    let server = MockServer::start().await;
    let html = r#"<table class="mctable1">
        <tr><th>Date</th><th>FII Buy</th><th>FII Sell</th><th>FII Net</th><th>DII Buy</th><th>DII Sell</th><th>DII Net</th></tr>
        <tr><td>14-Mar-2025</td><td>12,345.67</td><td>14,000.00</td><td>-1,654.33</td><td>11,000.5</td><td>9,500.5</td><td>1,500.00</td></tr>
    </table>"#;
    Mock::given(method("GET"))
        .and(path("/fii"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fii"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .expect(1)
        .mount(&server)
        .await;

    let record = InstitutionalSource::new(context(mock_settings(&server.uri()))).fetch().await;

    assert_eq!(record.status, RecordStatus::Ok);
    assert_eq!(record.source_name, "MoneyControl");
    assert_eq!(record.payload.fii.net, -1654.33);
}

#[tokio::test]
async fn test_institutional_all_candidates_fail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fii"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<div>captcha</div>"))
        .mount(&server)
        .await;

    let record = InstitutionalSource::new(context(mock_settings(&server.uri()))).fetch().await;

    assert_eq!(record.status, RecordStatus::Failed);
    assert_eq!(record.payload.source, "No data available");
    let error = record.error.unwrap();
    assert!(error.contains("MoneyControl"));
    assert!(error.contains("Trendlyne"));
}

// ==================== Top performers ====================

#[tokio::test]
async fn test_top_performers_partial_when_losers_blocked() {
    let server = MockServer::start().await;
    let html = r#"<table class="table">
        <thead><tr><th>Stock</th><th>LTP</th><th>Day Change(%)</th></tr></thead>
        <tbody><tr><td><a data-title="Hindustan Aeronautics Ltd." href="/x">HAL</a></td><td>4,210.50</td><td>201.30 (5.0%)</td></tr></tbody>
    </table>"#;
    Mock::given(method("GET"))
        .and(path("/stock-screeners/price-based/top-gainers/today/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stock-screeners/price-based/top-losers/today/"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let record = TopPerformersSource::new(context(mock_settings(&server.uri()))).fetch().await;

    assert_eq!(record.status, RecordStatus::Partial);
    assert_eq!(record.payload.gainers.len(), 1);
    assert!(record.payload.losers.is_empty());
    assert!(record.error.unwrap().starts_with("losers unavailable"));
}

// ==================== Technical snapshot ====================

fn rising(bars: usize) -> Vec<f64> {
    (0..bars).map(|i| 22000.0 + i as f64 * 5.0).collect()
}

async fn mount_chart(server: &MockServer, encoded_symbol: &str, closes: &[f64]) {
    Mock::given(method("GET"))
        .and(path(format!("/v8/finance/chart/{}", encoded_symbol)))
        .and(query_param("range", "6mo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chart(closes)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_technical_snapshot_partial_when_history_short() {
    let server = MockServer::start().await;
    mount_chart(&server, "%5ENSEI", &rising(60)).await;
    mount_chart(&server, "%5EBSESN", &rising(50)).await;
    // one bar short of the minimum
    mount_chart(&server, "%5ENSEBANK", &rising(49)).await;
    // ^CNXIT and ^CNXFMCG are not mounted and answer 404

    let record = TechnicalSnapshotSource::new(context(mock_settings(&server.uri()))).fetch().await;

    assert_eq!(record.status, RecordStatus::Partial);
    let names: Vec<&str> = record.payload.readings.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Nifty 50", "Sensex"]);
    assert_eq!(record.payload.readings[0].close, 22295.0);
    assert_eq!(record.payload.readings[0].rsi, 100.0);
    assert_eq!(record.error.as_deref(), Some("skipped: Nifty Bank, Nifty IT, Nifty FMCG"));
    assert!(!record.payload.as_of.is_empty());
}

#[tokio::test]
async fn test_technical_snapshot_fails_without_history() {
    let server = MockServer::start().await;
    mount_chart(&server, "%5ENSEI", &rising(20)).await;

    let record = TechnicalSnapshotSource::new(context(mock_settings(&server.uri()))).fetch().await;

    assert_eq!(record.status, RecordStatus::Failed);
    assert!(record.payload.readings.is_empty());
    assert_eq!(record.error.as_deref(), Some("No index had enough history"));
}

// ==================== Sector movement ====================

const SECTOR_PATH: &str = "/equity/sector-industry-analysis/sector/day/";

fn sector_row(name: &str, change: f64) -> String {
    format!("<tr><td>{}</td><td>{:.2}%</td><td>-</td><td>10</td><td>5</td></tr>", name, change)
}

async fn mount_sector_page(server: &MockServer, html: String) {
    Mock::given(method("GET"))
        .and(path(SECTOR_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_sector_page_uses_later_table_selector() {
    let server = MockServer::start().await;
    let html = format!(
        r#"<html><body>
        <div class="table-responsive"><table><thead><tr><th>Sector</th><th>Change</th></tr></thead></table></div>
        <div class="dataTables_wrapper"><table><tbody>{}{}</tbody></table></div>
        </body></html>"#,
        sector_row("Oil &amp; Gas", -0.35),
        sector_row("Banking and Finance", 1.20),
    );
    mount_sector_page(&server, html).await;

    let record = SectorSource::new(context(mock_settings(&server.uri()))).fetch().await;

    assert_eq!(record.status, RecordStatus::Ok);
    let names: Vec<&str> = record.payload.sectors.iter().map(|s| s.sector_name.as_str()).collect();
    assert_eq!(names, vec!["Banking & Financial Services", "Energy"]);
    assert_eq!(record.payload.sectors[0].num_companies, 15);
}

#[tokio::test]
async fn test_sector_page_capped_and_last_row_wins() {
    let server = MockServer::start().await;
    let rows: String = [
        ("Software", 1.0),
        ("Banks", 0.5),
        ("Pharma", 0.2),
        ("Oil &amp; Gas", -0.1),
        ("FMCG", 0.3),
        ("Automobiles", 1.5),
        ("Realty", -1.0),
        ("Cement", 0.9),
        ("Metals", 2.0),
        ("Telecom", -0.4),
        ("Fertilizers", 0.6),
        ("Textiles", -2.0),
        ("Hotels", -3.0),
        ("Private Banks", 3.0),
    ]
    .iter()
    .map(|(name, change)| sector_row(name, *change))
    .collect();
    mount_sector_page(&server, format!(r#"<div class="table-responsive"><table>{}</table></div>"#, rows)).await;

    let record = SectorSource::new(context(mock_settings(&server.uri()))).fetch().await;

    assert_eq!(record.status, RecordStatus::Ok);
    let sectors = &record.payload.sectors;
    assert_eq!(sectors.len(), 11);
    // "Private Banks" replaced the earlier "Banks" row
    assert_eq!(sectors[0].sector_name, "Banking & Financial Services");
    assert_eq!(sectors[0].change_percent, 3.0);
    assert_eq!(sectors.iter().filter(|s| s.sector_name == "Banking & Financial Services").count(), 1);
    assert_eq!(sectors[10].sector_name, "Realty");
    assert!(sectors.iter().all(|s| s.sector_name != "Textiles" && s.sector_name != "Hotels"));
}

#[tokio::test]
async fn test_sector_page_without_table_fails() {
    let server = MockServer::start().await;
    mount_sector_page(&server, "<html><body>Down for maintenance</body></html>".to_string()).await;

    let record = SectorSource::new(context(mock_settings(&server.uri()))).fetch().await;

    assert_eq!(record.status, RecordStatus::Failed);
    assert!(record.payload.sectors.is_empty());
    assert!(record.error.unwrap().contains("sector table"));
}

// ==================== Financial indicators ====================

#[tokio::test]
async fn test_indicators_without_alpha_vantage_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/INR%3DX"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chart(&[86.5, 86.9])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/%5EDJI"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chart(&[41000.0, 40500.0])))
        .mount(&server)
        .await;

    let record = FinancialIndicatorsSource::new(context(mock_settings(&server.uri()))).fetch().await;

    assert_eq!(record.status, RecordStatus::Partial);
    let indicators = &record.payload.indicators;
    assert_eq!(indicators.len(), 6);
    let inr = indicators.iter().find(|i| i.name == "USD/INR").unwrap();
    assert_eq!(inr.value, "₹86.90");
    assert_eq!(inr.percent_change, "0.46%");
    assert_eq!(inr.remarks, "INR weakened");
    let dow = indicators.iter().find(|i| i.name == "Dow Jones").unwrap();
    assert_eq!(dow.remarks, "Down");
    assert!(!indicators.iter().find(|i| i.name == "Nikkei").unwrap().is_available());
}

#[tokio::test]
async fn test_indicators_with_alpha_vantage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/INR%3DX"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chart(&[86.5, 86.9])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/query"))
        .and(query_param("function", "WTI"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Crude Oil Prices WTI",
            "data": [
                { "date": "2025-03-14", "value": "67.20" },
                { "date": "2025-03-13", "value": "." },
                { "date": "2025-03-12", "value": "66.10" }
            ]
        })))
        .mount(&server)
        .await;
    // throttled on every attempt
    Mock::given(method("GET"))
        .and(path("/query"))
        .and(query_param("function", "BRENT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."
        })))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/query"))
        .and(query_param("function", "CURRENCY_EXCHANGE_RATE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Realtime Currency Exchange Rate": {
                "1. From_Currency Code": "XAU",
                "5. Exchange Rate": "2900.00",
                "6. Last Refreshed": "2025-03-14 10:00:01"
            }
        })))
        .mount(&server)
        .await;

    let mut settings = mock_settings(&server.uri());
    settings.alpha_vantage_key = ApiKey::from_env_value(Some("demo".to_string()));
    let record = FinancialIndicatorsSource::new(context(settings)).fetch().await;

    let indicators = &record.payload.indicators;
    assert_eq!(indicators.len(), 9);
    let wti = indicators.iter().find(|i| i.name == "Crude Oil (WTI)").unwrap();
    assert_eq!(wti.value, "$67.20");
    assert_eq!(wti.remarks, "Up");
    let brent = indicators.iter().find(|i| i.name == "Crude Oil (Brent)").unwrap();
    assert!(!brent.is_available());
    let gold = indicators.iter().find(|i| i.name == "Gold").unwrap();
    assert!(gold.value.starts_with('₹'));
    assert!(gold.value.ends_with("/10g"));
    assert_eq!(gold.percent_change, "N/A");
    assert_eq!(gold.remarks, "Last updated: 2025-03-14 10:00:01");
}

// ==================== News + text generation ====================

const CNBC_PAGE: &str = r#"
    <div class="Card-standardBreakerCard"><a class="Card-title" href="/2025/03/14/fed.html">Fed signals patience on rate cuts</a></div>
    <div class="Card-standardBreakerCard"><a class="Card-title" href="/2025/03/14/rbi.html">RBI governor flags sticky food inflation</a></div>"#;

const FE_PAGE: &str = r#"
    <article><h3 class="title">Metal stocks slide as China demand cools</h3><a href="/market/metals/">read</a></article>"#;

async fn mount_news(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/cnbc/markets/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CNBC_PAGE))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fe/market/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FE_PAGE))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_news_without_credentials_uses_keyword_split() {
    let server = MockServer::start().await;
    mount_news(&server).await;

    let report = NewsSource::new(context(mock_settings(&server.uri()))).build_report().await;

    assert_eq!(report.record.status, RecordStatus::Partial);
    assert_eq!(report.insights.lines().to_vec(), vec![NEWS_IMPACT_UNAVAILABLE.to_string()]);
    assert_eq!(report.record.payload.article_count, 3);
    assert_eq!(
        report.record.payload.india_news,
        vec![
            "RBI governor flags sticky food inflation (Source: CNBC)",
            "Metal stocks slide as China demand cools (Source: Financial Express)",
        ]
    );
    assert_eq!(report.record.payload.global_news, vec!["Fed signals patience on rate cuts (Source: CNBC)"]);
}

#[tokio::test]
async fn test_news_analysis_through_chat_endpoint() {
    let server = MockServer::start().await;
    mount_news(&server).await;
    let reply = "NEWS IMPACT:\n- Patient Fed keeps FPI flows cautious\n- Metal names under pressure\n\n\
        INDIA NEWS:\n- RBI flags food inflation\n\nGLOBAL NEWS:\n- Fed on hold";
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(reply)))
        .expect(1)
        .mount(&server)
        .await;

    let settings = mock_settings(&server.uri());
    let ctx = SourceContext::new(Arc::new(settings), InsightGenerator::from_config(&ai_config(&server.uri())));
    let report = NewsSource::new(ctx).build_report().await;

    assert_eq!(report.record.status, RecordStatus::Ok);
    assert_eq!(report.insights.lines().len(), 2);
    assert_eq!(report.record.payload.india_news, vec!["- RBI flags food inflation"]);
    assert_eq!(report.record.payload.global_news, vec!["- Fed on hold"]);
}

#[tokio::test]
async fn test_chat_endpoint_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("model overloaded"))
        .mount(&server)
        .await;

    let generator = InsightGenerator::from_config(&ai_config(&server.uri()));
    assert!(generator.is_enabled());
    let err = generator.complete("anything").await.unwrap_err();
    assert!(err.to_string().contains("model overloaded"));
}

#[tokio::test]
async fn test_missing_key_disables_generator() {
    let config = AIConfig { api_key: None, ..AIConfig::default() };
    let generator = InsightGenerator::from_config(&config);
    assert!(!generator.is_enabled());
    assert!(generator.complete("anything").await.is_err());
}

// ==================== Full run without credentials ====================

#[tokio::test]
async fn test_pipeline_without_text_generation_credentials() {
    let server = MockServer::start().await;
    mount_chart(&server, "%5ENSEI", &rising(60)).await;
    mount_sector_page(
        &server,
        format!(r#"<table class="table">{}</table>"#, sector_row("Banks", 0.8)),
    )
    .await;
    // every other upstream answers 404
    let pipeline = Pipeline::from_context(context(mock_settings(&server.uri())));

    let (tx, mut rx) = mpsc::channel(32);
    let snapshot = pipeline.stream(tx).await;
    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }

    assert!(matches!(events.first(), Some(StreamEvent::Start { .. })));
    assert!(matches!(events.last(), Some(StreamEvent::Complete { .. })));
    assert_eq!(snapshot.len(), 10);

    match snapshot.get(SectionName::SectorMovement) {
        Some(SectionData::SectorMovement(r)) => {
            assert!(!r.record.is_failed());
            assert!(r.insights.is_unavailable());
        }
        other => panic!("unexpected sector section: {:?}", other.map(|d| d.name())),
    }
    match snapshot.get(SectionName::TechnicalSnapshot) {
        Some(SectionData::TechnicalSnapshot(r)) => {
            assert_eq!(r.record.status, RecordStatus::Partial);
            assert!(r.insights.is_unavailable());
        }
        other => panic!("unexpected technical section: {:?}", other.map(|d| d.name())),
    }
    for name in SectionName::DERIVED {
        let section = snapshot.get(name).unwrap();
        assert!(section.is_failed(), "{}", name);
        match section {
            SectionData::MarketAnalysis(r) | SectionData::MarketSummary(r) | SectionData::MarketPredictions(r) => {
                assert!(r.payload.is_unavailable())
            }
            _ => panic!("{} is not a narrative section", name),
        }
    }
}
