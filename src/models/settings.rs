use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::ai::{AIConfig, ApiKey};
use crate::utils::retry::RetryPolicy;

/// How primary sections are scheduled for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Every primary section on its own task; emission still follows declared order.
    #[default]
    Concurrent,
    /// One section after another on the coordinating task.
    Sequential,
}

impl ExecutionMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "concurrent" | "parallel" => Some(Self::Concurrent),
            "sequential" | "serial" => Some(Self::Sequential),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
        }
    }
}

/// Upstream base URLs. Overridable so tests can point at a mock server.
#[derive(Debug, Clone)]
pub struct SourceUrls {
    pub yahoo_chart: String,
    pub trendlyne: String,
    pub moneycontrol_fii: String,
    pub cnbc_markets: String,
    pub financial_express_markets: String,
    pub alpha_vantage: String,
}

impl Default for SourceUrls {
    fn default() -> Self {
        Self {
            yahoo_chart: "https://query1.finance.yahoo.com".to_string(),
            trendlyne: "https://trendlyne.com".to_string(),
            moneycontrol_fii: "https://www.moneycontrol.com/stocks/marketstats/fii_dii_activity/index.php".to_string(),
            cnbc_markets: "https://www.cnbc.com/markets/".to_string(),
            financial_express_markets: "https://www.financialexpress.com/market/".to_string(),
            alpha_vantage: "https://www.alphavantage.co".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
    pub http: HttpSettings,
    pub retry: RetryPolicy,
    pub ai: AIConfig,
    pub alpha_vantage_key: Option<ApiKey>,
    pub sources: SourceUrls,
    pub execution: ExecutionMode,
    pub log_file: Option<PathBuf>,
    /// Problems met while loading, logged once logging is up.
    pub notices: Vec<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8009,
            http: HttpSettings::default(),
            retry: RetryPolicy::default(),
            ai: AIConfig::default(),
            alpha_vantage_key: None,
            sources: SourceUrls::default(),
            execution: ExecutionMode::default(),
            log_file: None,
            notices: Vec::new(),
        }
    }
}

impl AppSettings {
    /// Read settings from the process environment (after `.env` is loaded).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Unparseable values fall back to
    /// defaults with a notice; nothing here fails startup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut s = Self::default();
        let mut notices = Vec::new();

        if let Some(v) = lookup("HOST").filter(|v| !v.trim().is_empty()) {
            s.host = v;
        }
        s.port = parsed(&lookup, &mut notices, "PORT").unwrap_or(s.port);

        s.http.connect_timeout_secs = parsed(&lookup, &mut notices, "HTTP_CONNECT_TIMEOUT_SECS").unwrap_or(s.http.connect_timeout_secs);
        s.http.read_timeout_secs = parsed(&lookup, &mut notices, "HTTP_READ_TIMEOUT_SECS").unwrap_or(s.http.read_timeout_secs);

        s.retry.max_retries = parsed(&lookup, &mut notices, "RETRY_MAX_RETRIES").unwrap_or(s.retry.max_retries);
        if let Some(ms) = parsed::<u64, _>(&lookup, &mut notices, "RETRY_INITIAL_DELAY_MS") {
            s.retry.initial_delay = Duration::from_millis(ms);
        }

        s.ai.api_key = ApiKey::from_env_value(lookup("GEMINI_API_KEY"))
            .or_else(|| ApiKey::from_env_value(lookup("LLM_API_KEY")));
        if s.ai.api_key.is_none() {
            notices.push("GEMINI_API_KEY not set; insights will use placeholders".to_string());
        }
        if let Some(v) = lookup("LLM_BASE_URL").filter(|v| !v.trim().is_empty()) {
            s.ai.base_url = v;
        }
        if let Some(v) = lookup("LLM_MODEL").filter(|v| !v.trim().is_empty()) {
            s.ai.model_name = v;
        }
        s.ai.max_tokens = parsed(&lookup, &mut notices, "LLM_MAX_TOKENS").unwrap_or(s.ai.max_tokens);
        s.ai.temperature = parsed(&lookup, &mut notices, "LLM_TEMPERATURE").unwrap_or(s.ai.temperature);
        s.ai.timeout_secs = parsed(&lookup, &mut notices, "LLM_TIMEOUT_SECS").unwrap_or(s.ai.timeout_secs);

        s.alpha_vantage_key = ApiKey::from_env_value(lookup("ALPHA_VANTAGE_API_KEY"));

        let url_overrides: [(&str, &mut String); 6] = [
            ("YAHOO_CHART_BASE_URL", &mut s.sources.yahoo_chart),
            ("TRENDLYNE_BASE_URL", &mut s.sources.trendlyne),
            ("MONEYCONTROL_FII_URL", &mut s.sources.moneycontrol_fii),
            ("CNBC_MARKETS_URL", &mut s.sources.cnbc_markets),
            ("FINANCIAL_EXPRESS_MARKETS_URL", &mut s.sources.financial_express_markets),
            ("ALPHA_VANTAGE_BASE_URL", &mut s.sources.alpha_vantage),
        ];
        for (key, slot) in url_overrides {
            if let Some(v) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *slot = v.trim().to_string();
            }
        }

        if let Some(raw) = lookup("SECTION_EXECUTION") {
            match ExecutionMode::parse(&raw) {
                Some(mode) => s.execution = mode,
                None => notices.push(format!("Unknown SECTION_EXECUTION '{}', using {:?}", raw, s.execution)),
            }
        }

        s.log_file = lookup("LOG_FILE").filter(|v| !v.trim().is_empty()).map(PathBuf::from);
        s.notices = notices;
        s
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parsed<T, F>(lookup: &F, notices: &mut Vec<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            notices.push(format!("Ignoring invalid value for {}: '{}'", key, raw));
            None
        }
    }
}
