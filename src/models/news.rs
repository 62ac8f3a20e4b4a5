use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub source: String,
}

/// Headlines split by region. The impact bullets travel as the section's insight.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewsHighlights {
    pub india_news: Vec<String>,
    pub global_news: Vec<String>,
    pub article_count: usize,
}
