use async_trait::async_trait;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

use crate::error::SourceError;
use crate::models::news::{NewsArticle, NewsHighlights};
use crate::models::record::{Insight, NormalizedRecord};
use crate::models::section::{SectionData, SectionName, SectionReport};
use crate::services::ai_service::clean_bullets;
use crate::services::source::{SectionSource, SourceContext};
use crate::utils::http::ScrapeSession;
use crate::utils::parse::squash_whitespace;

const SOURCE_NAME: &str = "CNBC / Financial Express";
const ARTICLES_PER_SITE: usize = 15;
const PER_CATEGORY: usize = 10;
const BULLETS_PER_BLOCK: usize = 7;
const MIN_LINK_TITLE_CHARS: usize = 16;
pub const NEWS_IMPACT_UNAVAILABLE: &str = "News impact analysis unavailable";

/// CSS selector cascades for one news site, tried in order.
pub struct SiteSelectors {
    pub container: &'static [&'static str],
    pub title: &'static [&'static str],
    pub link: &'static [&'static str],
}

pub const CNBC_SELECTORS: SiteSelectors = SiteSelectors {
    container: &["div.Card-standardBreakerCard", "div.Card", "div.SearchResult-searchResult"],
    title: &["a.Card-title", "div.Card-titleContainer", "div.SearchResult-searchResultTitle"],
    link: &["a.Card-title", "a.resultlink", "a"],
};

pub const FINANCIAL_EXPRESS_SELECTORS: SiteSelectors = SiteSelectors {
    container: &["div.stories-card", "div.ie-stories", "div.article-list", "article"],
    title: &["h3.title", "h4.entry-title a", "h2 a", "h3 a"],
    link: &["a.stories-card-heading-link", "a"],
};

pub const DEFAULT_SELECTORS: SiteSelectors = SiteSelectors {
    container: &[
        "article", "div.article", "div.card", "div.post", "div.item",
        "div.story", "div.news-item", ".story-card", ".news-card",
    ],
    title: &["h1", "h2", "h3", "h4", "a.title", "div.title", "a.headline"],
    link: &["a", "a.readmore", "a.title-link"],
};

const INDIA_TERMS: &[&str] = &[
    "india", "indian", "mumbai", "delhi", "bse", "nse", "sensex", "nifty", "rupee",
    "rbi", "sebi", "finance minister", "pm modi", "government of india",
];

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn first_text(container: ElementRef, cascade: &[&str]) -> Option<String> {
    cascade.iter().filter_map(|css| selector(css)).find_map(|sel| {
        container
            .select(&sel)
            .map(|el| squash_whitespace(&el.text().collect::<String>()))
            .find(|t| !t.is_empty())
    })
}

/// Absolute http(s) link from the cascade, relative hrefs resolved against `base`.
fn first_link(container: ElementRef, cascade: &[&str], base: Option<&Url>) -> Option<String> {
    cascade.iter().filter_map(|css| selector(css)).find_map(|sel| {
        container.select(&sel).filter_map(|a| a.value().attr("href")).find_map(|href| {
            let href = href.trim();
            if href.starts_with("http") {
                return Some(href.to_string());
            }
            base.and_then(|b| b.join(href).ok())
                .filter(|u| u.scheme().starts_with("http"))
                .map(|u| u.to_string())
        })
    })
}

fn title_from_links(container: ElementRef) -> Option<String> {
    let sel = selector("a")?;
    container
        .select(&sel)
        .map(|a| squash_whitespace(&a.text().collect::<String>()))
        .find(|t| t.chars().count() >= MIN_LINK_TITLE_CHARS)
}

/// Headlines from a listing page. Site containers are tried first, then the
/// generic set; duplicate titles are dropped.
pub fn parse_articles(html: &str, page_url: &str, source: &str, site: &SiteSelectors, limit: usize) -> Vec<NewsArticle> {
    let doc = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    let containers: Vec<ElementRef> = site
        .container
        .iter()
        .chain(DEFAULT_SELECTORS.container.iter())
        .filter_map(|css| selector(css))
        .map(|sel| doc.select(&sel).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
        .unwrap_or_default();

    let mut seen = HashSet::new();
    let mut articles = Vec::new();
    for container in containers {
        if articles.len() >= limit {
            break;
        }
        let title = first_text(container, site.title)
            .or_else(|| first_text(container, DEFAULT_SELECTORS.title))
            .or_else(|| title_from_links(container));
        let Some(title) = title else {
            continue;
        };
        if !seen.insert(title.to_lowercase()) {
            continue;
        }
        articles.push(NewsArticle {
            title,
            link: first_link(container, site.link, base.as_ref()),
            source: source.to_string(),
        });
    }
    articles
}

/// Whole-word (or whole-phrase) match on a lowercased, punctuation-free copy.
fn mentions(text: &str, term: &str) -> bool {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    format!(" {} ", squash_whitespace(&normalized)).contains(&format!(" {} ", term))
}

/// Keyword split used when no model analysis is available.
pub fn classify_headlines(articles: &[NewsArticle]) -> (Vec<String>, Vec<String>) {
    let mut india = Vec::new();
    let mut global = Vec::new();
    for article in articles {
        let bullet = format!("{} (Source: {})", article.title, article.source);
        let is_india = article.source == "Financial Express" || INDIA_TERMS.iter().any(|t| mentions(&article.title, t));
        if is_india {
            india.push(bullet);
        } else {
            global.push(bullet);
        }
    }
    india.truncate(PER_CATEGORY);
    global.truncate(PER_CATEGORY);
    (india, global)
}

#[derive(Debug, Default, PartialEq)]
pub struct NewsAnalysis {
    pub impact: Vec<String>,
    pub india: Vec<String>,
    pub global: Vec<String>,
}

/// Split a model reply into its NEWS IMPACT / INDIA NEWS / GLOBAL NEWS blocks.
/// Only "-" lines under a recognised header are kept.
pub fn parse_news_analysis(raw: &str) -> NewsAnalysis {
    #[derive(Clone, Copy)]
    enum Block {
        Impact,
        India,
        Global,
    }
    let mut blocks: [Vec<&str>; 3] = Default::default();
    let mut current: Option<Block> = None;
    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let upper = line.to_uppercase();
        if upper.contains("NEWS IMPACT:") {
            current = Some(Block::Impact);
        } else if upper.contains("INDIA NEWS:") {
            current = Some(Block::India);
        } else if upper.contains("GLOBAL NEWS:") {
            current = Some(Block::Global);
        } else if let (true, Some(block)) = (line.starts_with('-'), current) {
            blocks[block as usize].push(line);
        }
    }
    let [impact, india, global] = blocks.map(|lines| clean_bullets(&lines.join("\n"), &[], BULLETS_PER_BLOCK));
    NewsAnalysis { impact, india, global }
}

fn analysis_prompt(articles: &[NewsArticle]) -> String {
    let headlines = articles
        .iter()
        .map(|a| format!("- {} (Source: {})", a.title, a.source))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "As a financial news analyst, analyze these news headlines and provide:\n\
        1. A concise news impact analysis (6-7 bullet points)\n\
        2. India-specific and global news (6-7 points each)\n\
        \n\
        News Headlines:\n\
        {headlines}\n\
        \n\
        Guidelines:\n\
        - Each point is one clear sentence under 20 words, starting with a dash (-)\n\
        - Focus on market implications and include specific data points where available\n\
        \n\
        Format your response as:\n\
        NEWS IMPACT:\n\
        [6-7 bullet points]\n\
        \n\
        INDIA NEWS:\n\
        [6-7 bullet points]\n\
        \n\
        GLOBAL NEWS:\n\
        [6-7 bullet points]"
    )
}

pub struct NewsSource {
    ctx: SourceContext,
}

impl NewsSource {
    pub fn new(ctx: SourceContext) -> Self {
        Self { ctx }
    }

    /// Headlines from both sites, fetched concurrently. One site failing is
    /// tolerated; both failing (or no headlines at all) is an error.
    pub async fn fetch_articles(&self) -> Result<Vec<NewsArticle>, SourceError> {
        let session = self.ctx.open_session("news_highlights")?;
        let sources = &self.ctx.settings.sources;
        let (cnbc, fe) = futures::join!(
            self.scrape_site(&session, &sources.cnbc_markets, "CNBC", &CNBC_SELECTORS),
            self.scrape_site(&session, &sources.financial_express_markets, "Financial Express", &FINANCIAL_EXPRESS_SELECTORS),
        );

        let mut articles = Vec::new();
        let mut errors = Vec::new();
        for (site, result) in [("CNBC", cnbc), ("Financial Express", fe)] {
            match result {
                Ok(found) => {
                    log::info!("Scraped {} articles from {}", found.len(), site);
                    articles.extend(found);
                }
                Err(e) => {
                    log::error!("Error scraping {}: {}", site, e);
                    errors.push(format!("{}: {}", site, e));
                }
            }
        }
        if articles.is_empty() {
            return Err(if errors.is_empty() {
                SourceError::no_match("news headlines")
            } else {
                SourceError::parse(errors.join("; "))
            });
        }
        Ok(articles)
    }

    async fn scrape_site(
        &self,
        session: &ScrapeSession,
        url: &str,
        source: &str,
        site: &SiteSelectors,
    ) -> Result<Vec<NewsArticle>, SourceError> {
        let html = session.get_text_retrying(&self.ctx.settings.retry, url).await?;
        Ok(parse_articles(&html, url, source, site, ARTICLES_PER_SITE))
    }

    async fn analyze(&self, articles: &[NewsArticle]) -> Result<NewsAnalysis, String> {
        let raw = self
            .ctx
            .insights
            .complete(&analysis_prompt(articles))
            .await
            .map_err(|e| e.to_string())?;
        let analysis = parse_news_analysis(&raw);
        if analysis.impact.is_empty() && analysis.india.is_empty() && analysis.global.is_empty() {
            return Err("model reply had no recognisable sections".to_string());
        }
        Ok(analysis)
    }

    pub async fn build_report(&self) -> SectionReport<NewsHighlights> {
        let articles = match self.fetch_articles().await {
            Ok(a) => a,
            Err(e) => return SectionReport::failed(NormalizedRecord::failed(SOURCE_NAME, e.to_string())),
        };
        let article_count = articles.len();

        match self.analyze(&articles).await {
            Ok(analysis) => {
                let insights = if analysis.impact.is_empty() {
                    Insight::unavailable()
                } else {
                    Insight::new(analysis.impact)
                };
                let payload = NewsHighlights {
                    india_news: analysis.india,
                    global_news: analysis.global,
                    article_count,
                };
                SectionReport::new(NormalizedRecord::ok(SOURCE_NAME, payload), insights)
            }
            Err(reason) => {
                log::warn!("News analysis unavailable, falling back to keyword split: {}", reason);
                let (india_news, global_news) = classify_headlines(&articles);
                let payload = NewsHighlights { india_news, global_news, article_count };
                SectionReport::new(
                    NormalizedRecord::partial(SOURCE_NAME, payload, format!("news analysis unavailable: {}", reason)),
                    Insight::new(vec![NEWS_IMPACT_UNAVAILABLE.to_string()]),
                )
            }
        }
    }
}

#[async_trait]
impl SectionSource for NewsSource {
    fn name(&self) -> SectionName {
        SectionName::NewsHighlights
    }

    async fn collect(&self) -> SectionData {
        SectionData::NewsHighlights(self.build_report().await)
    }
}
