use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::{HeaderMap, USER_AGENT};
use scraper::Html;
use serde::Serialize;
use thiserror::Error;

pub const EXCERPT_CHARS: usize = 170;
pub const DEFAULT_TITLE: &str = "Untitled";
pub const DEFAULT_EXCERPT: &str = "Read this post on Medium.";

const TRACKING_MARKER: &str = "?source=";

lazy_static! {
    static ref ITEM_RE: Regex = Regex::new(r"(?s)<item>.*?</item>").unwrap();
    static ref CDATA_TITLE_RE: Regex =
        Regex::new(r"(?s)<title><!\[CDATA\[(.*?)\]\]></title>").unwrap();
    static ref TITLE_RE: Regex = Regex::new(r"(?s)<title>(.*?)</title>").unwrap();
    static ref LINK_RE: Regex = Regex::new(r"(?s)<link>(.*?)</link>").unwrap();
    static ref PUB_DATE_RE: Regex = Regex::new(r"(?s)<pubDate>(.*?)</pubDate>").unwrap();
    static ref CONTENT_RE: Regex =
        Regex::new(r"(?s)<content:encoded><!\[CDATA\[(.*?)\]\]></content:encoded>").unwrap();
    static ref CDATA_DESCRIPTION_RE: Regex =
        Regex::new(r"(?s)<description><!\[CDATA\[(.*?)\]\]></description>").unwrap();
    static ref DESCRIPTION_RE: Regex =
        Regex::new(r"(?s)<description>(.*?)</description>").unwrap();
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("feed responded with status {0}")]
    Status(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedPost {
    pub title: String,
    pub link: String,
    #[serde(rename = "pubDate")]
    pub pub_date: String,
    pub excerpt: String,
}

/// Where the raw feed document comes from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<String, FeedError>;
}

pub struct HttpFeedSource {
    url: String,
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

fn build_user_agent() -> HeaderMap {
    let custom_user_agent = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36";

    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, custom_user_agent.parse().unwrap());
    headers
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self) -> Result<String, FeedError> {
        let response = self
            .client
            .get(&self.url)
            .headers(build_user_agent())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        Ok(response.text().await?)
    }
}

/// Parses up to `limit` posts out of an RSS document, in feed order.
pub fn parse_feed(xml: &str, fallback_link: &str, limit: usize) -> Vec<FeedPost> {
    ITEM_RE
        .find_iter(xml)
        .take(limit)
        .map(|item| parse_item(item.as_str(), fallback_link))
        .collect()
}

fn parse_item(item: &str, fallback_link: &str) -> FeedPost {
    let title = capture(&CDATA_TITLE_RE, item)
        .or_else(|| capture(&TITLE_RE, item))
        .unwrap_or(DEFAULT_TITLE)
        .trim()
        .to_string();

    let link = capture(&LINK_RE, item).unwrap_or(fallback_link).trim();
    let pub_date = capture(&PUB_DATE_RE, item).unwrap_or("").trim().to_string();

    let body = capture(&CONTENT_RE, item)
        .or_else(|| capture(&CDATA_DESCRIPTION_RE, item))
        .or_else(|| capture(&DESCRIPTION_RE, item))
        .unwrap_or("");

    FeedPost {
        title,
        link: strip_tracking(link).to_string(),
        pub_date,
        excerpt: build_excerpt(body),
    }
}

fn capture<'a>(re: &Regex, haystack: &'a str) -> Option<&'a str> {
    re.captures(haystack)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub fn strip_tracking(link: &str) -> &str {
    match link.find(TRACKING_MARKER) {
        Some(pos) => &link[..pos],
        None => link,
    }
}

pub fn build_excerpt(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if text.is_empty() {
        return DEFAULT_EXCERPT.to_string();
    }

    let truncated: String = text.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", truncated)
}
