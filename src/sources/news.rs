//! Public health news adapter.
//!
//! Scrapes NYC and NYS press-release pages and parses the CDC Health
//! Alert Network RSS feed. Each sub-feed tolerates failure by returning
//! an empty list, so one broken upstream never loses the others' alerts.

use scraper::{Html, Selector};
use tracing::warn;

use super::{DataSource, SourceError};
use crate::fetch::HttpClient;
use crate::models::{NewsAlert, NewsData, Region};
use crate::repository::DatasetRepository;

const CDC_RSS_FEED: &str = "https://tools.cdc.gov/api/v2/resources/media/132608.rss";
const NYC_NEWS_URL: &str = "https://www.nyc.gov/site/doh/about/press/recent-press-releases.page";
const NYS_NEWS_URL: &str = "https://info.nystateofhealth.ny.gov/news";

/// Alerts kept per feed.
const MAX_ALERTS_PER_FEED: usize = 5;

/// Adapter for the news dataset.
#[derive(Clone)]
pub struct NewsSource {
    http: HttpClient,
    datasets: DatasetRepository,
}

impl NewsSource {
    pub fn new(http: HttpClient, datasets: DatasetRepository) -> Self {
        Self { http, datasets }
    }

    /// Current news snapshot grouped by region.
    pub async fn get_data(&self) -> Result<NewsData, SourceError> {
        let alerts = self.datasets.news_alerts().await?;

        let mut nyc = Vec::new();
        let mut nys = Vec::new();
        let mut usa = Vec::new();
        for alert in alerts {
            match alert.region {
                Region::Nyc => nyc.push(alert),
                Region::Nys => nys.push(alert),
                Region::Usa => usa.push(alert),
            }
        }

        Ok(NewsData {
            nyc,
            nys,
            usa,
            last_updated: chrono::Utc::now().to_rfc3339(),
        })
    }

    async fn fetch_nyc_news(&self) -> Vec<NewsAlert> {
        let body = match self.http.get_text(NYC_NEWS_URL).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to scrape NYC news: {}", e);
                return Vec::new();
            }
        };
        Self::parse_nyc_news(&body)
    }

    fn parse_nyc_news(body: &str) -> Vec<NewsAlert> {
        let document = Html::parse_document(body);
        let Ok(paragraphs) = Selector::parse("p") else {
            return Vec::new();
        };
        let Ok(strong_sel) = Selector::parse("strong") else {
            return Vec::new();
        };
        let Ok(link_sel) = Selector::parse("a") else {
            return Vec::new();
        };

        let mut alerts = Vec::new();
        for paragraph in document.select(&paragraphs) {
            if alerts.len() >= MAX_ALERTS_PER_FEED {
                break;
            }

            let date_text = paragraph
                .select(&strong_sel)
                .next()
                .map(|s| s.text().collect::<String>().trim().to_string());
            let link = paragraph.select(&link_sel).next();

            let (Some(date_text), Some(link)) = (date_text, link) else {
                continue;
            };
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let title = link.text().collect::<String>().trim().to_string();

            if date_text.is_empty() || title.is_empty() {
                continue;
            }

            let url = if href.starts_with('/') {
                format!("https://www.nyc.gov{}", href)
            } else {
                href.to_string()
            };

            alerts.push(NewsAlert {
                id: format!("nyc-{}", alerts.len()),
                title,
                summary: "Press Release via NYC Health".to_string(),
                date: date_text,
                severity: "info".to_string(),
                source: "NYC Department of Health".to_string(),
                url: Some(url),
                region: Region::Nyc,
            });
        }

        alerts
    }

    async fn fetch_nys_news(&self) -> Vec<NewsAlert> {
        let body = match self.http.get_text(NYS_NEWS_URL).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to scrape NYS news: {}", e);
                return Vec::new();
            }
        };
        Self::parse_nys_news(&body)
    }

    fn parse_nys_news(body: &str) -> Vec<NewsAlert> {
        let document = Html::parse_document(body);
        let Ok(article_sel) = Selector::parse("article.node--type-news") else {
            return Vec::new();
        };
        let Ok(title_sel) = Selector::parse("h2.node__title a") else {
            return Vec::new();
        };
        let Ok(date_sel) = Selector::parse(".field--name-field-publication-date time") else {
            return Vec::new();
        };

        let mut alerts = Vec::new();
        for article in document.select(&article_sel) {
            if alerts.len() >= MAX_ALERTS_PER_FEED {
                break;
            }

            let Some(link) = article.select(&title_sel).next() else {
                continue;
            };
            let title = link.text().collect::<String>().trim().to_string();
            let href = link.value().attr("href").unwrap_or("");

            let url = if href.starts_with('/') {
                format!("https://info.nystateofhealth.ny.gov{}", href)
            } else {
                href.to_string()
            };

            let date = article
                .select(&date_sel)
                .next()
                .map(|t| t.text().collect::<String>().trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%d").to_string());

            alerts.push(NewsAlert {
                id: format!("nys-{}", alerts.len()),
                title,
                summary: "News & Events via NY State of Health".to_string(),
                date,
                severity: "info".to_string(),
                source: "NY State of Health".to_string(),
                url: Some(url),
                region: Region::Nys,
            });
        }

        alerts
    }

    async fn fetch_cdc_news(&self) -> Vec<NewsAlert> {
        let body = match self.http.get_text(CDC_RSS_FEED).await {
            Ok(body) => body,
            Err(e) => {
                warn!("CDC news fetch failed: {}", e);
                return Vec::new();
            }
        };
        Self::parse_cdc_feed(body.as_bytes())
    }

    fn parse_cdc_feed(bytes: &[u8]) -> Vec<NewsAlert> {
        let feed = match feed_rs::parser::parse(bytes) {
            Ok(feed) => feed,
            Err(e) => {
                warn!("CDC feed parse failed: {}", e);
                return Vec::new();
            }
        };

        feed.entries
            .into_iter()
            .take(MAX_ALERTS_PER_FEED)
            .enumerate()
            .map(|(index, entry)| NewsAlert {
                id: format!("cdc-{}", index),
                title: entry
                    .title
                    .map(|t| t.content)
                    .unwrap_or_else(|| "Unknown Alert".to_string()),
                summary: entry.summary.map(|s| s.content).unwrap_or_default(),
                date: entry
                    .published
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
                severity: "info".to_string(),
                source: "CDC Health Alert Network".to_string(),
                url: entry.links.first().map(|l| l.href.clone()),
                region: Region::Usa,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl DataSource for NewsSource {
    fn name(&self) -> &'static str {
        "news"
    }

    async fn sync_data(&self) -> Result<usize, SourceError> {
        let (nyc, nys, cdc) = tokio::join!(
            self.fetch_nyc_news(),
            self.fetch_nys_news(),
            self.fetch_cdc_news()
        );

        let mut alerts = nyc;
        alerts.extend(nys);
        alerts.extend(cdc);

        self.datasets.replace_news(&alerts).await?;
        Ok(alerts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nyc_news_page() {
        let html = r#"<html><body>
            <p><strong>June 15, 2025</strong> <a href="/site/doh/press1.page">Measles Update</a></p>
            <p><strong>June 10, 2025</strong> <a href="https://example.com/press2">Heat Advisory</a></p>
            <p>No link or date here</p>
        </body></html>"#;

        let alerts = NewsSource::parse_nyc_news(html);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].title, "Measles Update");
        assert_eq!(alerts[0].date, "June 15, 2025");
        assert_eq!(
            alerts[0].url.as_deref(),
            Some("https://www.nyc.gov/site/doh/press1.page")
        );
        assert_eq!(alerts[1].url.as_deref(), Some("https://example.com/press2"));
        assert_eq!(alerts[0].region, Region::Nyc);
    }

    #[test]
    fn test_parse_nyc_news_caps_alerts() {
        let item =
            r#"<p><strong>June 15, 2025</strong> <a href="/press.page">Press Release</a></p>"#;
        let html = format!("<html><body>{}</body></html>", item.repeat(10));

        let alerts = NewsSource::parse_nyc_news(&html);
        assert_eq!(alerts.len(), MAX_ALERTS_PER_FEED);
    }

    #[test]
    fn test_parse_nys_news_page() {
        let html = r#"<html><body>
            <article class="node--type-news">
                <h2 class="node__title"><a href="/news/enrollment">Enrollment Update</a></h2>
                <div class="field--name-field-publication-date"><time>2025-06-12</time></div>
            </article>
            <article class="node--type-other">
                <h2 class="node__title"><a href="/news/skip">Not News</a></h2>
            </article>
        </body></html>"#;

        let alerts = NewsSource::parse_nys_news(html);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "Enrollment Update");
        assert_eq!(alerts[0].date, "2025-06-12");
        assert_eq!(
            alerts[0].url.as_deref(),
            Some("https://info.nystateofhealth.ny.gov/news/enrollment")
        );
        assert_eq!(alerts[0].region, Region::Nys);
    }

    #[test]
    fn test_parse_cdc_rss() {
        let rss = r#"<?xml version="1.0" encoding="UTF-8"?>
            <rss version="2.0"><channel>
                <title>HAN Archive</title>
                <item>
                    <title>Health Advisory: Measles</title>
                    <description>Advisory text</description>
                    <link>https://emergency.cdc.gov/han/2025/han00123.asp</link>
                    <pubDate>Sun, 15 Jun 2025 12:00:00 GMT</pubDate>
                </item>
                <item>
                    <title>Health Update: Mpox</title>
                    <description>Update text</description>
                    <link>https://emergency.cdc.gov/han/2025/han00124.asp</link>
                    <pubDate>Sat, 14 Jun 2025 12:00:00 GMT</pubDate>
                </item>
            </channel></rss>"#;

        let alerts = NewsSource::parse_cdc_feed(rss.as_bytes());
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].id, "cdc-0");
        assert_eq!(alerts[0].title, "Health Advisory: Measles");
        assert_eq!(alerts[0].summary, "Advisory text");
        assert_eq!(
            alerts[0].url.as_deref(),
            Some("https://emergency.cdc.gov/han/2025/han00123.asp")
        );
        assert_eq!(alerts[0].region, Region::Usa);
    }

    #[test]
    fn test_parse_cdc_feed_garbage_is_empty() {
        assert!(NewsSource::parse_cdc_feed(b"not xml at all").is_empty());
    }
}
