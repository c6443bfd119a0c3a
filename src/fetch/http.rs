//! `reqwest`-backed document source.

use super::{DocumentSource, FetchedPage};
use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::sites::domain_of;
use crate::utils::truncate_for_log;
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{debug, info, instrument, warn};

/// Fetches pages over HTTP and searches through a news RSS endpoint.
#[derive(Debug, Clone)]
pub struct HttpDocumentSource {
    client: reqwest::Client,
    search_endpoint: String,
    search_locale: String,
}

impl HttpDocumentSource {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.page_timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(HttpDocumentSource {
            client,
            search_endpoint: config.search_endpoint.clone(),
            search_locale: config.search_locale.clone(),
        })
    }

    fn search_url(&self, keyword: &str) -> String {
        let mut url = format!(
            "{}?q={}",
            self.search_endpoint,
            urlencoding::encode(keyword)
        );
        if !self.search_locale.is_empty() {
            url.push('&');
            url.push_str(&self.search_locale);
        }
        url
    }

    async fn get_text(&self, url: &str) -> Result<(String, String), FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        Ok((final_url, body))
    }
}

impl DocumentSource for HttpDocumentSource {
    /// A page that is still on the search host never reached its
    /// publisher. It is reported as a timeout so a later pass retries it.
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let (canonical_url, html) = self.get_text(url).await?;
        let search_host = domain_of(&self.search_endpoint);
        if search_host.is_some() && domain_of(&canonical_url) == search_host {
            warn!(%canonical_url, "Redirect never left the search host");
            return Err(FetchError::Timeout {
                url: url.to_string(),
            });
        }
        info!(%canonical_url, bytes = html.len(), "Fetched article page");
        Ok(FetchedPage { canonical_url, html })
    }

    #[instrument(level = "info", skip_all, fields(%keyword))]
    async fn search(&self, keyword: &str) -> Result<Vec<String>, FetchError> {
        let search_url = self.search_url(keyword);
        let (_, feed) = self
            .get_text(&search_url)
            .await
            .map_err(|e| FetchError::Search {
                keyword: keyword.to_string(),
                reason: e.to_string(),
            })?;
        let links = parse_search_feed(&feed).map_err(|reason| {
            warn!(feed = %truncate_for_log(&feed, 300), "Search feed did not parse");
            FetchError::Search {
                keyword: keyword.to_string(),
                reason,
            }
        })?;
        info!(count = links.len(), "Expanded keyword into article URLs");
        debug!(urls = ?links, "Search result URLs");
        Ok(links)
    }
}

/// Pull the `<link>` of every `<item>` out of an RSS document.
pub fn parse_search_feed(xml: &str) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut links = Vec::new();
    let mut in_item = false;
    let mut in_link = false;
    let mut current = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"item" => in_item = true,
                b"link" if in_item => {
                    in_link = true;
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"item" => in_item = false,
                b"link" if in_link => {
                    in_link = false;
                    let link = current.trim();
                    if !link.is_empty() {
                        links.push(link.to_string());
                    }
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) if in_link => {
                current.push_str(&e.decode().map(|s| s.into_owned()).unwrap_or_default());
            }
            Ok(Event::CData(ref e)) if in_link => {
                current.push_str(&String::from_utf8_lossy(e));
            }
            Ok(Event::GeneralRef(ref e)) if in_link => {
                let name = e.decode().map(|s| s.into_owned()).unwrap_or_default();
                current.push_str(&resolve_entity(&name));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "XML parse error at position {}: {e}",
                    reader.error_position()
                ));
            }
            _ => {}
        }
    }
    Ok(links)
}

fn resolve_entity(name: &str) -> String {
    match name {
        "amp" => "&".to_string(),
        "lt" => "<".to_string(),
        "gt" => ">".to_string(),
        "quot" => "\"".to_string(),
        "apos" => "'".to_string(),
        _ => name
            .strip_prefix("#x")
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .or_else(|| name.strip_prefix('#').and_then(|dec| dec.parse().ok()))
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| format!("&{name};")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <title>"tallow" - Google News</title>
  <link>https://news.google.com/search?q=tallow</link>
  <item>
    <title>Tallow prices climb</title>
    <link>https://www.fastmarkets.com/insights/tallow-prices-climb</link>
  </item>
  <item>
    <title>Feedstock outlook</title>
    <link>https://www.ers.usda.gov/outlook?a=1&amp;b=2</link>
  </item>
</channel></rss>"#;

    fn config_for(server: &MockServer) -> FetchConfig {
        FetchConfig {
            page_timeout_secs: 5,
            connect_timeout_secs: 5,
            search_endpoint: server.url("/rss/search"),
            search_locale: "hl=en-CA".to_string(),
            ..FetchConfig::default()
        }
    }

    #[test]
    fn test_parse_search_feed_reads_item_links_only() {
        let links = parse_search_feed(FEED).unwrap();
        assert_eq!(
            links,
            vec![
                "https://www.fastmarkets.com/insights/tallow-prices-climb".to_string(),
                "https://www.ers.usda.gov/outlook?a=1&b=2".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_search_feed_rejects_broken_xml() {
        assert!(parse_search_feed("<rss><channel><item><link>x</item>").is_err());
    }

    #[test]
    fn test_resolve_entity() {
        assert_eq!(resolve_entity("amp"), "&");
        assert_eq!(resolve_entity("#38"), "&");
        assert_eq!(resolve_entity("#x26"), "&");
        assert_eq!(resolve_entity("nbsp"), "&nbsp;");
    }

    #[tokio::test]
    async fn test_fetch_returns_page_and_final_url() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/article");
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body("<html><h1>Hello</h1></html>");
        });

        let source = HttpDocumentSource::new(&FetchConfig {
            page_timeout_secs: 5,
            ..FetchConfig::default()
        })
        .unwrap();
        let page = source.fetch(&server.url("/article")).await.unwrap();
        mock.assert();
        assert_eq!(page.canonical_url, server.url("/article"));
        assert_eq!(page.html, "<html><h1>Hello</h1></html>");
    }

    #[tokio::test]
    async fn test_fetch_stuck_on_search_host_is_transient() {
        let server = MockServer::start();
        let article = "/rss/articles/CBMiWkFVX3lxTE1hYmNkZWY?oc=5";
        let mock = server.mock(|when, then| {
            when.method(GET).path("/rss/articles/CBMiWkFVX3lxTE1hYmNkZWY");
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body("<html><script>window.location.replace('https://x');</script></html>");
        });

        let source = HttpDocumentSource::new(&config_for(&server)).unwrap();
        let err = source.fetch(&server.url(article)).await.unwrap_err();
        mock.assert();
        assert!(matches!(err, FetchError::Timeout { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_fetch_non_success_is_permanent() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/gone");
            then.status(404).body("not found");
        });

        let source = HttpDocumentSource::new(&config_for(&server)).unwrap();
        let err = source.fetch(&server.url("/gone")).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host_is_transient() {
        let source = HttpDocumentSource::new(&FetchConfig {
            connect_timeout_secs: 2,
            page_timeout_secs: 2,
            ..FetchConfig::default()
        })
        .unwrap();
        let err = source.fetch("http://127.0.0.1:1/").await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_search_expands_keyword() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/rss/search")
                .query_param("q", "renewable diesel")
                .query_param("hl", "en-CA");
            then.status(200)
                .header("content-type", "application/rss+xml")
                .body(FEED);
        });

        let source = HttpDocumentSource::new(&config_for(&server)).unwrap();
        let links = source.search("renewable diesel").await.unwrap();
        mock.assert();
        assert_eq!(links.len(), 2);
    }

    #[tokio::test]
    async fn test_search_failure_maps_to_search_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/rss/search");
            then.status(503);
        });

        let source = HttpDocumentSource::new(&config_for(&server)).unwrap();
        let err = source.search("tallow").await.unwrap_err();
        assert!(matches!(err, FetchError::Search { .. }));
    }
}
