use crate::domain::ports::DocumentSource;
use crate::utils::error::{MeteogramError, Result};
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use reqwest::header::{ACCEPT, CACHE_CONTROL, PRAGMA};
use reqwest::Client;
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

pub const DOCUMENT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DOCUMENT_ACCEPT: &str = "image/svg+xml,text/html;q=0.9,*/*;q=0.8";
const CACHE_BUST_PARAM: &str = "_ts";

/// Fetches a ready-made SVG, or the first `<svg>` of an HTML page.
#[derive(Debug, Clone)]
pub struct DocumentClient {
    client: Client,
    timeout: Duration,
}

impl DocumentClient {
    pub fn new() -> Self {
        Self::with_timeout(DOCUMENT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }
}

impl Default for DocumentClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentSource for DocumentClient {
    async fn fetch_document(&self, url: &str, attempt: u32) -> Result<String> {
        let target = cache_busted_url(url, Utc::now().timestamp_millis());
        tracing::debug!("Fetching SVG document (attempt {}): {}", attempt, target);

        // The request future owns the transfer; the timeout drops it and aborts the connection.
        let response = self
            .client
            .get(&target)
            .header(ACCEPT, DOCUMENT_ACCEPT)
            .header(CACHE_CONTROL, "no-store")
            .header(PRAGMA, "no-cache")
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("Document response status: {}", status);
        if !status.is_success() {
            return Err(MeteogramError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        svg_from_body(&body)
    }
}

/// Keeps SVG/XML bodies verbatim; otherwise pulls the first `<svg>` element out of HTML.
pub fn svg_from_body(body: &str) -> Result<String> {
    if looks_like_svg(body) {
        return Ok(body.to_string());
    }

    extract_svg_element(body)
        .map(str::to_string)
        .ok_or(MeteogramError::NoSvgElement)
}

fn looks_like_svg(body: &str) -> bool {
    let head: String = body.trim_start().chars().take(5).collect();
    let head = head.to_ascii_lowercase();
    head.starts_with("<svg") || head.starts_with("<?xml")
}

/// Appends a timestamp query parameter so intermediaries cannot serve a cached copy.
pub fn cache_busted_url(url: &str, stamp: i64) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed
                .query_pairs_mut()
                .append_pair(CACHE_BUST_PARAM, &stamp.to_string());
            parsed.into()
        }
        Err(_) => {
            let separator = if url.contains('?') { '&' } else { '?' };
            format!("{}{}{}={}", url, separator, CACHE_BUST_PARAM, stamp)
        }
    }
}

fn svg_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<(/?)svg[\s/>]").expect("valid svg tag pattern"))
}

/// Byte offset just past the `>` closing the tag that starts at `start`,
/// and whether the tag is self-closing.
fn tag_end(markup: &str, start: usize) -> Option<(usize, bool)> {
    let gt = markup[start..].find('>')? + start;
    let self_closing = markup[..gt].ends_with('/');
    Some((gt + 1, self_closing))
}

/// Returns the markup of the first `<svg>` element, nested `<svg>`s included.
///
/// An element left open at the end of the input runs to the end of the input.
pub fn extract_svg_element(markup: &str) -> Option<&str> {
    let mut tags = svg_tag_regex().captures_iter(markup);

    let (start, mut cursor) = loop {
        let caps = tags.next()?;
        if caps[1].is_empty() {
            let start = caps.get(0)?.start();
            let (end, self_closing) = tag_end(markup, start)?;
            if self_closing {
                return Some(&markup[start..end]);
            }
            break (start, end);
        }
    };

    let mut depth = 1usize;
    for caps in tags {
        let Some(m) = caps.get(0) else { continue };
        if m.start() < cursor {
            continue;
        }
        let Some((end, self_closing)) = tag_end(markup, m.start()) else {
            break;
        };
        cursor = end;

        if !caps[1].is_empty() {
            depth -= 1;
            if depth == 0 {
                return Some(&markup[start..end]);
            }
        } else if !self_closing {
            depth += 1;
        }
    }

    Some(&markup[start..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn cache_buster_appends_query_parameter() {
        assert_eq!(
            cache_busted_url("https://example.com/chart.svg", 42),
            "https://example.com/chart.svg?_ts=42"
        );
        assert_eq!(
            cache_busted_url("https://example.com/chart.svg?city=oslo", 42),
            "https://example.com/chart.svg?city=oslo&_ts=42"
        );
    }

    #[test]
    fn cache_buster_falls_back_to_string_append() {
        assert_eq!(cache_busted_url("chart.svg", 7), "chart.svg?_ts=7");
        assert_eq!(cache_busted_url("chart.svg?a=1", 7), "chart.svg?a=1&_ts=7");
    }

    #[test]
    fn extracts_first_svg_with_nested_children() {
        let html = r#"<html><body><p>hi</p><SVG viewBox="0 0 1 1"><svg><rect/></svg><svg/></SVG><svg id="second"></svg></body></html>"#;
        assert_eq!(
            extract_svg_element(html),
            Some(r#"<SVG viewBox="0 0 1 1"><svg><rect/></svg><svg/></SVG>"#)
        );
    }

    #[test]
    fn ignores_lookalike_tags() {
        let html = "<svgx></svgx><div><svg width=\"4\"><g/></svg></div>";
        assert_eq!(extract_svg_element(html), Some("<svg width=\"4\"><g/></svg>"));
        assert_eq!(extract_svg_element("<div>no chart</div>"), None);
    }

    #[test]
    fn verbatim_svg_and_xml_bodies() {
        let xml = "  <?xml version=\"1.0\"?>\n<svg></svg>";
        assert_eq!(svg_from_body(xml).unwrap(), xml);
        assert!(matches!(
            svg_from_body("<html></html>"),
            Err(MeteogramError::NoSvgElement)
        ));
    }

    #[tokio::test]
    async fn test_fetch_sets_headers_and_cache_buster() {
        let server = MockServer::start();
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"></svg>"#;
        let api_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/chart.svg")
                .query_param_exists("_ts")
                .header("accept", DOCUMENT_ACCEPT)
                .header("cache-control", "no-store");
            then.status(200)
                .header("Content-Type", "image/svg+xml")
                .body(svg);
        });

        let client = DocumentClient::new();
        let body = client
            .fetch_document(&server.url("/chart.svg"), 1)
            .await
            .unwrap();

        api_mock.assert();
        assert_eq!(body, svg);
    }

    #[tokio::test]
    async fn test_fetch_extracts_svg_from_html_page() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/page");
            then.status(200)
                .header("Content-Type", "text/html")
                .body("<!doctype html><html><body><h1>Forecast</h1><svg viewBox=\"0 0 5 5\"><circle r=\"1\"/></svg></body></html>");
        });

        let body = DocumentClient::new()
            .fetch_document(&server.url("/page"), 1)
            .await
            .unwrap();

        assert_eq!(body, "<svg viewBox=\"0 0 5 5\"><circle r=\"1\"/></svg>");
    }

    #[tokio::test]
    async fn test_fetch_html_without_svg_fails() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/page");
            then.status(200).body("<html><body>Not here</body></html>");
        });

        let err = DocumentClient::new()
            .fetch_document(&server.url("/page"), 2)
            .await
            .unwrap_err();

        assert!(matches!(err, MeteogramError::NoSvgElement));
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/chart.svg");
            then.status(404);
        });

        let err = DocumentClient::new()
            .fetch_document(&server.url("/chart.svg"), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, MeteogramError::Status { status: 404 }));
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/slow.svg");
            then.status(200)
                .delay(Duration::from_secs(3))
                .body("<svg></svg>");
        });

        let err = DocumentClient::with_timeout(Duration::from_millis(200))
            .fetch_document(&server.url("/slow.svg"), 1)
            .await
            .unwrap_err();

        match err {
            MeteogramError::Http(e) => assert!(e.is_timeout()),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
