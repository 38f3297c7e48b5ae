use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use tracing::info;

use crate::error::PipelineError;

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Undecoded page body plus the charset its Content-Type declared.
#[derive(Debug)]
pub struct Page {
    pub body: Vec<u8>,
    pub charset: Option<String>,
}

/// Plain GET client for university pages.
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new() -> reqwest::Result<Self> {
        Self::with_timeout(FETCH_TIMEOUT)
    }

    /// Client whose whole request, body included, is bounded by `timeout`.
    pub fn with_timeout(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Fetcher { client })
    }

    /// Fetch the raw body of `url`. Transport errors, timeouts and non-2xx
    /// statuses all come back as `PipelineError::Fetch`.
    pub async fn fetch(&self, url: &str) -> Result<Page, PipelineError> {
        let wrap = |source: reqwest::Error| PipelineError::Fetch {
            url: url.to_string(),
            source,
        };

        info!("Fetching {}", url);
        let start = Instant::now();
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(wrap)?;
        let charset = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_param);
        let body = resp.bytes().await.map_err(wrap)?;

        info!(
            "Fetched {} bytes from {} in {}ms",
            body.len(),
            url,
            start.elapsed().as_millis()
        );
        Ok(Page {
            body: body.to_vec(),
            charset,
        })
    }
}

/// `charset` parameter of a Content-Type value, unquoted.
fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{closed_url, serve_once, stalled_url};

    #[tokio::test]
    async fn returns_body_and_sends_browser_agent() {
        let (base, server) = serve_once("200 OK", "text/html", "<p>Summer</p>").await;
        let page = Fetcher::new().unwrap().fetch(&format!("{base}/summer")).await.unwrap();
        assert_eq!(page.body, b"<p>Summer</p>");
        assert_eq!(page.charset, None);

        let req = server.await.unwrap();
        assert!(req.head.starts_with("GET /summer "));
        assert_eq!(req.header("user-agent"), Some(BROWSER_USER_AGENT));
    }

    #[tokio::test]
    async fn non_success_status_is_fetch_error() {
        let (base, _server) = serve_once("404 Not Found", "text/html", "missing").await;
        let err = Fetcher::new().unwrap().fetch(&base).await.unwrap_err();
        match err {
            PipelineError::Fetch { url, source } => {
                assert_eq!(url, base);
                assert_eq!(source.status().map(|s| s.as_u16()), Some(404));
            }
            other => panic!("expected fetch error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connection_refused_is_fetch_error() {
        let url = closed_url().await;
        let err = Fetcher::new().unwrap().fetch(&url).await.unwrap_err();
        assert!(matches!(err, PipelineError::Fetch { .. }));
    }

    #[tokio::test]
    async fn keeps_bytes_and_declared_charset() {
        let (base, _server) = serve_once("200 OK", "text/html; Charset=\"ISO-8859-1\"", b"<p>Ni\xF1os</p>").await;
        let page = Fetcher::new().unwrap().fetch(&base).await.unwrap();
        assert_eq!(page.body, b"<p>Ni\xF1os</p>");
        assert_eq!(page.charset.as_deref(), Some("ISO-8859-1"));
    }

    #[test]
    fn charset_parameter() {
        assert_eq!(charset_param("text/html; charset=utf-8").as_deref(), Some("utf-8"));
        assert_eq!(charset_param("text/html;boundary=x; CHARSET = \"koi8-r\"").as_deref(), Some("koi8-r"));
        assert_eq!(charset_param("text/html"), None);
        assert_eq!(charset_param("charset=utf-8"), None);
    }

    #[tokio::test]
    async fn stalled_server_times_out() {
        let url = stalled_url().await;
        let fetcher = Fetcher::with_timeout(Duration::from_millis(200)).unwrap();
        let started = Instant::now();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        match err {
            PipelineError::Fetch { source, .. } => assert!(source.is_timeout(), "{source:?}"),
            other => panic!("expected fetch error, got {other:?}"),
        }
    }
}
