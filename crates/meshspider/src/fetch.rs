//! Page fetching.
//!
//! Plain HTTP GETs against a node's status pages. Handles
//! redirects, per-request timeouts and a bounded retry with backoff on
//! connection errors and 5xx answers. [`LocalFetcher`] serves the same
//! requests from a directory of saved pages.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::debug;

use crate::types::{SpiderError, SpiderResult};

/// A fetched page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Requested URL.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

/// Something that can retrieve a page by URL.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetch a page; non-success statuses are errors.
    async fn get(&self, url: &str) -> SpiderResult<Page>;
}

/// HTTP fetcher wrapping reqwest.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    retries: u32,
}

impl HttpFetcher {
    pub fn new(request_timeout: Duration, retries: u32) -> SpiderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(concat!("meshspider/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SpiderError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, retries })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn get(&self, url: &str) -> SpiderResult<Page> {
        let mut attempt = 0u32;

        loop {
            match self.client.get(url).send().await {
                Ok(r) => {
                    let status = r.status().as_u16();

                    if status >= 500 && attempt < self.retries {
                        attempt += 1;
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }

                    if !r.status().is_success() {
                        let reason = r.status().canonical_reason().unwrap_or("");
                        return Err(SpiderError::InvalidResponse(format!(
                            "Invalid Status: {status}/{reason} for {url}"
                        )));
                    }

                    let body = r.text().await?;
                    return Ok(Page {
                        url: url.to_string(),
                        status,
                        body,
                    });
                }
                Err(e) => {
                    if attempt < self.retries && (e.is_connect() || e.is_timeout()) {
                        attempt += 1;
                        debug!("retrying {url} after error: {e}");
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(500 * 2u64.pow(attempt.saturating_sub(1)))
}

/// Serves pages from `<root>/<host>/<path>` instead of the network.
///
/// The root page maps to `index.html`; a query string is appended to the
/// file name after an underscore (`index.cgi?post_olsr=1` becomes
/// `index.cgi_post_olsr=1`).
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    root: PathBuf,
}

impl LocalFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, url: &str) -> SpiderResult<PathBuf> {
        let parsed = Url::parse(url)
            .map_err(|e| SpiderError::InvalidResponse(format!("bad URL {url}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| SpiderError::InvalidResponse(format!("URL without host: {url}")))?
            .trim_matches(|c| c == '[' || c == ']');

        let mut path = self.root.join(host);
        let rel = parsed.path().trim_start_matches('/');
        let mut file = if rel.is_empty() || rel.ends_with('/') {
            format!("{rel}index.html")
        } else {
            rel.to_string()
        };
        if let Some(q) = parsed.query() {
            file = format!("{file}_{q}");
        }
        for part in Path::new(&file).components() {
            if let std::path::Component::Normal(p) = part {
                path.push(p);
            }
        }
        Ok(path)
    }
}

#[async_trait]
impl Fetch for LocalFetcher {
    async fn get(&self, url: &str) -> SpiderResult<Page> {
        let path = self.path_for(url)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(body) => Ok(Page {
                url: url.to_string(),
                status: 200,
                body,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                SpiderError::InvalidResponse(format!("Invalid Status: 404/Not Found for {url}")),
            ),
            Err(e) => Err(SpiderError::Transport(format!(
                "cannot read {}: {e}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_fetcher_creation() {
        let fetcher = HttpFetcher::new(Duration::from_secs(10), 2);
        assert!(fetcher.is_ok());
    }

    #[test]
    fn test_local_paths() {
        let local = LocalFetcher::new("/fixtures");
        assert_eq!(
            local.path_for("http://10.0.0.1").unwrap(),
            PathBuf::from("/fixtures/10.0.0.1/index.html")
        );
        assert_eq!(
            local.path_for("http://10.0.0.1:8080/cgi-bin/luci").unwrap(),
            PathBuf::from("/fixtures/10.0.0.1/cgi-bin/luci")
        );
        assert_eq!(
            local
                .path_for("http://10.0.0.1/cgi-bin/index.cgi?post_olsr=1")
                .unwrap(),
            PathBuf::from("/fixtures/10.0.0.1/cgi-bin/index.cgi_post_olsr=1")
        );
    }

    #[test]
    fn test_local_paths_do_not_escape_root() {
        let local = LocalFetcher::new("/fixtures");
        let p = local.path_for("http://10.0.0.1/../../etc/passwd").unwrap();
        assert!(p.starts_with("/fixtures/10.0.0.1"));
    }

    #[tokio::test]
    async fn test_local_fetch_missing_page_is_invalid_response() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalFetcher::new(dir.path());
        let err = local.get("http://10.0.0.1/").await.unwrap_err();
        assert!(matches!(err, SpiderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_local_fetch_reads_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("10.0.0.1")).unwrap();
        std::fs::write(dir.path().join("10.0.0.1/index.html"), "<html></html>").unwrap();
        let local = LocalFetcher::new(dir.path());
        let page = local.get("http://10.0.0.1/").await.unwrap();
        assert_eq!(page.status, 200);
        assert_eq!(page.body, "<html></html>");
    }
}
