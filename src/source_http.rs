//! [`SourcePool`] backed by an HTTP pool gateway.
//!
//! The gateway owns the accounts and proxies and exposes them as a small JSON
//! API:
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | `GET` | `/stats` | `{"active", "total", "locked"}` |
//! | `GET` | `/search?q=&limit=&cursor=` | `{"items": [...], "next_cursor"}` |
//! | `GET` | `/items/{id}/replies?limit=&cursor=` | `{"items": [...], "next_cursor"}` |
//! | `POST` | `/locks/reset` | (empty) |
//!
//! Pages are followed until `limit` items were yielded or `next_cursor` is
//! null. Requests retry on 429, 5xx, and network errors with exponential
//! backoff; any other 4xx fails immediately.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::SourceConfig;
use crate::models::{PoolStats, RawItem};
use crate::source::SourcePool;

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    items: Vec<RawItem>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Paging position while streaming a result set.
#[derive(Debug, Clone)]
struct PageCursor {
    next: Option<String>,
    remaining: usize,
    exhausted: bool,
}

pub struct HttpSourcePool {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    max_retries: u32,
    label: String,
}

impl HttpSourcePool {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let host = reqwest::Url::parse(&base_url)?
            .host_str()
            .unwrap_or("unknown")
            .to_string();

        Ok(Self {
            client,
            token: config.token.clone(),
            max_retries: config.max_retries,
            label: format!("http:{}", host),
            base_url,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// GET with retry/backoff.
    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.url(path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .authorize(self.client.get(&url).query(query))
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json::<T>().await?);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(
                            pool = %self.label,
                            path,
                            attempt,
                            status = status.as_u16(),
                            "pool gateway busy, retrying"
                        );
                        last_err = Some(anyhow!("pool gateway error {}: {}", status, body_text));
                        continue;
                    }

                    bail!("pool gateway error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("pool gateway request failed after retries")))
    }

    /// Stream every item of a paged endpoint, up to `limit`.
    fn paged<'a>(
        &'a self,
        path: String,
        params: Vec<(&'static str, String)>,
        limit: usize,
    ) -> BoxStream<'a, Result<RawItem>> {
        let start = PageCursor {
            next: None,
            remaining: limit,
            exhausted: false,
        };

        stream::try_unfold(start, move |cursor| {
            let path = path.clone();
            let mut query = params.clone();
            async move {
                if cursor.exhausted || cursor.remaining == 0 {
                    return Ok::<_, anyhow::Error>(None);
                }

                query.push(("limit", cursor.remaining.to_string()));
                if let Some(next) = &cursor.next {
                    query.push(("cursor", next.clone()));
                }

                let page: Page = self.get_json(&path, &query).await?;
                let items: Vec<RawItem> = page.items.into_iter().take(cursor.remaining).collect();
                debug!(pool = %self.label, path = %path, page_items = items.len(), "page fetched");

                let next = PageCursor {
                    remaining: cursor.remaining - items.len(),
                    exhausted: page.next_cursor.is_none() || items.is_empty(),
                    next: page.next_cursor,
                };
                Ok::<_, anyhow::Error>(Some((items, next)))
            }
        })
        .map_ok(|items| stream::iter(items.into_iter().map(Ok::<_, anyhow::Error>)))
        .try_flatten()
        .boxed()
    }
}

#[async_trait]
impl SourcePool for HttpSourcePool {
    fn name(&self) -> &str {
        &self.label
    }

    async fn stats(&self) -> Result<PoolStats> {
        self.get_json("stats", &[]).await
    }

    fn search<'a>(&'a self, query: &'a str, limit: usize) -> BoxStream<'a, Result<RawItem>> {
        self.paged("search".to_string(), vec![("q", query.to_string())], limit)
    }

    fn fetch_replies<'a>(&'a self, item_id: i64, limit: usize) -> BoxStream<'a, Result<RawItem>> {
        self.paged(format!("items/{}/replies", item_id), Vec::new(), limit)
    }

    async fn reset_locks(&self) -> Result<()> {
        self.authorize(self.client.post(self.url("locks/reset")))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> SourceConfig {
        SourceConfig {
            base_url: url.to_string(),
            token: None,
            timeout_secs: 5,
            max_retries: 0,
            language: "en".to_string(),
        }
    }

    #[test]
    fn test_url_joining() {
        let pool = HttpSourcePool::new(&config("http://127.0.0.1:8700/")).unwrap();
        assert_eq!(pool.url("stats"), "http://127.0.0.1:8700/stats");
        assert_eq!(pool.url("/locks/reset"), "http://127.0.0.1:8700/locks/reset");
        assert_eq!(pool.name(), "http:127.0.0.1");
    }

    #[test]
    fn test_page_decoding_tolerates_missing_fields() {
        let page: Page = serde_json::from_str(
            r#"{"items": [{"id": 5, "text": "hi", "like_count": 2}], "next_cursor": null}"#,
        )
        .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, Some(5));
        assert!(page.items[0].author_handle.is_none());
        assert!(page.next_cursor.is_none());

        let empty: Page = serde_json::from_str("{}").unwrap();
        assert!(empty.items.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_gateway_errors() {
        // Port 9 (discard) on localhost is not expected to speak HTTP.
        let pool = HttpSourcePool::new(&config("http://127.0.0.1:9")).unwrap();
        assert!(pool.stats().await.is_err());

        let mut stream = pool.search("rust", 10);
        let first = stream.next().await;
        assert!(matches!(first, Some(Err(_))));
    }
}
