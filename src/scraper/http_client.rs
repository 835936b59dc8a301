use crate::config::ScraperConfig;
use crate::errors::FetchError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::PageFetcher;

/// Anonymous GET client with a fixed per-request timeout. Never retries.
pub struct HttpClient {
    inner: reqwest::Client,
}

fn client_builder(config: &ScraperConfig) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .gzip(true)
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = client_builder(config)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { inner })
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        debug!("GET {}", url);

        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        resp.text().await.map_err(|e| FetchError::from_reqwest(url, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn local_client(timeout_secs: u64) -> HttpClient {
        let config = ScraperConfig { timeout_secs, ..Default::default() };
        HttpClient {
            inner: client_builder(&config).no_proxy().build().unwrap(),
        }
    }

    /// Accepts one connection, reads the request, answers with `response` (or
    /// holds the socket open without answering when `response` is `None`).
    async fn one_shot_server(response: Option<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            match response {
                Some(raw) => {
                    socket.write_all(raw.as_bytes()).await.unwrap();
                    let _ = socket.shutdown().await;
                }
                None => tokio::time::sleep(Duration::from_secs(5)).await,
            }
        });

        format!("http://{}/tweets?account=1", addr)
    }

    #[tokio::test]
    async fn success_returns_body() {
        let url = one_shot_server(Some(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
        ))
        .await;

        assert_eq!(local_client(5).fetch(&url).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn server_error_is_a_status_failure() {
        let url = one_shot_server(Some(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        ))
        .await;

        let err = local_client(5).fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 500, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let url = one_shot_server(None).await;

        let err = local_client(1).fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = local_client(5)
            .fetch(&format!("http://{}/figures?search=a", addr))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }), "{err:?}");
    }
}
