//! Reload by calling an HTTP endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use url::Url;

use crate::notifier::{Notifier, NotifyError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends one request; any non-2xx answer is a failure.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    method: Method,
    url: Url,
    client: reqwest::Client,
}

impl HttpNotifier {
    /// Parse `[METHOD:]<url>`; the method defaults to POST.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let spec = spec.trim();
        let (method, url) = match spec.split_once(':') {
            Some((m, rest))
                if !m.is_empty() && m.bytes().all(|b| b.is_ascii_uppercase()) =>
            {
                let method = Method::from_bytes(m.as_bytes()).map_err(|e| e.to_string())?;
                (method, rest)
            }
            _ => (Method::POST, spec),
        };

        let url = Url::parse(url).map_err(|e| format!("invalid url {url:?}: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("unsupported url scheme {:?}", url.scheme()));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| e.to_string())?;

        Ok(Self { method, url, client })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    fn describe(&self) -> String {
        format!("http {} {}", self.method, self.url)
    }

    async fn notify(&self) -> Result<(), NotifyError> {
        let response = self
            .client
            .request(self.method.clone(), self.url.clone())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(url = %self.url, status = status.as_u16(), "Reload endpoint called");
            Ok(())
        } else {
            Err(NotifyError::HttpStatus(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers one request with `status_line` and returns the request head.
    async fn one_shot_server(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let response = format!("HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });
        (format!("http://{addr}/reload"), handle)
    }

    #[test]
    fn test_parse_method_and_default() {
        let get = HttpNotifier::parse("GET:http://127.0.0.1:9000/reload").unwrap();
        assert_eq!(get.method(), &Method::GET);
        assert_eq!(get.url().path(), "/reload");

        let post = HttpNotifier::parse("https://lb.internal/-/reload").unwrap();
        assert_eq!(post.method(), &Method::POST);
        assert_eq!(post.url().scheme(), "https");
    }

    #[test]
    fn test_parse_rejects_non_http() {
        assert!(HttpNotifier::parse("ftp://example.com/reload").is_err());
        assert!(HttpNotifier::parse("").is_err());
    }

    #[tokio::test]
    async fn test_notify_success() {
        let (url, server) = one_shot_server("200 OK").await;
        let n = HttpNotifier::parse(&format!("PUT:{url}")).unwrap();
        n.notify().await.unwrap();
        let request = server.await.unwrap();
        assert!(request.starts_with("PUT /reload"));
    }

    #[tokio::test]
    async fn test_notify_error_status() {
        let (url, server) = one_shot_server("503 Service Unavailable").await;
        let n = HttpNotifier::parse(&url).unwrap();
        assert!(matches!(n.notify().await, Err(NotifyError::HttpStatus(503))));
        server.await.unwrap();
    }
}
