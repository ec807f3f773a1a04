use reqwest::{IntoUrl, RequestBuilder, Response};
use std::time::Duration;

use super::StrategyError;
use crate::config::HttpConfig;

/// Shared client for every network strategy; the timeout is always explicit
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn from_config(config: &HttpConfig) -> reqwest::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(value) = reqwest::header::HeaderValue::from_str(&config.accept_language) {
            headers.insert(reqwest::header::ACCEPT_LANGUAGE, value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            timeout: config.timeout(),
        })
    }

    /// Bare client for adapter tests
    #[cfg(test)]
    pub(crate) fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder().timeout(timeout).build().unwrap(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn get(&self, url: impl IntoUrl) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn post(&self, url: impl IntoUrl) -> RequestBuilder {
        self.client.post(url)
    }

    /// Send `request`, mapping upstream refusals and expired timeouts onto typed errors
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, StrategyError> {
        let response = request.send().await.map_err(|e| self.classify(e))?;
        check_status(response)
    }

    /// Send `request` and read the whole body
    pub async fn text(&self, request: RequestBuilder) -> Result<String, StrategyError> {
        self.send(request)
            .await?
            .text()
            .await
            .map_err(|e| self.classify(e))
    }

    fn classify(&self, e: reqwest::Error) -> StrategyError {
        if e.is_timeout() {
            StrategyError::Timeout(self.timeout)
        } else {
            StrategyError::Http(e)
        }
    }
}

fn check_status(response: Response) -> Result<Response, StrategyError> {
    let status = response.status();
    match status.as_u16() {
        401 => Err(StrategyError::AuthRequired(format!("upstream returned {}", status))),
        403 => Err(StrategyError::PermissionDenied(format!("upstream returned {}", status))),
        404 => Err(StrategyError::Unavailable(format!("upstream returned {}", status))),
        429 => Err(StrategyError::Unavailable("rate limited by upstream".to_string())),
        _ => Ok(response.error_for_status()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::test_support::{serve, Route};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_stalled_upstream_is_a_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = HttpClient::with_timeout(Duration::from_millis(200));
        let err = client
            .text(client.get(format!("http://{}/slow", addr)))
            .await
            .unwrap_err();

        assert!(matches!(err, StrategyError::Timeout(d) if d == Duration::from_millis(200)), "{err:?}");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let base = serve(vec![
            Route::get("/ok", 200, "fine"),
            Route::get("/auth", 401, ""),
            Route::get("/denied", 403, ""),
            Route::get("/limited", 429, ""),
            Route::get("/broken", 500, ""),
        ])
        .await;
        let client = HttpClient::with_timeout(Duration::from_secs(5));

        assert_eq!(client.text(client.get(format!("{}/ok", base))).await.unwrap(), "fine");
        assert!(matches!(
            client.send(client.get(format!("{}/auth", base))).await,
            Err(StrategyError::AuthRequired(_))
        ));
        assert!(matches!(
            client.send(client.get(format!("{}/denied", base))).await,
            Err(StrategyError::PermissionDenied(_))
        ));
        assert!(matches!(
            client.send(client.get(format!("{}/limited", base))).await,
            Err(StrategyError::Unavailable(_))
        ));
        assert!(matches!(
            client.send(client.get(format!("{}/broken", base))).await,
            Err(StrategyError::Http(_))
        ));
    }
}
