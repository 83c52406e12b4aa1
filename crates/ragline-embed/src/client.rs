//! Embedding HTTP client.

use crate::error::{EmbedError, EmbedResult};
use crate::types::*;
use ragline_config::{EmbeddingConfig, EmbeddingProvider};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Client for an embedding provider.
#[derive(Clone)]
pub struct EmbeddingClient {
    client: Client,
    provider: EmbeddingProvider,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl EmbeddingClient {
    /// Create a client from configuration.
    ///
    /// OpenAI-compatible providers require the API key variable named by
    /// `config.api_key_env` to be set.
    pub fn from_config(config: &EmbeddingConfig) -> EmbedResult<Self> {
        let api_key = match config.provider {
            EmbeddingProvider::OpenAi => Some(
                std::env::var(&config.api_key_env)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| EmbedError::MissingApiKey {
                        var: config.api_key_env.clone(),
                    })?,
            ),
            EmbeddingProvider::Ollama => None,
        };

        Self::new(
            config.provider,
            config.resolved_base_url(),
            config.model.clone(),
            api_key,
            Duration::from_secs(config.timeout_seconds),
        )
    }

    /// Create a client with explicit settings.
    pub fn new(
        provider: EmbeddingProvider,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> EmbedResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(EmbedError::Http)?;

        Ok(Self {
            client,
            provider,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            timeout,
        })
    }

    /// Model used for every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider(&self) -> EmbeddingProvider {
        self.provider
    }

    /// Embed a batch of texts, returning one vector per input in input order.
    pub async fn embed(&self, texts: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Embedding {} texts with model {} via {:?}",
            texts.len(),
            self.model,
            self.provider
        );

        let vectors = match self.provider {
            EmbeddingProvider::OpenAi => self.embed_openai(texts).await?,
            EmbeddingProvider::Ollama => self.embed_ollama(texts).await?,
        };

        if vectors.len() != texts.len() {
            return Err(EmbedError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        Ok(vectors)
    }

    async fn embed_openai(&self, texts: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;
        let response = check_status(response).await?;

        let body: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::ParseError(e.to_string()))?;
        if let Some(usage) = &body.usage {
            debug!("Provider reported {} tokens", usage.total_tokens);
        }
        Ok(body.into_vectors())
    }

    async fn embed_ollama(&self, texts: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let response = check_status(response).await?;

        let body: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::ParseError(e.to_string()))?;
        Ok(body.embeddings)
    }

    fn map_send_error(&self, e: reqwest::Error) -> EmbedError {
        if e.is_connect() {
            EmbedError::Unreachable {
                host: self.base_url.clone(),
            }
        } else if e.is_timeout() {
            EmbedError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            EmbedError::Http(e)
        }
    }
}

/// Turn a non-success response into the matching error.
async fn check_status(response: Response) -> EmbedResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let message = response.text().await.unwrap_or_default();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(EmbedError::RateLimited { message, retry_after });
    }
    Err(EmbedError::ApiError {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one HTTP response on a local port, returning the base URL.
    async fn serve_once(status_line: &'static str, extra_headers: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            // Read headers, then as much body as Content-Length announces
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
                status_line,
                body.len(),
                extra_headers,
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });

        format!("http://{}", addr)
    }

    fn client(provider: EmbeddingProvider, base_url: String) -> EmbeddingClient {
        EmbeddingClient::new(provider, base_url, "test-model", Some("sk-test".into()), Duration::from_secs(5))
            .unwrap()
    }

    fn inputs() -> Vec<String> {
        vec!["alpha".to_string(), "beta".to_string()]
    }

    #[test]
    fn test_client_creation() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::Ollama,
            ..EmbeddingConfig::default()
        };
        let client = EmbeddingClient::from_config(&config).unwrap();
        assert_eq!(client.model(), "text-embedding-3-small");
        assert_eq!(client.provider(), EmbeddingProvider::Ollama);
    }

    #[test]
    fn test_openai_requires_api_key() {
        let config = EmbeddingConfig {
            api_key_env: "RAGLINE_TEST_KEY_THAT_IS_NOT_SET".into(),
            ..EmbeddingConfig::default()
        };
        let err = EmbeddingClient::from_config(&config).err().unwrap();
        assert!(matches!(err, EmbedError::MissingApiKey { .. }));
    }

    #[tokio::test]
    async fn test_openai_success() {
        let base = serve_once(
            "200 OK",
            "",
            r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}],"usage":{"prompt_tokens":2,"total_tokens":2}}"#,
        )
        .await;

        let vectors = client(EmbeddingProvider::OpenAi, base).embed(&inputs()).await.unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_rate_limit_is_typed() {
        let base = serve_once(
            "429 Too Many Requests",
            "Retry-After: 3\r\n",
            r#"{"error":{"message":"Rate limit reached"}}"#,
        )
        .await;

        let err = client(EmbeddingProvider::OpenAi, base).embed(&inputs()).await.unwrap_err();
        match err {
            EmbedError::RateLimited { retry_after, message } => {
                assert_eq!(retry_after, Some(Duration::from_secs(3)));
                assert!(message.contains("Rate limit"));
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_error_is_not_transient() {
        let base = serve_once("400 Bad Request", "", r#"{"error":"bad input"}"#).await;

        let err = client(EmbeddingProvider::OpenAi, base).embed(&inputs()).await.unwrap_err();
        assert!(matches!(err, EmbedError::ApiError { status: 400, .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_ollama_count_mismatch() {
        let base = serve_once("200 OK", "", r#"{"embeddings":[[0.5,0.5]]}"#).await;

        let err = client(EmbeddingProvider::Ollama, base).embed(&inputs()).await.unwrap_err();
        assert!(matches!(err, EmbedError::CountMismatch { expected: 2, actual: 1 }));
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_request() {
        let client = client(EmbeddingProvider::OpenAi, "http://127.0.0.1:9".to_string());
        assert!(client.embed(&[]).await.unwrap().is_empty());
    }
}
