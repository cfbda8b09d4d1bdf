use crate::config::types::ApiConfig;
use crate::fetch::types::{GraphqlRequest, GraphqlResponse, LogPage, LogQueryRequest};
use crate::sink::SinkError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("log API returned error status {status}: {body}")]
    Server { status: u16, body: String },

    #[error("invalid auth token: {0}")]
    InvalidToken(String),

    #[error("server reported more pages but sent no {field} cursor")]
    MissingCursor { field: &'static str },

    #[error("server sent unparseable {field} cursor {value:?}")]
    InvalidCursor { field: &'static str, value: String },

    #[error("failed to write logs: {0}")]
    Sink(#[from] SinkError),
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Anything that can answer a single page request.
#[async_trait]
pub trait LogQueryClient: Send + Sync {
    async fn query(&self, request: &LogQueryRequest) -> Result<LogPage>;
}

/// Normalizes a token so it carries the `Bearer ` prefix exactly once.
pub fn bearer_header(token: &str) -> String {
    let token = token.trim();
    if token.starts_with("Bearer ") {
        token.to_string()
    } else {
        format!("Bearer {}", token)
    }
}

/// HTTP client for the GraphQL logs endpoint
#[derive(Debug)]
pub struct GraphqlLogClient {
    endpoint: String,
    client: reqwest::Client,
}

impl GraphqlLogClient {
    pub fn new(config: &ApiConfig, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&bearer_header(token))
            .map_err(|e| FetchError::InvalidToken(e.to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LogQueryClient for GraphqlLogClient {
    async fn query(&self, request: &LogQueryRequest) -> Result<LogPage> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&GraphqlRequest::logs(request))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Server {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body = response.text().await?;
        Ok(decode_page(&body))
    }
}

/// Decodes a 2xx body. Anything unusable becomes an empty final page.
pub fn decode_page(body: &str) -> LogPage {
    let response: GraphqlResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "Malformed response body, treating as empty final page");
            return LogPage::empty();
        }
    };

    for error in &response.errors {
        warn!(message = %error.message, "Log API reported a GraphQL error");
    }

    match response.data.and_then(|data| data.logs) {
        Some(page) => page,
        None => {
            warn!("Response has no data.logs, treating as empty final page");
            LogPage::empty()
        }
    }
}
