//! HTTP client for the control-plane gateway.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::config::Config;
use crate::error::CliError;

/// API client for the gateway.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client from config.
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = &config.api_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .context("Invalid token format")?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(&config.api_url)
            .with_context(|| format!("Invalid api_url '{}'", config.api_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Invalid api_url '{}'", config.api_url);
        }

        Ok(Self { client, base_url })
    }

    /// Build a URL from path segments. Each segment is percent-encoded, so
    /// ARNs containing `/` stay a single segment.
    pub fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Make a GET request.
    pub async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T, CliError> {
        let response = self
            .client
            .get(self.url(segments))
            .query(query)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Make a POST request.
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, CliError> {
        let response = self.client.post(self.url(segments)).json(body).send().await?;

        self.handle_response(response).await
    }

    /// Make a POST request, ignoring the response body.
    pub async fn post_no_content<B: Serialize>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<(), CliError> {
        let response = self.client.post(self.url(segments)).json(body).send().await?;

        self.handle_empty(response).await
    }

    /// Make a PUT request, ignoring the response body.
    pub async fn put_no_content<B: Serialize>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<(), CliError> {
        let response = self.client.put(self.url(segments)).json(body).send().await?;

        self.handle_empty(response).await
    }

    /// Handle a successful or error response.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, CliError> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to parse response: {}", e)))
        } else {
            self.handle_error(response).await
        }
    }

    async fn handle_empty(&self, response: reqwest::Response) -> Result<(), CliError> {
        if response.status().is_success() {
            Ok(())
        } else {
            self.handle_error(response).await
        }
    }

    /// Handle an error response.
    async fn handle_error<T>(&self, response: reqwest::Response) -> Result<T, CliError> {
        let status = response.status().as_u16();

        let error_body: ApiErrorResponse =
            response.json().await.unwrap_or_else(|_| ApiErrorResponse {
                code: "unknown".to_string(),
                message: "Unknown error".to_string(),
                request_id: None,
            });

        if status == 401 {
            return Err(CliError::NotAuthenticated);
        }

        Err(CliError::api(
            status,
            error_body.code,
            error_body.message,
            error_body.request_id,
        ))
    }
}

/// API error response structure.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default = "unknown_code")]
    code: String,
    message: String,
    #[serde(default)]
    request_id: Option<String>,
}

fn unknown_code() -> String {
    "unknown".to_string()
}
