//! Minimal GitHub REST client.

use crate::bundler::{
    Error, HttpError, Result,
    utils::http::{USER_AGENT, transport_error},
};
use bytes::Bytes;
use reqwest::{Method, StatusCode, header};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Media type of the v3 REST API.
pub const GITHUB_MEDIA_TYPE: &str = "application/vnd.github.v3+json";

/// Socket timeout for API calls.
pub const API_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(serde::Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Body of an API request.
pub enum RequestBody {
    Json(serde_json::Value),
    Stream {
        body: reqwest::Body,
        content_type: String,
        content_length: u64,
    },
}

/// Authenticated JSON client for one API host.
#[derive(Clone, Debug)]
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl GitHubClient {
    /// Client for `base_url` (e.g. `https://api.github.com`).
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(API_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            token: token.filter(|t| !t.trim().is_empty()),
            timeout: API_TIMEOUT,
            cancel: CancellationToken::new(),
        })
    }

    /// Overrides the per-request timeout of API calls.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Whether a non-empty token is configured.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Resolves an API path (`/repos/...`) or passes an absolute URL through.
    pub fn url(&self, path_or_url: &str) -> Result<Url> {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            return Ok(Url::parse(path_or_url)?);
        }
        let mut url = self.base_url.clone();
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base_path}{path_or_url}"));
        Ok(url)
    }

    /// `GET` and decode.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        decode(&url, self.send(Method::GET, url.clone(), None, None).await?)
    }

    /// `POST` a JSON body and decode the response.
    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path)?;
        let body = RequestBody::Json(serde_json::to_value(body)?);
        decode(&url, self.send(Method::POST, url.clone(), Some(body), None).await?)
    }

    /// `DELETE`; a 204 response is success.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path)?;
        self.send(Method::DELETE, url, None, None).await?;
        Ok(())
    }

    /// Streams a body to `url` with its own timeout and decodes the response.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        url: Url,
        body: RequestBody,
        timeout: Duration,
    ) -> Result<T> {
        decode(&url, self.send(Method::POST, url.clone(), Some(body), Some(timeout)).await?)
    }

    /// Sends one request.
    ///
    /// Returns `None` for 204 responses. Any status of 400 or above becomes
    /// [`HttpError`], with the `message` of a JSON error body as description.
    /// A 404 is reported before the body is read.
    pub async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<RequestBody>,
        timeout: Option<Duration>,
    ) -> Result<Option<Bytes>> {
        log::debug!("{} {}", method, url);

        let mut request = self
            .http
            .request(method, url.clone())
            .header(header::ACCEPT, GITHUB_MEDIA_TYPE)
            .timeout(timeout.unwrap_or(self.timeout));
        if let Some(token) = &self.token {
            request = request.header(header::AUTHORIZATION, format!("token {token}"));
        }
        request = match body {
            Some(RequestBody::Json(json)) => request.json(&json),
            Some(RequestBody::Stream {
                body,
                content_type,
                content_length,
            }) => request
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, content_length)
                .body(body),
            None => request,
        };

        let response = tokio::select! {
            response = request.send() => response.map_err(|e| transport_error(e, url.as_str()))?,
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(HttpError::new(status, None).into());
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("json"));

        let body = tokio::select! {
            body = response.bytes() => body.map_err(|e| transport_error(e, url.as_str()))?,
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
        };

        if status.as_u16() >= 400 {
            let description = is_json
                .then(|| serde_json::from_slice::<ErrorBody>(&body).ok())
                .flatten()
                .and_then(|error| error.message);
            return Err(HttpError::new(status, description).into());
        }

        Ok(Some(body))
    }
}

fn decode<T: DeserializeOwned>(url: &Url, body: Option<Bytes>) -> Result<T> {
    let body = body.ok_or_else(|| {
        Error::GenericError(format!("Empty response from {url} where a body was expected"))
    })?;
    Ok(serde_json::from_slice(&body)?)
}
