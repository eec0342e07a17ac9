//! Authenticated HTTP wrapper over the backend's `{data}` / `{error}` envelope.

use std::sync::{Arc, RwLock};

use reqwest::header;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::common::{ApiError, AppConfig};

/// Bearer credential scoped to the resolved user.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub bearer: String,
    pub user_id: i64,
}

/// Shared slot for the current credential.
///
/// The session provider is the sole writer; the HTTP client reads it on
/// every request so a sign-out takes effect immediately.
#[derive(Clone, Default)]
pub struct AuthContext {
    inner: Arc<RwLock<Option<Credential>>>,
}

impl AuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, credential: Credential) {
        if let Ok(mut slot) = self.inner.write() {
            *slot = Some(credential);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.inner.write() {
            *slot = None;
        }
    }

    pub fn current(&self) -> Option<Credential> {
        self.inner.read().ok().and_then(|slot| slot.clone())
    }
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: String,
}

/// Issues authenticated requests and normalizes responses into
/// [`ApiError`] kinds. Does not touch the cache; that is the query
/// layer's job.
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    auth: AuthContext,
}

impl HttpClient {
    pub fn new(config: &AppConfig, auth: AuthContext) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::GET, path, None, None).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Value,
    ) -> Result<T, ApiError> {
        self.request(Method::POST, path, Some(body), None).await
    }

    pub async fn put<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T, ApiError> {
        self.request(Method::PUT, path, Some(body), None).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::DELETE, path, None, None).await
    }

    /// Sends one request and unwraps the response envelope.
    ///
    /// Error mapping: transport problems (connect, timeout, body read)
    /// become [`ApiError::Network`]; non-2xx statuses become
    /// [`ApiError::Backend`] with the message pulled from the `{error}`
    /// body when present; unparseable success bodies become
    /// [`ApiError::Decode`].
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: Option<header::HeaderMap>,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.http.request(method.clone(), &url);

        if let Some(credential) = self.auth.current() {
            builder = builder.header(
                header::AUTHORIZATION,
                format!("Bearer {}", credential.bearer),
            );
        }
        if let Some(headers) = headers {
            builder = builder.headers(headers);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Network(format!("request timed out: {} {}", method, path))
            } else {
                ApiError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|envelope| envelope.error)
                .unwrap_or_else(|_| {
                    status
                        .canonical_reason()
                        .unwrap_or("unexpected status")
                        .to_string()
                });
            tracing::warn!(status = status.as_u16(), path, "backend reported failure");
            return Err(ApiError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: DataEnvelope<T> =
            serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(envelope.data)
    }

    /// Allow-list lookup: idempotent and cacheable for the session.
    pub async fn is_admin(&self, user_id: i64) -> Result<bool, ApiError> {
        self.get(&format!("/api/admins/{}", user_id)).await
    }
}
