//! Entity endpoint abstraction and the HTTP implementation.
//!
//! This module provides:
//! - `EntityApi` trait, the only surface the controllers talk to
//! - `HttpEntityClient`, the reqwest-backed implementation of the REST template
//! - `Backend`, which hands out one client per entity sharing a session

use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value;

use crate::entity::EntitySpec;
use crate::envelope::{self, ApiReply};
use crate::error::ApiError;
use crate::session::AuthService;

/// Operations every reference-data endpoint exposes.
#[allow(async_fn_in_trait)]
pub trait EntityApi {
    /// One page of records, raw envelope.
    async fn list(&self, page: u64, page_size: u64) -> Result<Value, ApiError>;

    /// Every record, unpaginated; feeds dropdowns and lookups.
    async fn all(&self) -> Result<Value, ApiError>;

    /// A single record by id (edit-load).
    async fn get(&self, id: i64) -> Result<Value, ApiError>;

    async fn create(&self, body: &Value) -> Result<ApiReply, ApiError>;

    async fn update(&self, id: i64, body: &Value) -> Result<ApiReply, ApiError>;

    /// Hard delete.
    async fn delete(&self, id: i64) -> Result<ApiReply, ApiError>;

    async fn count(&self) -> Result<u64, ApiError>;

    async fn activate(&self, id: i64) -> Result<ApiReply, ApiError>;

    /// Soft delete.
    async fn deactivate(&self, id: i64) -> Result<ApiReply, ApiError>;
}

/// Shared pieces needed to build per-entity clients.
#[derive(Debug, Clone)]
pub struct Backend {
    http: reqwest::Client,
    base_url: String,
    auth: AuthService,
}

impl Backend {
    pub fn new(base_url: &str, auth: AuthService) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, auth)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str, auth: AuthService) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn client(&self, spec: &EntitySpec) -> HttpEntityClient {
        HttpEntityClient {
            http: self.http.clone(),
            root: format!("{}{}/v1", self.base_url, spec.base_path),
            auth: self.auth.clone(),
        }
    }
}

/// `EntityApi` over `{base_url}{base_path}/v1/...`.
#[derive(Debug, Clone)]
pub struct HttpEntityClient {
    http: reqwest::Client,
    root: String,
    auth: AuthService,
}

impl HttpEntityClient {
    fn request(&self, method: Method, suffix: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.root, suffix);
        tracing::debug!(%method, %url, "dispatching request");
        self.http.request(method, url)
    }

    /// Attaches the bearer token, sends, and applies the auth and
    /// `code` rules. Returns the decoded body (`Null` when empty).
    async fn send(&self, builder: RequestBuilder) -> Result<Value, ApiError> {
        let token = self.auth.token().ok_or(ApiError::MissingToken)?;
        let response = builder.bearer_auth(token).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(status = status.as_u16(), "authorization rejected; logging out");
            self.auth.logout();
            return Err(ApiError::Unauthorized {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|value| ApiReply::from_value(&value).failure_message());
            tracing::warn!(status = status.as_u16(), ?message, "request failed");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        let value: Value = serde_json::from_str(&body)?;
        let reply = ApiReply::from_value(&value);
        if !reply.is_success() {
            return Err(ApiError::Rejected {
                code: reply.code.unwrap_or_default(),
                message: reply.failure_message(),
            });
        }
        Ok(value)
    }

    async fn mutate(&self, builder: RequestBuilder) -> Result<ApiReply, ApiError> {
        let value = self.send(builder).await?;
        Ok(ApiReply::from_value(&value))
    }
}

impl EntityApi for HttpEntityClient {
    async fn list(&self, page: u64, page_size: u64) -> Result<Value, ApiError> {
        let builder = self
            .request(Method::GET, "list")
            .query(&[("pageNumber", page), ("pageSize", page_size)]);
        self.send(builder).await
    }

    async fn all(&self) -> Result<Value, ApiError> {
        self.send(self.request(Method::GET, "all")).await
    }

    async fn get(&self, id: i64) -> Result<Value, ApiError> {
        self.send(self.request(Method::GET, &id.to_string())).await
    }

    async fn create(&self, body: &Value) -> Result<ApiReply, ApiError> {
        self.mutate(self.request(Method::POST, "create").json(body))
            .await
    }

    async fn update(&self, id: i64, body: &Value) -> Result<ApiReply, ApiError> {
        self.mutate(self.request(Method::PUT, &format!("update/{}", id)).json(body))
            .await
    }

    async fn delete(&self, id: i64) -> Result<ApiReply, ApiError> {
        self.mutate(self.request(Method::DELETE, &id.to_string()))
            .await
    }

    async fn count(&self) -> Result<u64, ApiError> {
        let value = self.send(self.request(Method::GET, "count")).await?;
        Ok(count_from(&value))
    }

    async fn activate(&self, id: i64) -> Result<ApiReply, ApiError> {
        self.mutate(self.request(Method::PUT, &format!("{}/activate", id)))
            .await
    }

    async fn deactivate(&self, id: i64) -> Result<ApiReply, ApiError> {
        self.mutate(self.request(Method::PUT, &format!("{}/deactivate", id)))
            .await
    }
}

/// Reads a count from `5`, `{ data: 5 }`, or any page envelope.
pub fn count_from(value: &Value) -> u64 {
    let direct = match value {
        Value::Number(n) => n.as_u64(),
        Value::Object(obj) => obj.get("data").and_then(Value::as_u64),
        _ => None,
    };
    direct.unwrap_or_else(|| envelope::normalize(value, &[]).total)
}
