//! Typed inventory operations over the query/mutation layer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::ApiError;
use crate::http::HttpClient;
use crate::query::{QueryClient, QueryOutcome};

/// One stone in the inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diamond {
    pub id: i64,
    pub carat: f64,
    pub color: String,
    pub clarity: String,
    pub cut: String,
    pub price_cents: i64,
    pub available: bool,
}

/// Payload for create/update calls; the backend assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiamondDraft {
    pub carat: f64,
    pub color: String,
    pub clarity: String,
    pub cut: String,
    pub price_cents: i64,
    pub available: bool,
}

pub mod keys {
    pub const LIST: &str = "diamonds:list";
    pub const COUNT: &str = "diamonds:count";

    pub fn item(id: i64) -> String {
        format!("diamonds:{id}")
    }
}

/// Domain calls the storefront and admin dashboard share.
#[derive(Clone)]
pub struct InventoryService {
    http: HttpClient,
    queries: QueryClient,
}

impl InventoryService {
    pub fn new(http: HttpClient, queries: QueryClient) -> Self {
        Self { http, queries }
    }

    pub async fn list(&self) -> Result<QueryOutcome<Vec<Diamond>>, ApiError> {
        let http = self.http.clone();
        self.queries
            .query_as(keys::LIST, move || {
                let http = http.clone();
                async move { http.get::<Value>("/api/diamonds").await }
            })
            .await
    }

    pub async fn get(&self, id: i64) -> Result<QueryOutcome<Diamond>, ApiError> {
        let http = self.http.clone();
        self.queries
            .query_as(&keys::item(id), move || {
                let http = http.clone();
                async move { http.get::<Value>(&format!("/api/diamonds/{id}")).await }
            })
            .await
    }

    pub async fn count(&self) -> Result<QueryOutcome<u64>, ApiError> {
        let http = self.http.clone();
        self.queries
            .query_as(keys::COUNT, move || {
                let http = http.clone();
                async move { http.get::<Value>("/api/diamonds/count").await }
            })
            .await
    }

    pub async fn create(&self, draft: &DiamondDraft) -> Result<Diamond, ApiError> {
        let body = to_body(draft)?;
        let http = self.http.clone();
        self.queries
            .mutate(
                &[keys::LIST.to_string(), keys::COUNT.to_string()],
                move || {
                    let http = http.clone();
                    let body = body.clone();
                    async move { http.post("/api/diamonds", body).await }
                },
            )
            .await
    }

    pub async fn update(&self, id: i64, draft: &DiamondDraft) -> Result<Diamond, ApiError> {
        let body = to_body(draft)?;
        let http = self.http.clone();
        self.queries
            .mutate(
                &[keys::LIST.to_string(), keys::item(id)],
                move || {
                    let http = http.clone();
                    let body = body.clone();
                    async move { http.put(&format!("/api/diamonds/{id}"), body).await }
                },
            )
            .await
    }

    pub async fn delete(&self, id: i64) -> Result<bool, ApiError> {
        let http = self.http.clone();
        self.queries
            .mutate(
                &[
                    keys::LIST.to_string(),
                    keys::COUNT.to_string(),
                    keys::item(id),
                ],
                move || {
                    let http = http.clone();
                    async move { http.delete(&format!("/api/diamonds/{id}")).await }
                },
            )
            .await
    }
}

fn to_body(draft: &DiamondDraft) -> Result<Value, ApiError> {
    serde_json::to_value(draft).map_err(|e| ApiError::Decode(e.to_string()))
}
