pub mod dto;

use std::env;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::error::AppError;
use crate::models::CostEntry;
pub use dto::RemoteRecord;

#[derive(Clone, Debug)]
pub struct SheetsConfig {
    pub endpoint_url: String,
    pub api_token: String,
}

impl SheetsConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let endpoint_url = env::var("SHEETS_ENDPOINT_URL")
            .map_err(|_| AppError::BadRequest("SHEETS_ENDPOINT_URL is not set".to_string()))?;
        let api_token = env::var("SHEETS_API_TOKEN")
            .map_err(|_| AppError::BadRequest("SHEETS_API_TOKEN is not set".to_string()))?;

        Ok(Self {
            endpoint_url,
            api_token,
        })
    }
}

/// Remote table backend reached only through idempotent calls: an upsert keyed
/// by entry id (re-submitting an applied id overwrites, never duplicates) and
/// a delete by id. All failures come back as `AppError::Delivery` values, never
/// panics, so the sync engine can treat them uniformly.
#[async_trait]
pub trait SheetsClient: Send + Sync {
    async fn upsert_record(&self, entry: &CostEntry) -> Result<(), AppError>;
    async fn delete_record(&self, id: &str) -> Result<(), AppError>;
    async fn fetch_records(&self) -> Result<Vec<RemoteRecord>, AppError>;
    async fn ping(&self) -> Result<(), AppError>;
}

pub struct SheetsHttpClient {
    client: Client,
    config: SheetsConfig,
}

impl SheetsHttpClient {
    pub fn new(config: SheetsConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::BadRequest(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    async fn post_action<T: Serialize>(
        &self,
        body: &dto::ActionRequest<T>,
    ) -> Result<dto::ActionReply, AppError> {
        let response = self
            .client
            .post(&self.config.endpoint_url)
            .header("Authorization", format!("Bearer {}", self.config.api_token))
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Delivery(format!("request failed: {}", e)))?;

        let status = response.status();
        let body_text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AppError::Delivery(format!(
                "sheets endpoint returned {}: {}",
                status, body_text
            )));
        }

        let reply: dto::ActionReply = serde_json::from_str(&body_text)
            .map_err(|e| AppError::Delivery(format!("failed to parse reply: {}", e)))?;

        if !reply.is_success() {
            return Err(AppError::Delivery(
                reply.message.unwrap_or_else(|| "backend reported failure".to_string()),
            ));
        }

        Ok(reply)
    }
}

#[async_trait]
impl SheetsClient for SheetsHttpClient {
    async fn upsert_record(&self, entry: &CostEntry) -> Result<(), AppError> {
        let request = dto::ActionRequest {
            action: "upsertRecord",
            data: Some(dto::RecordPayload {
                id: &entry.id,
                project: &entry.project,
                cost_type: &entry.cost_type,
                description: &entry.description,
                amount: entry.amount,
                payment_mode: &entry.payment_mode,
                status: entry.status,
                date: &entry.date,
                timestamp: &entry.timestamp,
                synced_at: Utc::now().to_rfc3339(),
            }),
        };

        self.post_action(&request).await?;
        debug!("record upserted: {}", entry.id);
        Ok(())
    }

    async fn delete_record(&self, id: &str) -> Result<(), AppError> {
        let request = dto::ActionRequest {
            action: "deleteRecord",
            data: Some(dto::DeletePayload { id }),
        };

        self.post_action(&request).await?;
        debug!("record deleted: {}", id);
        Ok(())
    }

    async fn fetch_records(&self) -> Result<Vec<RemoteRecord>, AppError> {
        let url = format!("{}?action=getRecords", self.config.endpoint_url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_token))
            .send()
            .await
            .map_err(|e| AppError::Delivery(format!("request failed: {}", e)))?;

        let status = response.status();
        let body_text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AppError::Delivery(format!(
                "sheets endpoint returned {}: {}",
                status, body_text
            )));
        }

        let reply: dto::RecordsReply = serde_json::from_str(&body_text)
            .map_err(|e| AppError::Delivery(format!("failed to parse records: {}", e)))?;

        if reply.status != "success" {
            return Err(AppError::Delivery("backend reported failure".to_string()));
        }

        Ok(reply.records)
    }

    async fn ping(&self) -> Result<(), AppError> {
        let request: dto::ActionRequest<()> = dto::ActionRequest {
            action: "ping",
            data: None,
        };

        self.post_action(&request).await?;
        Ok(())
    }
}

/// Succeeds without talking to anything; for wiring tests and offline demos.
pub struct NoopSheetsClient;

#[async_trait]
impl SheetsClient for NoopSheetsClient {
    async fn upsert_record(&self, _entry: &CostEntry) -> Result<(), AppError> {
        Ok(())
    }

    async fn delete_record(&self, _id: &str) -> Result<(), AppError> {
        Ok(())
    }

    async fn fetch_records(&self) -> Result<Vec<RemoteRecord>, AppError> {
        Ok(Vec::new())
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
