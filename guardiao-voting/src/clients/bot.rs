use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use uuid::Uuid;

use crate::dispatch::{DispatchError, EnforcementGateway, EnforcementOrder, NotificationGateway};

/// HTTP client for the Discord bot's command endpoints.
#[derive(Clone)]
pub struct BotApiClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct NotifyGuardiansRequest<'a> {
    report_id: Uuid,
    guardian_ids: &'a [i64],
}

#[derive(Debug, Serialize)]
struct NotifyUserRequest<'a> {
    user_id: i64,
    title: &'a str,
    message: &'a str,
}

impl BotApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/", self.base_url, path)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(path, "bot call succeeded");
        Ok(())
    }
}

#[async_trait]
impl EnforcementGateway for BotApiClient {
    async fn enforce(&self, order: &EnforcementOrder) -> Result<(), DispatchError> {
        self.post("apply_punishment", order).await
    }
}

#[async_trait]
impl NotificationGateway for BotApiClient {
    async fn notify_guardians(&self, report_id: Uuid, discord_ids: &[i64]) -> Result<(), DispatchError> {
        self.post(
            "notify_guardians",
            &NotifyGuardiansRequest {
                report_id,
                guardian_ids: discord_ids,
            },
        )
        .await
    }

    async fn notify_user(&self, discord_id: i64, title: &str, message: &str) -> Result<(), DispatchError> {
        self.post(
            "notify_user",
            &NotifyUserRequest {
                user_id: discord_id,
                title,
                message,
            },
        )
        .await
    }
}
