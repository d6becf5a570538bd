//! Meeting provisioning
//!
//! The provisioner is an external collaborator: given a request id it
//! returns a join-able meeting URL. It is treated as idempotent; even if a
//! retry calls it twice, at-most-once persistence is enforced by the store's
//! guarded URL write, so a duplicate result is simply discarded.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tmatch_common::{Error, Result};
use uuid::Uuid;

const HTTP_TIMEOUT_SECS: u64 = 10;

/// Source of meeting URLs for accepted requests
pub trait MeetingProvisioner: Send + Sync {
    /// Create (or return) the meeting URL for a request
    fn provision(&self, request_id: Uuid) -> BoxFuture<'_, Result<String>>;
}

/// Derives a deterministic room URL from a template
///
/// The default for standalone deployments: ad-hoc meeting rooms (e.g. Jitsi)
/// are created implicitly by joining, so deriving the URL is provisioning.
pub struct RoomTemplateProvisioner {
    template: String,
}

impl RoomTemplateProvisioner {
    /// `template` must contain the literal `{id}`, replaced per request
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl Default for RoomTemplateProvisioner {
    fn default() -> Self {
        Self::new("https://meet.jit.si/tmatch-{id}")
    }
}

impl MeetingProvisioner for RoomTemplateProvisioner {
    fn provision(&self, request_id: Uuid) -> BoxFuture<'_, Result<String>> {
        let url = self.template.replace("{id}", &request_id.to_string());
        Box::pin(async move { Ok(url) })
    }
}

#[derive(Debug, Serialize)]
struct ProvisionRequest {
    request_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct ProvisionResponse {
    url: String,
}

/// Calls an external room service over HTTP
///
/// POST `{endpoint}` with `{"request_id": ...}`, expecting `{"url": ...}`.
pub struct HttpProvisioner {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpProvisioner {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Provisioning(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
        })
    }
}

impl MeetingProvisioner for HttpProvisioner {
    fn provision(&self, request_id: Uuid) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let response = self
                .http_client
                .post(&self.endpoint)
                .json(&ProvisionRequest { request_id })
                .send()
                .await
                .map_err(|e| Error::Provisioning(format!("request failed: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Provisioning(format!(
                    "room service returned {}: {}",
                    status, body
                )));
            }

            let parsed: ProvisionResponse = response
                .json()
                .await
                .map_err(|e| Error::Provisioning(format!("bad response body: {}", e)))?;

            Ok(parsed.url)
        })
    }
}
