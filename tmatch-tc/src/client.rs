//! HTTP client for the matching server API
//!
//! Thin wrapper over reqwest that decodes the server's error bodies back
//! into the shared error taxonomy, so the console treats a remote 409 the
//! same way the server-side components treat a local conflict.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tmatch_common::api::types::{
    AcceptSessionRequest, CancelSessionRequest, CreateSessionRequest, ErrorBody,
    PartyActionRequest, SessionListResponse, SessionSnapshot, StudentJoinedRequest,
    TutorJoinedRequest,
};
use tmatch_common::{Error, RequestStatus, Result, SessionRequest};
use uuid::Uuid;

const HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Clone)]
pub struct ApiClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// SSE endpoint URL for the push listener
    pub fn events_url(&self, subject_id: Option<Uuid>) -> String {
        match subject_id {
            Some(subject) => format!("{}/api/v1/events?subject_id={}", self.base_url, subject),
            None => format!("{}/api/v1/events", self.base_url),
        }
    }

    pub async fn create(&self, student_id: Uuid, subject_id: Uuid) -> Result<SessionRequest> {
        let response = self
            .http_client
            .post(format!("{}/api/v1/instant-sessions", self.base_url))
            .json(&CreateSessionRequest {
                student_id,
                subject_id,
            })
            .send()
            .await
            .map_err(request_error)?;
        decode(response, None, "create").await
    }

    pub async fn get(&self, id: Uuid) -> Result<SessionSnapshot> {
        let response = self
            .http_client
            .get(format!("{}/api/v1/instant-sessions/{}", self.base_url, id))
            .send()
            .await
            .map_err(request_error)?;
        decode(response, Some(id), "get").await
    }

    pub async fn list_pending(&self, subject_id: Option<Uuid>) -> Result<Vec<SessionRequest>> {
        let mut request = self
            .http_client
            .get(format!("{}/api/v1/instant-sessions/pending", self.base_url));
        if let Some(subject) = subject_id {
            request = request.query(&[("subject_id", subject.to_string())]);
        }

        let response = request.send().await.map_err(request_error)?;
        let list: SessionListResponse = decode(response, None, "list_pending").await?;
        Ok(list.requests)
    }

    pub async fn student_history(&self, student_id: Uuid, limit: i64) -> Result<Vec<SessionRequest>> {
        let response = self
            .http_client
            .get(format!(
                "{}/api/v1/instant-sessions/student/{}",
                self.base_url, student_id
            ))
            .query(&[("limit", limit.to_string())])
            .send()
            .await
            .map_err(request_error)?;
        let list: SessionListResponse = decode(response, None, "history").await?;
        Ok(list.requests)
    }

    pub async fn tutor_history(&self, tutor_id: Uuid, limit: i64) -> Result<Vec<SessionRequest>> {
        let response = self
            .http_client
            .get(format!(
                "{}/api/v1/instant-sessions/tutor/{}",
                self.base_url, tutor_id
            ))
            .query(&[("limit", limit.to_string())])
            .send()
            .await
            .map_err(request_error)?;
        let list: SessionListResponse = decode(response, None, "history").await?;
        Ok(list.requests)
    }

    pub async fn accept(&self, id: Uuid, tutor_id: Uuid) -> Result<SessionRequest> {
        let response = self
            .http_client
            .post(format!(
                "{}/api/v1/instant-sessions/{}/accept",
                self.base_url, id
            ))
            .json(&AcceptSessionRequest { tutor_id })
            .send()
            .await
            .map_err(request_error)?;
        decode(response, Some(id), "accept").await
    }

    pub async fn cancel(
        &self,
        id: Uuid,
        caller_id: Uuid,
        reason: Option<String>,
    ) -> Result<SessionRequest> {
        let response = self
            .http_client
            .post(format!(
                "{}/api/v1/instant-sessions/{}/cancel",
                self.base_url, id
            ))
            .json(&CancelSessionRequest { caller_id, reason })
            .send()
            .await
            .map_err(request_error)?;
        decode(response, Some(id), "cancel").await
    }

    pub async fn tutor_joined(&self, id: Uuid, tutor_id: Uuid) -> Result<SessionRequest> {
        let response = self
            .http_client
            .post(format!(
                "{}/api/v1/instant-sessions/{}/tutor-joined",
                self.base_url, id
            ))
            .json(&TutorJoinedRequest { tutor_id })
            .send()
            .await
            .map_err(request_error)?;
        decode(response, Some(id), "join").await
    }

    pub async fn student_joined(&self, id: Uuid, student_id: Uuid) -> Result<SessionRequest> {
        let response = self
            .http_client
            .post(format!(
                "{}/api/v1/instant-sessions/{}/student-joined",
                self.base_url, id
            ))
            .json(&StudentJoinedRequest { student_id })
            .send()
            .await
            .map_err(request_error)?;
        decode(response, Some(id), "join").await
    }

    pub async fn start(&self, id: Uuid, caller_id: Uuid) -> Result<SessionRequest> {
        let response = self
            .http_client
            .post(format!(
                "{}/api/v1/instant-sessions/{}/start",
                self.base_url, id
            ))
            .json(&PartyActionRequest { caller_id })
            .send()
            .await
            .map_err(request_error)?;
        decode(response, Some(id), "start").await
    }

    pub async fn complete(&self, id: Uuid, caller_id: Uuid) -> Result<SessionRequest> {
        let response = self
            .http_client
            .post(format!(
                "{}/api/v1/instant-sessions/{}/complete",
                self.base_url, id
            ))
            .json(&PartyActionRequest { caller_id })
            .send()
            .await
            .map_err(request_error)?;
        decode(response, Some(id), "complete").await
    }
}

fn request_error(e: reqwest::Error) -> Error {
    Error::Internal(format!("Request failed: {}", e))
}

/// Decode a success body, or map the server's error body back onto the
/// shared taxonomy
async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
    id: Option<Uuid>,
    action: &'static str,
) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Bad response body: {}", e)));
    }

    let body: Option<ErrorBody> = response.json().await.ok();
    Err(map_error(status, body, id, action))
}

fn map_error(
    status: StatusCode,
    body: Option<ErrorBody>,
    id: Option<Uuid>,
    action: &'static str,
) -> Error {
    let id = id.unwrap_or_else(Uuid::nil);
    let (code, message, current_status) = match body {
        Some(body) => (body.code, body.status, body.current_status),
        None => (String::new(), format!("HTTP {}", status), None),
    };

    match code.as_str() {
        "already_claimed" => Error::AlreadyClaimed(id),
        "not_found" => Error::NotFound(id),
        "unauthorized" => Error::Unauthorized(message),
        "provisioning_failure" => Error::Provisioning(message),
        "invalid_transition" => Error::InvalidTransition {
            id,
            from: current_status.unwrap_or(RequestStatus::Pending),
            action,
        },
        "invalid_input" => Error::InvalidInput(message),
        _ => Error::Internal(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_error_already_claimed() {
        let id = Uuid::new_v4();
        let body = ErrorBody {
            status: "Session request already claimed".to_string(),
            code: "already_claimed".to_string(),
            current_status: None,
        };
        match map_error(StatusCode::CONFLICT, Some(body), Some(id), "accept") {
            Error::AlreadyClaimed(got) => assert_eq!(got, id),
            other => panic!("Wrong error mapping: {:?}", other),
        }
    }

    #[test]
    fn test_map_error_invalid_transition_carries_status() {
        let body = ErrorBody {
            status: "Cannot accept while expired".to_string(),
            code: "invalid_transition".to_string(),
            current_status: Some(RequestStatus::Expired),
        };
        match map_error(StatusCode::CONFLICT, Some(body), None, "accept") {
            Error::InvalidTransition { from, action, .. } => {
                assert_eq!(from, RequestStatus::Expired);
                assert_eq!(action, "accept");
            }
            other => panic!("Wrong error mapping: {:?}", other),
        }
    }

    #[test]
    fn test_map_error_without_body() {
        match map_error(StatusCode::BAD_GATEWAY, None, None, "get") {
            Error::Internal(message) => assert!(message.contains("502")),
            other => panic!("Wrong error mapping: {:?}", other),
        }
    }

    #[test]
    fn test_events_url_with_subject_filter() {
        let client = ApiClient::new("http://localhost:5760/").unwrap();
        let subject = Uuid::new_v4();
        assert_eq!(
            client.events_url(None),
            "http://localhost:5760/api/v1/events"
        );
        assert_eq!(
            client.events_url(Some(subject)),
            format!("http://localhost:5760/api/v1/events?subject_id={}", subject)
        );
    }
}
