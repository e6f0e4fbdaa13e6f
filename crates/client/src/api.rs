//! One-shot REST requests against the guide API.
//!
//! Every call resolves to an `ApiResponse`: HTTP error statuses are normal,
//! inspectable outcomes, and transport failures (connect, timeout, body read)
//! are folded into a uniform `500` response with a `null` request id.
//! Callers only ever branch on the status.

use std::future::Future;
use std::time::Duration;

use guidewatch_protocol::{
    new_request_id, AssignRequest, ChangeStatusRequest, GuideId, ResponseEnvelope,
    StatusOptionsData,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, CONTENT_TYPE, COOKIE};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ClientError;

/// Resource the operator stream reads; also what the session probe targets.
pub const OPERATOR_GUIDES_PATH: &str = "/operator/guides";
pub const MONITOR_EVENTS_PATH: &str = "/monitor/events";

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Status plus decoded envelope of a one-shot request
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub content: ResponseEnvelope<T>,
}

impl<T> ApiResponse<T> {
    #[cfg(test)]
    pub fn ok(data: T) -> Self {
        Self {
            status: 200,
            content: ResponseEnvelope {
                data: Some(data),
                message: String::new(),
                request_id: None,
            },
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            content: ResponseEnvelope {
                data: None,
                message: message.into(),
                request_id: None,
            },
        }
    }

    /// Uniform shape for failures that never produced an HTTP status
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self::with_status(500, message)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

/// The requests the operator workflow issues.
///
/// Implemented over HTTP by `ApiClient`; tests substitute scripted fakes.
pub trait GuideApi: Send + Sync + 'static {
    fn assign_self(&self, guide_id: &GuideId) -> impl Future<Output = ApiResponse<Value>> + Send;

    fn fetch_status_options(
        &self,
        guide_id: &GuideId,
    ) -> impl Future<Output = ApiResponse<StatusOptionsData>> + Send;

    fn commit_status(
        &self,
        guide_id: &GuideId,
        status_id: &str,
    ) -> impl Future<Output = ApiResponse<Value>> + Send;

    /// Authenticated GET whose status is returned whatever it is.
    /// Transport failures report `500`.
    fn probe_resource(&self, path: &str) -> impl Future<Output = u16> + Send;
}

/// HTTP implementation of `GuideApi`
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_url: String,
    sse_url: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .default_headers(common_headers(config)?)
            .connect_timeout(Duration::from_secs(5))
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            sse_url: config.sse_url.clone(),
        })
    }

    pub async fn logout(&self) -> ApiResponse<Value> {
        let url = format!("{}/auth/logout", self.api_url);
        let result = self
            .http
            .post(&url)
            .header(REQUEST_ID_HEADER, new_request_id())
            .send()
            .await;
        into_api_response(result, "logout", "Failed to close the session").await
    }
}

impl GuideApi for ApiClient {
    async fn assign_self(&self, guide_id: &GuideId) -> ApiResponse<Value> {
        let url = format!("{}/guide/{}/assign", self.api_url, guide_id);
        let result = self
            .http
            .post(&url)
            .header(REQUEST_ID_HEADER, new_request_id())
            .json(&AssignRequest {})
            .send()
            .await;
        into_api_response(result, "assign", "Failed to assign the guide to the operator").await
    }

    async fn fetch_status_options(&self, guide_id: &GuideId) -> ApiResponse<StatusOptionsData> {
        let url = format!("{}/guide/{}/status-options", self.api_url, guide_id);
        let result = self
            .http
            .get(&url)
            .header(REQUEST_ID_HEADER, new_request_id())
            .send()
            .await;
        into_api_response(result, "status_options", "Failed to load status options").await
    }

    async fn commit_status(&self, guide_id: &GuideId, status_id: &str) -> ApiResponse<Value> {
        let url = format!("{}/guide/{}/status", self.api_url, guide_id);
        let result = self
            .http
            .put(&url)
            .header(REQUEST_ID_HEADER, new_request_id())
            .json(&ChangeStatusRequest {
                status: status_id.to_string(),
            })
            .send()
            .await;
        into_api_response(result, "commit_status", "Failed to change the guide status").await
    }

    async fn probe_resource(&self, path: &str) -> u16 {
        let url = format!("{}{}", self.sse_url, path);
        match self
            .http
            .get(&url)
            .header(REQUEST_ID_HEADER, new_request_id())
            .send()
            .await
        {
            // Only the status matters; dropping the response closes the body.
            Ok(response) => response.status().as_u16(),
            Err(e) => {
                warn!(
                    component = "api",
                    event = "api.probe.transport_failed",
                    url = %url,
                    error = %e,
                    "Session probe could not reach the server"
                );
                500
            }
        }
    }
}

pub(crate) fn common_headers(config: &Config) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert("bypass-tunnel-reminder", HeaderValue::from_static("true"));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_str(&config.lang).map_err(|_| ClientError::InvalidHeader("lang"))?,
    );
    if let Some(cookie) = &config.session_cookie {
        let mut value =
            HeaderValue::from_str(cookie).map_err(|_| ClientError::InvalidHeader("cookie"))?;
        value.set_sensitive(true);
        headers.insert(COOKIE, value);
    }
    Ok(headers)
}

async fn into_api_response<T: DeserializeOwned>(
    result: Result<reqwest::Response, reqwest::Error>,
    action: &'static str,
    failure_message: &str,
) -> ApiResponse<T> {
    let response = match result {
        Ok(response) => response,
        Err(e) => {
            warn!(
                component = "api",
                event = "api.request.transport_failed",
                action,
                error = %e,
                "Request failed before a response arrived"
            );
            return ApiResponse::transport_failure(failure_message);
        }
    };

    let status = response.status().as_u16();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            warn!(
                component = "api",
                event = "api.response.read_failed",
                action,
                status,
                error = %e,
                "Failed to read response body"
            );
            return ApiResponse::transport_failure(failure_message);
        }
    };

    debug!(
        component = "api",
        event = "api.request.completed",
        action,
        status,
        "Request completed"
    );

    ApiResponse {
        status,
        content: decode_envelope(&body),
    }
}

/// Decode a response body, salvaging `message`/`requestId` when `data`
/// does not fit the expected type (typical for error bodies).
fn decode_envelope<T: DeserializeOwned>(body: &str) -> ResponseEnvelope<T> {
    if body.trim().is_empty() {
        return ResponseEnvelope::default();
    }
    match serde_json::from_str::<ResponseEnvelope<T>>(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(
                component = "api",
                event = "api.response.decode_failed",
                error = %e,
                "Response data did not match the expected shape"
            );
            serde_json::from_str::<ResponseEnvelope<Value>>(body)
                .map(|envelope| ResponseEnvelope {
                    data: None,
                    message: envelope.message,
                    request_id: envelope.request_id,
                })
                .unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::{get, post, put};
    use axum::{Json, Router};
    use guidewatch_protocol::StatusOption;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client_for(base: &str) -> ApiClient {
        let mut config = Config::for_tests(base);
        config.request_timeout_secs = 2;
        ApiClient::new(&config).unwrap()
    }

    #[test]
    fn decode_envelope_salvages_error_message() {
        let envelope: ResponseEnvelope<StatusOptionsData> =
            decode_envelope(r#"{"data":"oops","message":"Guía no encontrada","requestId":"r-9"}"#);
        assert!(envelope.data.is_none());
        assert_eq!(envelope.message, "Guía no encontrada");
        assert_eq!(envelope.request_id.as_deref(), Some("r-9"));

        let envelope: ResponseEnvelope<StatusOptionsData> = decode_envelope("<html>");
        assert!(envelope.data.is_none());
        assert!(envelope.message.is_empty());
    }

    #[tokio::test]
    async fn fetch_status_options_decodes_success() {
        let router = Router::new().route(
            "/guide/{id}/status-options",
            get(|Path(id): Path<String>| async move {
                assert_eq!(id, "12");
                Json(serde_json::json!({
                    "data": {"statusOption": [{"id": "DELIVERED", "description": "Entregado"}]},
                    "message": "",
                    "requestId": "req-1"
                }))
            }),
        );
        let base = serve(router).await;

        let response = client_for(&base)
            .fetch_status_options(&GuideId::new("12"))
            .await;
        assert!(response.is_success());
        let options = response.content.data.unwrap().status_option;
        assert_eq!(options, vec![StatusOption::new("DELIVERED", "Entregado")]);
    }

    #[tokio::test]
    async fn error_status_is_returned_not_raised() {
        let router = Router::new().route(
            "/guide/{id}/status",
            put(|| async {
                (
                    StatusCode::CONFLICT,
                    Json(serde_json::json!({"data": null, "message": "Estado inválido", "requestId": "req-2"})),
                )
            }),
        );
        let base = serve(router).await;

        let response = client_for(&base)
            .commit_status(&GuideId::new("12"), "DELIVERED")
            .await;
        assert_eq!(response.status, 409);
        assert_eq!(response.content.message, "Estado inválido");
        assert_eq!(response.content.request_id.as_deref(), Some("req-2"));
    }

    #[tokio::test]
    async fn unauthorized_assign_is_visible() {
        let router = Router::new().route(
            "/guide/{id}/assign",
            post(|| async { StatusCode::UNAUTHORIZED }),
        );
        let base = serve(router).await;

        let response = client_for(&base).assign_self(&GuideId::new("5")).await;
        assert!(response.is_unauthorized());
        assert!(response.content.message.is_empty());
    }

    #[tokio::test]
    async fn transport_failure_maps_to_uniform_500() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let response = client_for(&base).assign_self(&GuideId::new("5")).await;
        assert_eq!(response.status, 500);
        assert!(response.content.request_id.is_none());
        assert!(!response.content.message.is_empty());
    }

    #[tokio::test]
    async fn probe_reports_status_of_stream_resource() {
        let router = Router::new().route(
            OPERATOR_GUIDES_PATH,
            get(|| async { StatusCode::UNAUTHORIZED }),
        );
        let base = serve(router).await;

        assert_eq!(client_for(&base).probe_resource(OPERATOR_GUIDES_PATH).await, 401);
    }
}
