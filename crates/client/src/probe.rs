//! Session probe.
//!
//! A broken stream carries no status code. The probe repeats the stream's
//! request through the status-observable client to tell an expired session
//! apart from everything else.

use tracing::info;

use crate::api::GuideApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthorized,
    Other,
}

pub fn classify_status(status: u16) -> AuthState {
    if status == 401 {
        AuthState::Unauthorized
    } else {
        AuthState::Other
    }
}

pub async fn classify<A: GuideApi>(api: &A, resource_path: &str) -> AuthState {
    let status = api.probe_resource(resource_path).await;
    let auth = classify_status(status);
    info!(
        component = "probe",
        event = "probe.session.classified",
        path = %resource_path,
        status,
        auth = ?auth,
        "Classified stream failure"
    );
    auth
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiClient, OPERATOR_GUIDES_PATH};
    use crate::config::Config;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    #[test]
    fn only_401_is_unauthorized() {
        assert_eq!(classify_status(401), AuthState::Unauthorized);
        for status in [200, 403, 404, 500, 502] {
            assert_eq!(classify_status(status), AuthState::Other);
        }
    }

    async fn probe_against(status: StatusCode) -> AuthState {
        let router = Router::new().route(OPERATOR_GUIDES_PATH, get(move || async move { status }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        let api = ApiClient::new(&Config::for_tests(&base)).unwrap();
        classify(&api, OPERATOR_GUIDES_PATH).await
    }

    #[tokio::test]
    async fn probe_distinguishes_expired_session() {
        assert_eq!(
            probe_against(StatusCode::UNAUTHORIZED).await,
            AuthState::Unauthorized
        );
        assert_eq!(
            probe_against(StatusCode::SERVICE_UNAVAILABLE).await,
            AuthState::Other
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_other() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let api = ApiClient::new(&Config::for_tests(&base)).unwrap();
        assert_eq!(classify(&api, OPERATOR_GUIDES_PATH).await, AuthState::Other);
    }
}
