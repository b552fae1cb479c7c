//! Domain check endpoint
//!
//! Probes a caller-supplied URL through the shared proxy client. Runs on the
//! request's own task and never touches the status record.

use super::common::{
    ApiError, ApiResponse, ApiResult, CheckRequest, ERROR_CODE_METHOD_NOT_ALLOWED,
    ERROR_CODE_UNREACHABLE,
};
use super::AppState;
use crate::probe::ProbeSuccess;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use tracing::{debug, info, warn};

/// POST /check - Probe a domain and report its final URL
///
/// The body is parsed by hand so any content type is accepted and every
/// parse failure maps to a plain-text 400.
pub async fn check_domain(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<ApiResponse<ProbeSuccess>> {
    let request: CheckRequest = serde_json::from_slice(&body).map_err(|e| {
        debug!("Rejecting check body: {}", e);
        ApiError::malformed(e.to_string())
    })?;

    // Queueing for a permit counts against the same budget as the request
    let permit = tokio::time::timeout(state.probe.timeout(), state.check_permits.acquire()).await;
    let _permit = match permit {
        Ok(acquired) => acquired.map_err(|e| ApiError::Internal(e.to_string()))?,
        Err(_) => {
            warn!("Domain {} not checked: too many checks in flight", request.domain);
            return Ok(ApiResponse::error(
                ERROR_CODE_UNREACHABLE,
                "domain unreachable: too many checks in flight",
            ));
        }
    };

    info!("Visiting {}", request.domain);

    match state.probe.probe(&request.domain).await {
        Ok(success) => {
            debug!("{} resolved to {}", request.domain, success.final_url);
            Ok(ApiResponse::success(success))
        }
        Err(e) => {
            warn!("Domain {} unreachable: {}", request.domain, e);
            Ok(ApiResponse::error(
                ERROR_CODE_UNREACHABLE,
                format!("domain unreachable: {}", e),
            ))
        }
    }
}

/// Any method other than POST on /check
pub async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST")],
        ApiResponse::<()>::error(ERROR_CODE_METHOD_NOT_ALLOWED, "method not allowed"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::ProxyClient;
    use crate::probe::ReachabilityProbe;
    use crate::status::StatusStore;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn state_with(timeout: Duration, max_concurrent_checks: usize) -> AppState {
        let client = ProxyClient::new(None, timeout).unwrap();
        AppState::new(
            Arc::new(StatusStore::new("-", "")),
            ReachabilityProbe::new(client),
            max_concurrent_checks,
        )
    }

    fn state() -> AppState {
        state_with(Duration::from_secs(5), 4)
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let err = check_domain(State(state()), Bytes::from_static(b"not json"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn test_missing_domain_field() {
        let err = check_domain(State(state()), Bytes::from_static(br#"{"url": "x"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn test_reachable_domain() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let body = serde_json::to_vec(&serde_json::json!({ "domain": server.uri() })).unwrap();
        let response = check_domain(State(state()), Bytes::from(body)).await.unwrap();
        assert_eq!(response.error_code, 0);
        assert_eq!(response.message, "success");
        assert!(response.data.unwrap().final_url.starts_with(&server.uri()));
    }

    #[tokio::test]
    async fn test_not_found_domain() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let body = serde_json::to_vec(&serde_json::json!({ "domain": server.uri() })).unwrap();
        let response = check_domain(State(state()), Bytes::from(body)).await.unwrap();
        assert_eq!(response.error_code, ERROR_CODE_UNREACHABLE);
        assert_eq!(response.message, "domain unreachable: status code is 404");
        assert!(response.data.is_none());
    }

    #[tokio::test]
    async fn test_check_does_not_touch_status() {
        let state = state();
        let before = state.store.read();

        let response = check_domain(
            State(state.clone()),
            Bytes::from_static(br#"{"domain": "not a url"}"#),
        )
        .await
        .unwrap();

        assert_eq!(response.error_code, ERROR_CODE_UNREACHABLE);
        assert!(response.message.starts_with("domain unreachable: "));
        assert_eq!(state.store.read(), before);
    }

    #[tokio::test]
    async fn test_queued_check_gives_up_after_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let state = state_with(Duration::from_millis(200), 1);
        let _busy = state.check_permits.clone().acquire_owned().await.unwrap();

        let body = serde_json::to_vec(&serde_json::json!({ "domain": server.uri() })).unwrap();
        let started = std::time::Instant::now();
        let response = check_domain(State(state.clone()), Bytes::from(body)).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(response.error_code, ERROR_CODE_UNREACHABLE);
        assert_eq!(response.message, "domain unreachable: too many checks in flight");
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_checks_bounded_by_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .mount(&server)
            .await;

        let timeout = Duration::from_millis(500);
        let state = state_with(timeout, 1);
        let body = serde_json::to_vec(&serde_json::json!({ "domain": server.uri() })).unwrap();

        let started = std::time::Instant::now();
        let checks: Vec<_> = (0..3)
            .map(|_| {
                let state = state.clone();
                let body = Bytes::from(body.clone());
                tokio::spawn(async move { check_domain(State(state), body).await.unwrap() })
            })
            .collect();

        let mut codes = Vec::new();
        for check in checks {
            codes.push(check.await.unwrap().error_code);
        }

        // Worst case: a full wait for a permit followed by a full request
        assert!(started.elapsed() < timeout * 2 + Duration::from_millis(500));
        // Three 300ms requests cannot all fit through one permit in 500ms
        assert!(codes.contains(&ERROR_CODE_UNREACHABLE));
    }
}
