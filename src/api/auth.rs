//! API key middleware for the REST surface.
//!
//! When `ApiConfig::api_key` is set, requests without a matching X-Api-Key
//! header are answered with 401 before reaching any handler. With no key
//! configured the middleware is a pass-through.

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Check the X-Api-Key header against the configured key.
///
/// The comparison runs in constant time so response latency leaks nothing
/// about how much of the key matched.
pub async fn require_api_key(
    State(expected_api_key): State<Option<String>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected_key) = expected_api_key else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok());

    match provided {
        Some(key) if constant_time_eq(key.as_bytes(), expected_key.as_bytes()) => {
            next.run(request).await
        }
        Some(_) => unauthorized_response("API key is not valid"),
        None => unauthorized_response("X-Api-Key header is required"),
    }
}

/// Byte comparison that always scans the full length.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

fn unauthorized_response(message: &str) -> Response {
    let body = Json(json!({
        "error": {
            "code": "unauthorized",
            "message": message
        }
    }));
    (StatusCode::UNAUTHORIZED, body).into_response()
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
    };
    use tower::ServiceExt; // for oneshot

    async fn test_handler() -> impl IntoResponse {
        (StatusCode::OK, "Success")
    }

    fn app(api_key: Option<String>) -> Router {
        Router::new()
            .route("/test", get(test_handler))
            .layer(middleware::from_fn_with_state(api_key, require_api_key))
    }

    #[tokio::test]
    async fn no_key_configured_allows_everything() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app(None).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn valid_key_passes() {
        let request = Request::builder()
            .uri("/test")
            .header("X-Api-Key", "test-secret-key")
            .body(Body::empty())
            .unwrap();
        let response = app(Some("test-secret-key".into()))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn invalid_key_is_rejected() {
        let request = Request::builder()
            .uri("/test")
            .header("X-Api-Key", "wrong-key")
            .body(Body::empty())
            .unwrap();
        let response = app(Some("correct-key".into()))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8(body.to_vec()).unwrap().contains("API key is not valid"));
    }

    #[tokio::test]
    async fn missing_key_is_rejected() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = app(Some("required-key".into()))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(
            String::from_utf8(body.to_vec())
                .unwrap()
                .contains("X-Api-Key header is required")
        );
    }

    #[tokio::test]
    async fn keys_are_compared_exactly() {
        let request = Request::builder()
            .uri("/test")
            .header("X-Api-Key", "casesensitivekey")
            .body(Body::empty())
            .unwrap();
        let response = app(Some("CaseSensitiveKey".into()))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
