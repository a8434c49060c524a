// CORS configuration for the relay's REST and upgrade endpoints.
//
// Allowed origins come from `RelayConfig::cors_origins`
// (`TASKLIVE_RELAY_CORS_ORIGINS`, comma-separated). Unset means the local
// SPA dev servers.

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Origins allowed when no list is configured.
const DEFAULT_DEV_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://localhost:4173",
    "http://127.0.0.1:5173",
    "http://localhost:3000",
];

/// Build a [`CorsLayer`] for the configured origin list.
///
/// - `"*"` allows any origin, without credentials.
/// - A comma-separated list allows exactly those origins.
/// - `None` allows the default development origins.
///
/// Non-wildcard configurations allow credentials, since the SPA sends its
/// session cookie. Preflight responses are cached for 10 minutes.
pub fn cors_layer(configured: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([HeaderName::from_static("x-request-id")])
        .max_age(std::time::Duration::from_secs(600));

    match configured.map(str::trim) {
        Some("*") => base.allow_origin(AllowOrigin::any()),
        Some(origins) => base.allow_origin(parse_origins(origins)).allow_credentials(true),
        None => base
            .allow_origin(parse_origins(&DEFAULT_DEV_ORIGINS.join(",")))
            .allow_credentials(true),
    }
}

fn parse_origins(comma_separated: &str) -> Vec<HeaderValue> {
    comma_separated
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| HeaderValue::from_str(s).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, response::IntoResponse, routing::get, Router};
    use tower::ServiceExt;

    async fn ok_handler() -> impl IntoResponse {
        "ok"
    }

    fn test_app(configured: Option<&str>) -> Router {
        Router::new().route("/test", get(ok_handler)).layer(cors_layer(configured))
    }

    fn preflight(origin: &str) -> Request<Body> {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/test")
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .expect("preflight request should build")
    }

    #[tokio::test]
    async fn preflight_allows_spa_dev_origin_with_credentials() {
        let response = test_app(None)
            .oneshot(preflight("http://localhost:5173"))
            .await
            .expect("preflight should return a response");

        let headers = response.headers();
        assert_eq!(
            headers.get("access-control-allow-origin").and_then(|v| v.to_str().ok()),
            Some("http://localhost:5173")
        );
        assert_eq!(
            headers.get("access-control-allow-credentials").and_then(|v| v.to_str().ok()),
            Some("true")
        );
        assert_eq!(
            headers.get("access-control-max-age").and_then(|v| v.to_str().ok()),
            Some("600")
        );
    }

    #[tokio::test]
    async fn preflight_rejects_unknown_origin() {
        let response = test_app(None)
            .oneshot(preflight("https://evil.example.com"))
            .await
            .expect("preflight should return a response");

        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn configured_origins_replace_defaults() {
        let app = test_app(Some("https://tasks.example.com, https://staging.tasks.example.com"));

        let response = app
            .clone()
            .oneshot(preflight("https://tasks.example.com"))
            .await
            .expect("preflight should return a response");
        assert_eq!(
            response.headers().get("access-control-allow-origin").and_then(|v| v.to_str().ok()),
            Some("https://tasks.example.com")
        );

        let response = app
            .oneshot(preflight("http://localhost:5173"))
            .await
            .expect("preflight should return a response");
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn wildcard_origin_disables_credentials() {
        let response = test_app(Some("*"))
            .oneshot(preflight("https://anything.example.com"))
            .await
            .expect("preflight should return a response");

        assert_eq!(
            response.headers().get("access-control-allow-origin").and_then(|v| v.to_str().ok()),
            Some("*")
        );
        assert!(response.headers().get("access-control-allow-credentials").is_none());
    }

    #[test]
    fn parse_origins_handles_whitespace() {
        let origins = parse_origins("  https://a.com , https://b.com  , ");
        assert_eq!(origins, vec!["https://a.com", "https://b.com"]);
    }
}
