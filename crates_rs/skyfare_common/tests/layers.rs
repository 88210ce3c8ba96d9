use axum::body::Body;
use axum::http::{header::HeaderName, Request, StatusCode};
use axum::routing::post;
use axum::Router;
use skyfare_common::host_guard::AllowedHostsLayer;
use skyfare_common::internal_auth::InternalAuthLayer;
use skyfare_common::request_id::{RequestId, RequestIdLayer};
use tower::ServiceExt;

fn confirm_route(layer: InternalAuthLayer) -> Router {
    Router::new()
        .route("/internal/orders/1/paid", post(|| async { "paid" }))
        .layer(layer)
}

fn confirm_request(secret: Option<&str>, caller: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/internal/orders/1/paid");
    if let Some(s) = secret {
        builder = builder.header("x-internal-secret", s);
    }
    if let Some(c) = caller {
        builder = builder.header("x-internal-service-id", c);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn internal_auth_disabled_lets_callback_through() {
    let app = confirm_route(InternalAuthLayer::new(false, None));
    let resp = app.oneshot(confirm_request(None, None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn internal_auth_without_configured_secret_is_503() {
    let app = confirm_route(InternalAuthLayer::new(true, Some("   ".to_string())));
    let resp = app
        .oneshot(confirm_request(Some("anything"), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn internal_auth_checks_secret() {
    let app = confirm_route(InternalAuthLayer::new(
        true,
        Some("gateway-secret".to_string()),
    ));

    let missing = app.clone().oneshot(confirm_request(None, None)).await.unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = app
        .clone()
        .oneshot(confirm_request(Some("gateway-secreT"), None))
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let ok = app
        .oneshot(confirm_request(Some("gateway-secret"), None))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
}

#[tokio::test]
async fn internal_auth_enforces_caller_allow_list() {
    let app = confirm_route(
        InternalAuthLayer::new(true, Some("gateway-secret".to_string()))
            .with_allowed_callers(vec![" Payments ".to_string(), "payments".to_string()]),
    );

    let no_caller = app
        .clone()
        .oneshot(confirm_request(Some("gateway-secret"), None))
        .await
        .unwrap();
    assert_eq!(no_caller.status(), StatusCode::UNAUTHORIZED);

    let stranger = app
        .clone()
        .oneshot(confirm_request(Some("gateway-secret"), Some("web")))
        .await
        .unwrap();
    assert_eq!(stranger.status(), StatusCode::UNAUTHORIZED);

    let ok = app
        .oneshot(confirm_request(Some("gateway-secret"), Some("PAYMENTS")))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
}

#[tokio::test]
async fn host_guard_rejects_unknown_hosts() {
    let app = Router::new()
        .route("/x", post(|| async { "ok" }))
        .layer(AllowedHostsLayer::new(vec!["api.skyfare.id".to_string()]));

    let ok = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/x")
                .header("host", "API.skyfare.id:443")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);

    let bad = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/x")
                .header("host", "elsewhere.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn request_id_is_generated_and_visible_to_handlers() {
    let app = Router::new()
        .route(
            "/x",
            post(|axum::Extension(rid): axum::Extension<RequestId>| async move {
                rid.as_str().to_string()
            }),
        )
        .layer(RequestIdLayer::new(HeaderName::from_static("x-request-id")));

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/x")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let header = resp
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    assert_eq!(header.len(), 32);

    let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
    assert_eq!(body.as_ref(), header.as_bytes());
}

#[tokio::test]
async fn request_id_echoes_caller_value() {
    let app = Router::new()
        .route("/x", post(|| async { "ok" }))
        .layer(RequestIdLayer::new(HeaderName::from_static("x-request-id")));

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/x")
                .header("x-request-id", "checkout-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        resp.headers().get("x-request-id").and_then(|v| v.to_str().ok()),
        Some("checkout-42")
    );
}
