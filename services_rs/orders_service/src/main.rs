mod catalog;
mod config;
mod customers;
mod db;
mod error;
mod handlers;
mod models;
mod orders;
mod payment;
mod state;

use axum::extract::MatchedPath;
use axum::http::{header, header::HeaderName, Method, StatusCode};
use axum::routing::{get, patch, post};
use axum::Router;
use catalog::Catalog;
use chrono::Duration;
use config::Config;
use skyfare_common::host_guard::AllowedHostsLayer;
use skyfare_common::internal_auth::InternalAuthLayer;
use skyfare_common::request_id::RequestIdLayer;
use state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let pool = match db::connect(&cfg.db_url, cfg.db_max_connections).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "db connect failed");
            std::process::exit(2);
        }
    };
    if let Err(e) = db::ensure_schema(&pool, &cfg.db_schema).await {
        tracing::error!(error = %e, "db ensure_schema failed");
        std::process::exit(2);
    }

    let catalog = Catalog::mock(cfg.mock_base_date);
    tracing::info!(
        flights = catalog.flights().len(),
        base_date = %cfg.mock_base_date,
        "flight catalog loaded"
    );

    let state = AppState {
        pool,
        db_schema: cfg.db_schema.clone(),
        env_name: cfg.env_name.clone(),
        catalog: Arc::new(catalog),
        payment_expiry: Duration::minutes(cfg.payment_expiry_minutes),
        business_tz: cfg.business_tz,
        recipient_name: cfg.recipient_name.clone(),
    };

    let internal = InternalAuthLayer::new(cfg.require_internal_secret, cfg.internal_secret.clone())
        .with_allowed_callers(cfg.internal_allowed_callers.clone());

    let public = Router::new()
        .route("/api/db-ping", get(handlers::db_ping))
        .route("/api/flights", get(handlers::search_flights))
        .route("/api/flights/:flight_id", get(handlers::get_flight))
        .route("/api/orders/init", post(handlers::init_order))
        .route("/api/orders/:order_id", get(handlers::order_status))
        .route("/api/orders/:order_id/method", patch(handlers::change_method));

    let internal_routes = Router::new()
        .route("/internal/orders/:order_id/paid", post(handlers::confirm_paid))
        .layer(internal);

    let cors = if cfg.allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(cors_allowed_methods())
            .allow_headers(cors_allowed_headers())
            .allow_credentials(false)
    } else {
        let origins: Vec<axum::http::HeaderValue> = cfg
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_methods(cors_allowed_methods())
            .allow_headers(cors_allowed_headers())
            .allow_credentials(false)
            .allow_origin(AllowOrigin::list(origins))
    };

    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(public)
        .merge(internal_routes)
        // Unknown routes are a plain 404, never an internal-auth rejection.
        .fallback(|| async { StatusCode::NOT_FOUND })
        .with_state(state)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(cfg.max_body_bytes))
        .layer(AllowedHostsLayer::new(cfg.allowed_hosts.clone()))
        // Route template only: query strings may carry contact data.
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(MatchedPath::as_str)
                    .unwrap_or_else(|| req.uri().path());
                tracing::span!(
                    tracing::Level::INFO,
                    "http_request",
                    method = %req.method(),
                    path = %path
                )
            }),
        )
        .layer(RequestIdLayer::new(HeaderName::from_static("x-request-id")));

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], cfg.port)));
    tracing::info!(%addr, env = %cfg.env_name, "starting skyfare_orders_service");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, %addr, "bind failed");
            std::process::exit(2);
        }
    };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

fn cors_allowed_methods() -> [Method; 4] {
    [Method::GET, Method::POST, Method::PATCH, Method::OPTIONS]
}

fn cors_allowed_headers() -> Vec<HeaderName> {
    vec![
        header::ACCEPT,
        header::CONTENT_TYPE,
        HeaderName::from_static("x-request-id"),
    ]
}

#[cfg(test)]
mod router_fallback_tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn ok_handler() -> &'static str {
        "ok"
    }

    #[tokio::test]
    async fn unknown_routes_return_404_not_internal_auth_required() {
        let internal = InternalAuthLayer::new(true, Some("test-secret-value-123".to_string()));
        let internal_routes = Router::new()
            .route("/internal/orders/:order_id/paid", post(ok_handler))
            .layer(internal);

        let app = Router::new()
            .route("/health", get(ok_handler))
            .merge(internal_routes)
            .fallback(|| async { StatusCode::NOT_FOUND });

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/does_not_exist")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/internal/orders/1/paid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn cors_whitelist_excludes_internal_headers() {
        let headers = cors_allowed_headers();
        let has = |name: &str| {
            headers
                .iter()
                .any(|h| h.as_str().eq_ignore_ascii_case(name))
        };

        assert!(has("content-type"));
        assert!(has("x-request-id"));
        assert!(!has("x-internal-secret"));
        assert!(!has("x-internal-service-id"));
        assert!(!has("cookie"));
        assert!(cors_allowed_methods().contains(&Method::PATCH));
    }
}
