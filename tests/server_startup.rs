//! Server Startup Tests
//!
//! Tests for server lifecycle, configuration loading, and startup behavior.
//! These tests verify that the server can start correctly under various conditions.

use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use axum::{Router, body::Body, extract::connect_info::MockConnectInfo, http::Request, middleware};
use tokio::time::timeout;
use tower::util::ServiceExt;

use relay_gateway::{
    ServerConfig, core::Assistant, middleware::connection_limit_middleware, routes,
    state::AppState,
};

/// Helper function to create a minimal test configuration
fn create_minimal_config(port: u16) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.port = port;
    config.server_domain = Some("relay.test".to_string());
    config.assistants = vec![Assistant::new("banking", "Welcome to the bank")];
    config
}

/// Find an available port for testing
fn find_available_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Test that the server can start with minimal configuration (no API keys)
#[tokio::test]
async fn test_minimal_config_boot() {
    let port = find_available_port();
    let config = create_minimal_config(port);

    // No OpenAI key: state still builds, setup fails per call instead
    let app_state = AppState::new(config).expect("state should build without API keys");

    let app = routes::api::create_api_router().with_state(app_state);

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::OK);
}

/// Test that the full HTTP surface is routed after startup
#[tokio::test]
async fn test_full_api_routes_available() {
    let port = find_available_port();
    let app_state = AppState::new(create_minimal_config(port)).unwrap();

    let app: Router = routes::api::create_api_router()
        .merge(routes::relay::create_relay_router())
        .with_state(app_state);

    for (method, uri) in [
        ("GET", "/"),
        ("GET", "/assistants"),
        ("GET", "/assistant?name=banking"),
        ("POST", "/twiml?assistant=banking"),
    ] {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(
            response.status(),
            axum::http::StatusCode::OK,
            "{method} {uri}"
        );
    }
}

/// Test that connection limits are applied correctly
#[tokio::test]
async fn test_connection_limit_configurations() {
    let port = find_available_port();

    let mut config = create_minimal_config(port);
    config.max_websocket_connections = Some(100);
    config.max_connections_per_ip = 10;
    let app_state = AppState::new(config).unwrap();
    assert_eq!(app_state.config.max_websocket_connections, Some(100));
    assert_eq!(app_state.config.max_connections_per_ip, 10);

    let mut config2 = create_minimal_config(port + 1);
    config2.max_websocket_connections = None;
    let app_state2 = AppState::new(config2).unwrap();
    assert!(app_state2.config.max_websocket_connections.is_none());
}

/// Test that session settings reach the shared session services
#[tokio::test]
async fn test_session_settings_applied() {
    let mut config = create_minimal_config(find_available_port());
    config.silence_threshold_seconds = 9;
    config.silence_max_retries = 1;
    config.silence_reminder_text = "Hello?".to_string();

    let app_state = AppState::new(config).unwrap();

    assert_eq!(app_state.services.silence.threshold, Duration::from_secs(9));
    assert_eq!(app_state.services.silence.max_retries, 1);
    assert_eq!(app_state.services.silence.reminder_text, "Hello?");
    assert!(
        app_state
            .services
            .assistants
            .get_assistant("banking")
            .await
            .is_some()
    );
}

/// Test that an invalid webhook URL stops startup
#[tokio::test]
async fn test_invalid_webhook_rejected() {
    let mut config = create_minimal_config(find_available_port());
    config.tool_webhook_url = Some("not a url".to_string());

    assert!(AppState::new(config).is_err());
}

/// Test that the server correctly parses addresses
#[tokio::test]
async fn test_address_parsing() {
    let port = find_available_port();
    let config = create_minimal_config(port);

    let address = config.address();
    assert!(address.contains("127.0.0.1"));
    assert!(address.contains(&port.to_string()));
    assert!(address.parse::<SocketAddr>().is_ok());
}

/// Test that multiple AppState instances can be created concurrently
#[tokio::test]
async fn test_concurrent_app_state_creation() {
    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let port = find_available_port();
            tokio::spawn(async move {
                let config = create_minimal_config(port);
                AppState::new(config).is_ok()
            })
        })
        .collect();

    for task in tasks {
        let created = timeout(Duration::from_secs(5), task)
            .await
            .expect("Task should finish")
            .expect("Task should complete successfully");
        assert!(created);
    }
}

/// Test that the relay route exists and a failed upgrade gives its slot back
#[tokio::test]
async fn test_relay_route_setup() {
    let port = find_available_port();
    let app_state = AppState::new(create_minimal_config(port)).unwrap();

    let relay_routes = routes::relay::create_relay_router()
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            connection_limit_middleware,
        ))
        .with_state(app_state.clone())
        .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));

    // Not a real connection, so the upgrade cannot complete
    let request = Request::builder()
        .uri("/conversation-relay")
        .header("upgrade", "websocket")
        .header("connection", "upgrade")
        .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
        .header("sec-websocket-version", "13")
        .body(Body::empty())
        .unwrap();

    let response = relay_routes.oneshot(request).await.unwrap();

    assert_ne!(response.status(), axum::http::StatusCode::NOT_FOUND);
    assert_eq!(app_state.ws_connection_count(), 0);
}
