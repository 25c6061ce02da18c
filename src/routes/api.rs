use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, assistants, twiml};
use crate::state::AppState;
use std::sync::Arc;

/// Create the HTTP API router
///
/// # Endpoints
///
/// - `GET /` - Health check
/// - `GET /assistants` - Configured assistants
/// - `GET /assistant?name=<name>` - One assistant, 404 when unknown
/// - `POST /twiml?assistant=<name>` - Call-initiation TwiML
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api::health_check))
        .route("/assistants", get(assistants::list_assistants))
        .route("/assistant", get(assistants::get_assistant))
        .route("/twiml", post(twiml::twiml_handler))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::core::assistant::Assistant;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        let mut config = ServerConfig::default();
        config.server_domain = Some("relay.example.com".to_string());
        let mut banking = Assistant::new("banking", "Welcome to the bank");
        banking.tts_provider = Some("ElevenLabs".to_string());
        config.assistants = vec![banking, Assistant::new("pizza", "Pizza palace")];

        let state = AppState::new(config).unwrap();
        create_api_router().with_state(state)
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["status"], "OK");
    }

    #[tokio::test]
    async fn test_list_assistants() {
        let request = Request::builder()
            .uri("/assistants")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
        let names: Vec<_> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["banking", "pizza"]);
    }

    #[tokio::test]
    async fn test_get_assistant() {
        let request = Request::builder()
            .uri("/assistant?name=pizza")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["initial_message"], "Pizza palace");
    }

    #[tokio::test]
    async fn test_get_assistant_not_found() {
        for uri in ["/assistant?name=nobody", "/assistant"] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let response = app().oneshot(request).await.unwrap();

            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
            assert_eq!(json["message"], "Assistant not found");
        }
    }

    #[tokio::test]
    async fn test_twiml() {
        let request = Request::builder()
            .method("POST")
            .uri("/twiml?assistant=banking")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/xml"
        );
        let xml = body_string(response).await;
        assert!(xml.contains("wss://relay.example.com/conversation-relay"));
        assert!(xml.contains(r#"ttsProvider="ElevenLabs""#));
        assert!(xml.contains(r#"<Parameter name="assistant" value="banking" />"#));
    }

    #[tokio::test]
    async fn test_twiml_unknown_assistant() {
        let request = Request::builder()
            .method("POST")
            .uri("/twiml?assistant=nobody")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
