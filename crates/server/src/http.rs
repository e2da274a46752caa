use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use pillar_db::DbPool;
use pillar_integrations::DocumentService;

const CONNECTED_PAGE: &str = r#"<html>
<head><title>Success</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Google Account Connected!</h1>
    <p>You can close this window and return to Slack.</p>
    <p>Try running <code>/pillar agenda finalize</code> again.</p>
</body>
</html>"#;

const FAILED_PAGE: &str = r#"<html>
<head><title>Error</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Connection Failed</h1>
    <p>There was an error connecting your Google account.</p>
    <p>Please try again from Slack.</p>
</body>
</html>"#;

#[derive(Clone)]
pub struct HttpState {
    db_pool: DbPool,
    documents: Option<Arc<dyn DocumentService>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub checked_at: String,
}

/// `state` carries the Slack user id that started the consent flow.
#[derive(Debug, Default, Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
}

pub fn router(db_pool: DbPool, documents: Option<Arc<dyn DocumentService>>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/oauth/callback", get(oauth_callback))
        .fallback(not_found)
        .with_state(HttpState { db_pool, documents })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    db_pool: DbPool,
    documents: Option<Arc<dyn DocumentService>>,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.http.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "http endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(db_pool, documents)).await {
            error!(
                event_name = "system.http.error",
                correlation_id = "bootstrap",
                error = %error,
                "http endpoint terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HttpState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck { status: "ready", detail: "pillar-server running".to_string() },
        database,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

pub async fn oauth_callback(
    State(state): State<HttpState>,
    Query(params): Query<OAuthCallback>,
) -> Response {
    let (Some(code), Some(user_id)) = (
        params.code.filter(|code| !code.is_empty()),
        params.state.filter(|state| !state.is_empty()),
    ) else {
        return (StatusCode::BAD_REQUEST, "Missing code or state parameter").into_response();
    };

    let Some(documents) = state.documents else {
        warn!(event_name = "oauth.callback.unconfigured", user_id = %user_id, "google is not configured");
        return (StatusCode::INTERNAL_SERVER_ERROR, Html(FAILED_PAGE)).into_response();
    };

    match documents.exchange_code(&user_id, &code).await {
        Ok(()) => {
            info!(event_name = "oauth.callback.connected", user_id = %user_id, "google account connected");
            (StatusCode::OK, Html(CONNECTED_PAGE)).into_response()
        }
        Err(error) => {
            warn!(
                event_name = "oauth.callback.failed",
                user_id = %user_id,
                error = %error,
                "google code exchange failed"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, Html(FAILED_PAGE)).into_response()
        }
    }
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use pillar_db::connect_with_settings;
    use pillar_integrations::{CreatedDocument, DocumentService, IntegrationError};

    use super::router;

    #[derive(Default)]
    struct RecordingDocs {
        reject: bool,
        exchanged: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl DocumentService for RecordingDocs {
        fn authorization_url(&self, user_id: &str) -> String {
            format!("https://accounts.test/auth?state={user_id}")
        }

        async fn is_authenticated(&self, _user_id: &str) -> Result<bool, IntegrationError> {
            Ok(false)
        }

        async fn exchange_code(&self, user_id: &str, code: &str) -> Result<(), IntegrationError> {
            if self.reject {
                return Err(IntegrationError::Status {
                    service: "google",
                    status: 400,
                    body: "invalid_grant".to_string(),
                });
            }
            self.exchanged.lock().expect("lock").push((user_id.to_string(), code.to_string()));
            Ok(())
        }

        async fn create_document(
            &self,
            _user_id: &str,
            _title: &str,
            _content: &str,
        ) -> Result<CreatedDocument, IntegrationError> {
            Err(IntegrationError::NotConfigured { service: "google" })
        }
    }

    async fn get(
        docs: Option<Arc<RecordingDocs>>,
        uri: &str,
    ) -> (StatusCode, String) {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        let documents = docs.map(|docs| docs as Arc<dyn DocumentService>);
        let response = router(pool, documents)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn health_reports_ready_database() {
        let (status, body) = get(None, "/health").await;

        assert_eq!(status, StatusCode::OK);
        let payload: serde_json::Value = serde_json::from_str(&body).expect("json");
        assert_eq!(payload["status"], "ready");
        assert_eq!(payload["database"]["status"], "ready");
    }

    #[tokio::test]
    async fn callback_exchanges_the_code_for_the_user_in_state() {
        let docs = Arc::new(RecordingDocs::default());

        let (status, body) = get(Some(docs.clone()), "/oauth/callback?code=abc&state=U123").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Google Account Connected!"));
        assert_eq!(
            docs.exchanged.lock().expect("lock").clone(),
            vec![("U123".to_string(), "abc".to_string())]
        );
    }

    #[tokio::test]
    async fn callback_without_parameters_is_a_bad_request() {
        let (status, body) = get(Some(Arc::new(RecordingDocs::default())), "/oauth/callback?code=abc").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Missing code or state parameter");
    }

    #[tokio::test]
    async fn failed_exchange_renders_the_error_page() {
        let docs = Arc::new(RecordingDocs { reject: true, ..RecordingDocs::default() });

        let (status, body) = get(Some(docs), "/oauth/callback?code=abc&state=U1").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("Connection Failed"));
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let (status, body) = get(None, "/favicon.ico").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Not found");
    }
}
