//! HTTP front-end for starting and managing sessions

use std::net::SocketAddr;

use axum::{
    async_trait,
    extract::{FromRequest, Path, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Form, Json, Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::ChronicleError;
use crate::session::SessionManager;
use crate::types::SessionRequest;

/// HTTP server bound to one session manager
pub struct ChronicleServer {
    manager: SessionManager,
    addr: SocketAddr,
}

impl ChronicleServer {
    pub fn new(manager: SessionManager, port: u16) -> Self {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        Self { manager, addr }
    }

    /// Build the router
    pub fn router(manager: SessionManager) -> Router {
        Router::new()
            .route("/start", post(start_handler))
            .route("/sessions", get(list_handler))
            .route("/sessions/:id", delete(stop_handler))
            .route("/health", get(health_handler))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive()),
            )
            .with_state(manager)
    }

    /// Serve until the shutdown future resolves, then stop every session
    pub async fn serve<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = Self::router(self.manager.clone());

        tracing::info!("Chronicle server listening on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        self.manager.stop_all().await;
        Ok(())
    }
}

/// Error body with a status derived from the error kind
pub struct ApiError(ChronicleError);

impl From<ChronicleError> for ApiError {
    fn from(e: ChronicleError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ChronicleError::InvalidInput(_) | ChronicleError::DirectoryNotFound(_) => {
                StatusCode::BAD_REQUEST
            }
            ChronicleError::RepoNotFound(_) | ChronicleError::SessionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::debug!("Request rejected: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Session start body, accepted as JSON or as an HTML form
pub struct StartBody(pub SessionRequest);

#[async_trait]
impl<S> FromRequest<S> for StartBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false);

        if is_json {
            let Json(body) = Json::<SessionRequest>::from_request(req, state)
                .await
                .map_err(|e| ChronicleError::InvalidInput(e.body_text()))?;
            Ok(Self(body))
        } else {
            let Form(body) = Form::<SessionRequest>::from_request(req, state)
                .await
                .map_err(|e| ChronicleError::InvalidInput(e.body_text()))?;
            Ok(Self(body))
        }
    }
}

async fn start_handler(
    State(manager): State<SessionManager>,
    StartBody(request): StartBody,
) -> Result<impl IntoResponse, ApiError> {
    let session = manager.start(&request).await?;
    let message = format!(
        "Monitoring {} and syncing with {}",
        session.root().display(),
        session.repo_id()
    );

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": message,
            "session": session.info(),
            "import": session.import_report(),
        })),
    ))
}

async fn list_handler(State(manager): State<SessionManager>) -> impl IntoResponse {
    Json(manager.list())
}

async fn stop_handler(
    State(manager): State<SessionManager>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let report = manager.stop(&id).await?;
    Ok(Json(json!({ "stopped": id, "final_pass": report })))
}

async fn health_handler(State(manager): State<SessionManager>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "sessions": manager.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let status = |e: ChronicleError| ApiError(e).status();
        assert_eq!(status(ChronicleError::InvalidInput("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(ChronicleError::DirectoryNotFound("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(ChronicleError::RepoNotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(ChronicleError::SessionNotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(ChronicleError::Remote("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
