use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::models::integration::IntegrationProvider;
use crate::responses::JsonResponse;
use crate::services::oauth::integration_service::FlowError;
use crate::session::AuthSession;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

fn session_user_id(session: &AuthSession) -> Result<Uuid, Response> {
    Uuid::parse_str(&session.0.id)
        .map_err(|_| JsonResponse::unauthorized("Invalid session").into_response())
}

fn parse_provider(provider: &str) -> Result<IntegrationProvider, Response> {
    IntegrationProvider::parse(provider)
        .ok_or_else(|| JsonResponse::not_found("Unknown provider").into_response())
}

fn redirect_success(frontend: &str, provider: IntegrationProvider) -> Response {
    Redirect::to(&format!(
        "{frontend}/dashboard?integration_success={provider}"
    ))
    .into_response()
}

fn redirect_error(frontend: &str, reason: &str) -> Response {
    Redirect::to(&format!(
        "{frontend}/dashboard?integration_error={}",
        urlencoding::encode(reason)
    ))
    .into_response()
}

// GET /api/integrations
pub async fn list_integrations(
    session: AuthSession,
    State(state): State<AppState>,
) -> Response {
    let user_id = match session_user_id(&session) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.integrations.connected_providers(user_id).await {
        Ok(providers) => Json(serde_json::json!({
            "success": true,
            "providers": providers,
        }))
        .into_response(),
        Err(err) => {
            error!(%user_id, ?err, "failed to list integrations");
            JsonResponse::server_error("Failed to list integrations").into_response()
        }
    }
}

// GET /api/integrations/{provider}/status
pub async fn integration_status(
    session: AuthSession,
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Response {
    let user_id = match session_user_id(&session) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let provider = match parse_provider(&provider) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match state.integrations.is_connected(user_id, provider).await {
        Ok(connected) => Json(serde_json::json!({ "connected": connected })).into_response(),
        Err(err) => {
            error!(%user_id, %provider, ?err, "failed to check integration status");
            JsonResponse::server_error("Failed to check status").into_response()
        }
    }
}

// GET /api/integrations/{provider}/authorize
pub async fn authorize_integration(
    session: AuthSession,
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Response {
    let user_id = match session_user_id(&session) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let provider = match parse_provider(&provider) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match state.integrations.begin(user_id, provider) {
        Ok(auth_url) => Json(serde_json::json!({ "authUrl": auth_url })).into_response(),
        Err(err) => {
            error!(%user_id, %provider, ?err, "failed to build authorization url");
            JsonResponse::server_error("Failed to start authorization").into_response()
        }
    }
}

// GET /api/integrations/{provider}/callback
//
// The browser lands here from the provider, so every failure becomes a
// redirect the frontend can render, never a raw error status.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let frontend = state.config.frontend_origin.clone();

    let Some(provider) = IntegrationProvider::parse(&provider) else {
        return redirect_error(&frontend, "unknown_provider");
    };

    if let Some(error) = query.error {
        warn!(%provider, %error, description = ?query.error_description, "provider denied authorization");
        return redirect_error(&frontend, &error);
    }

    let (Some(code), Some(callback_state)) = (query.code, query.state) else {
        return redirect_error(&frontend, "missing_code_or_state");
    };

    match state
        .integrations
        .complete(provider, &code, &callback_state)
        .await
    {
        Ok(record) => redirect_success(&frontend, record.provider),
        Err(err) => {
            warn!(%provider, ?err, "authorization callback failed");
            let reason = match err {
                FlowError::InvalidState(_) => "invalid_state",
                FlowError::ProviderMismatch => "provider_mismatch",
                FlowError::Exchange(_) => "exchange_failed",
                FlowError::BadAuthorizationEndpoint(_) | FlowError::Database(_) => "server_error",
            };
            redirect_error(&frontend, reason)
        }
    }
}

// DELETE /api/integrations/{provider}
pub async fn disconnect_integration(
    session: AuthSession,
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Response {
    let user_id = match session_user_id(&session) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let provider = match parse_provider(&provider) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match state.integrations.disconnect(user_id, provider).await {
        Ok(true) => JsonResponse::success("Integration disconnected").into_response(),
        Ok(false) => JsonResponse::not_found("Integration not connected").into_response(),
        Err(err) => {
            error!(%user_id, %provider, ?err, "failed to disconnect integration");
            JsonResponse::server_error("Failed to disconnect").into_response()
        }
    }
}
