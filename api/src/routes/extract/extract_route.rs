use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use filter_agent::ExtractionError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    core::{app_state::AppState, http::response_envelope::Envelope},
    error_handler::{AppError, AppResult},
    middleware_layer::request_id::incoming_request_id,
    routes::{
        extract::extract_request::{ExtractRequest, ExtractResponse},
        with_deadline,
    },
};

/// `POST /extract`: the Filter Schema the agent derives from a query.
///
/// When both providers fail the pass-through schema is returned with
/// `degraded: true`, mirroring what `/search` would run.
pub async fn extract_route(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(p) = payload?;
    let request_id = incoming_request_id(&headers).unwrap_or_else(|| "-".into());

    if p.query.trim().is_empty() {
        return Err(AppError::BadRequest("query must not be empty".into()));
    }
    debug!(target: "api::extract", request_id = %request_id, query = %p.query, "extract_route: start");

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let outcome = with_deadline(&state, &cancel, async {
        Ok::<_, AppError>(state.backend.extract(&p.query, &cancel).await)
    })
    .await?;

    let body = match outcome {
        Ok(e) => ExtractResponse {
            query: p.query,
            schema: e.schema,
            slot: Some(e.slot),
            degraded: false,
            low_confidence: e.low_confidence,
            dropped_values: e.dropped,
            error: None,
        },
        Err(err @ ExtractionError::Unavailable { .. }) => {
            warn!(target: "api::extract", request_id = %request_id, error = %err, "extract_route: degraded");
            ExtractResponse {
                schema: err.degraded_schema().cloned().unwrap_or_default(),
                error: Some(err.to_string()),
                query: p.query,
                slot: None,
                degraded: true,
                low_confidence: false,
                dropped_values: vec![],
            }
        }
        Err(err) => return Err(err.into()),
    };

    Ok(Envelope::ok(body).request_id(&request_id).respond(StatusCode::OK))
}
