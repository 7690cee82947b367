use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use search_pipeline::SearchOptions;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    core::{app_state::AppState, http::response_envelope::Envelope},
    error_handler::{AppError, AppResult},
    middleware_layer::request_id::incoming_request_id,
    routes::{search::search_request::SearchRequest, with_deadline},
};

/// `POST /search`: ranked items plus extraction and assembly diagnostics.
pub async fn search_route(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(p) = payload?;
    let request_id = incoming_request_id(&headers).unwrap_or_else(|| "-".into());

    if p.query.trim().is_empty() {
        return Err(AppError::BadRequest("query must not be empty".into()));
    }

    debug!(
        target: "api::search",
        request_id = %request_id,
        query = %p.query,
        limit = ?p.limit,
        raw_filter = p.filters.is_some(),
        "search_route: start"
    );

    // Dropping the handler (client gone) cancels the upstream calls too.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let options = SearchOptions {
        limit: p.limit,
        raw_filter: p.filters,
        cancel: cancel.clone(),
    };

    match with_deadline(&state, &cancel, state.backend.search(&p.query, options)).await {
        Ok(resp) => {
            debug!(
                target: "api::search",
                request_id = %request_id,
                hits = resp.items.len(),
                latency_ms = resp.latency_ms,
                "search_route: success"
            );
            Ok(Envelope::ok(resp).request_id(&request_id).respond(StatusCode::OK))
        }
        Err(err) => {
            warn!(target: "api::search", request_id = %request_id, error = %err, "search_route: failed");
            Err(err)
        }
    }
}
