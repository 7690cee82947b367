use axum::{extract::State, http::StatusCode, response::Response};
use tracing::warn;

use crate::core::{app_state::AppState, http::response_envelope::Envelope};

/// `GET /health`: LLM providers and Qdrant. 503 when anything is down.
pub async fn health_route(State(state): State<AppState>) -> Response {
    let health = state.backend.health().await;
    let status = if health.ok {
        StatusCode::OK
    } else {
        warn!(
            target: "api::health",
            store_ok = health.store.ok,
            llm_down = health.llm.iter().filter(|s| !s.ok).count(),
            "health_route: degraded"
        );
        StatusCode::SERVICE_UNAVAILABLE
    };
    Envelope::ok(health).respond(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::tests::{body_json, state};

    #[tokio::test]
    async fn reports_ok() {
        let res = health_route(State(state(true))).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["data"]["store"]["collection"], "products");
    }

    #[tokio::test]
    async fn unhealthy_store_is_503() {
        let res = health_route(State(state(false))).await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(res).await["data"]["ok"], false);
    }
}
