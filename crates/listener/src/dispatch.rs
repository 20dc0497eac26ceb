//! The webhook request handler.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use tracing::{error, warn};
use trigger::{
    ClaimedDigest, HookConfig, SignatureError, SignatureVerifier, UpdateTrigger, SIGNATURE_HEADER,
};

/// Everything the handler reads per request.
#[derive(Clone)]
pub struct DispatchState {
    config: Arc<HookConfig>,
    verifier: Arc<SignatureVerifier>,
    trigger: Arc<dyn UpdateTrigger>,
}

impl DispatchState {
    /// Creates the handler state. The verifier is keyed with the
    /// configuration's secret.
    pub fn new(config: Arc<HookConfig>, trigger: Arc<dyn UpdateTrigger>) -> Self {
        let verifier = Arc::new(SignatureVerifier::new(config.secret.clone()));
        Self {
            config,
            verifier,
            trigger,
        }
    }
}

impl std::fmt::Debug for DispatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builds the router. Every method and path reaches [`dispatch`], which owns
/// the method and prefix decision.
pub fn router(state: DispatchState) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

/// Validates one notification and fires the update trigger when it is
/// authentic. The response never waits for the update.
pub async fn dispatch(
    State(state): State<DispatchState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> StatusCode {
    let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    if method != Method::POST || !state.config.route_prefix.matches(target) {
        warn!(%method, %uri, "Bad Request");
        return StatusCode::BAD_REQUEST;
    }

    let claimed = match headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(SignatureError::MalformedHeader)
        .and_then(ClaimedDigest::parse)
    {
        Ok(claimed) => claimed,
        Err(e) => {
            warn!("{e}");
            return StatusCode::BAD_REQUEST;
        }
    };

    // A body that cannot be read is logged without an explicit status; the
    // sender sees the default 200.
    let body = match to_bytes(body, state.config.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "failed to read request body");
            return StatusCode::OK;
        }
    };

    if let Err(e) = state.verifier.verify(&body, &claimed) {
        warn!("{e}");
        return StatusCode::BAD_REQUEST;
    }

    state.trigger.fire();
    StatusCode::OK
}
