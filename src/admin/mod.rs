//! Operator HTTP API.
//!
//! # Data Flow
//! ```text
//! Admin request:
//!     → TraceLayer
//!     → security::rate_limit (per client IP)
//!     → auth.rs (bearer token)
//!     → handlers.rs → ControlPlane
//! ```

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::config::AdminConfig;
use crate::plane::ControlPlane;
use crate::security::rate_limit::{rate_limit_middleware, RateLimitState};
use crate::security::{RateLimitError, RateLimitPolicy};

#[derive(Clone)]
pub struct AdminState {
    pub plane: Arc<ControlPlane>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(
    plane: Arc<ControlPlane>,
    config: &AdminConfig,
) -> Result<Router, RateLimitError> {
    let rate_limit = RateLimitState {
        limiter: plane.limiter.clone(),
        policy: RateLimitPolicy::per_seconds(
            config.rate_limit_max_requests,
            config.rate_limit_window_secs,
        )?,
    };
    let state = AdminState {
        plane,
        api_key: Arc::from(config.api_key.as_str()),
    };

    Ok(Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/breakers", get(list_breakers))
        .route("/admin/breakers/{name}", get(get_breaker))
        .route("/admin/breakers/{name}/reset", post(reset_breaker))
        .route("/admin/deployments", get(list_deployments).post(create_deployment))
        .route("/admin/deployments/{id}", get(get_deployment))
        .route("/admin/deployments/{id}/active", get(get_active_region))
        .route("/admin/deployments/{id}/health", post(check_health))
        .route("/admin/deployments/{id}/failover", post(failover))
        .route("/admin/deployments/{id}/regions/{region}", post(update_region))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(middleware::from_fn_with_state(rate_limit, rate_limit_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
