//! HTTP API (spec.md §6): JWT-secured JSON surface over the lead
//! pipeline. Grounded on the teacher's `middleware/auth.rs` bearer
//! extraction shape, simplified from its API-key/OIDC/RBAC union down to
//! a single JWT path (the source has no API-key concept for end users,
//! only service accounts, which this crate doesn't carry forward).

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::jwt;
use crate::errors::AppError;
use crate::AppState;

pub mod handlers;

/// Identity of the caller, attached to request extensions by
/// [`auth_middleware`] and extracted by handlers via `Extension<AuthContext>`.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user_id: i64,
    pub organization_id: i64,
}

/// Validates the `Authorization: Bearer <jwt>` header, loads the user,
/// and rejects disabled accounts or users with no organization yet
/// (spec.md §6: every authenticated route except `/auth/*` assumes both).
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Auth("missing bearer token".to_string()))?;

    let claims = jwt::verify_access_token(token, &state.config.secret_key)
        .ok_or_else(|| AppError::Auth("invalid or expired token".to_string()))?;

    let user_id: i64 = claims
        .sub
        .parse()
        .map_err(|_| AppError::Auth("malformed token subject".to_string()))?;

    let user = state
        .db
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::Auth("user no longer exists".to_string()))?;

    if !user.is_active {
        return Err(AppError::Auth("account is disabled".to_string()));
    }

    let organization_id = user
        .organization_id
        .ok_or_else(|| AppError::Authorization("account has no organization".to_string()))?;

    req.extensions_mut().insert(AuthContext {
        user_id,
        organization_id,
    });

    Ok(next.run(req).await)
}

/// Builds the full router: public auth routes unguarded, everything
/// else behind [`auth_middleware`].
pub fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public = Router::new()
        .route("/health", get(handlers::health))
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/refresh", post(handlers::refresh));

    let protected = Router::new()
        .route("/me", get(handlers::get_me).put(handlers::update_me))
        .route("/leads", get(handlers::list_leads).post(handlers::create_leads))
        .route("/leads/single", post(handlers::create_single_lead))
        .route(
            "/leads/:id",
            get(handlers::get_lead)
                .put(handlers::update_lead)
                .delete(handlers::delete_lead),
        )
        .route("/leads/:id/process", post(handlers::process_lead))
        .route(
            "/organizations",
            get(handlers::list_organizations).post(handlers::create_organization),
        )
        .route(
            "/organizations/:id",
            get(handlers::get_organization).put(handlers::update_organization),
        )
        .route("/billing/usage", get(handlers::billing_usage))
        .route("/billing/plans", get(handlers::billing_plans))
        .route("/billing/upgrade", post(handlers::billing_upgrade))
        .route("/billing/cancel", post(handlers::billing_cancel))
        .route("/billing/invoices", get(handlers::billing_invoices))
        .route(
            "/auth/keys",
            get(handlers::list_api_keys).post(handlers::create_api_key),
        )
        .route("/auth/keys/:id", axum::routing::delete(handlers::revoke_api_key))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    public
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .fallback(fallback_404)
}

async fn fallback_404() -> axum::http::StatusCode {
    axum::http::StatusCode::NOT_FOUND
}
