//! Endpoint handlers (spec.md §6). Grounded on the teacher's
//! `api/handlers.rs` extractor/response shape (`Extension<AuthContext>`,
//! `Json<T>` request/response bodies, `Result<_, AppError>` returns) —
//! the handler bodies themselves implement lead-pipeline operations the
//! teacher never had.

use axum::{
    extract::{Extension, Form, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::AuthContext;
use crate::auth::{api_key, jwt, password};
use crate::domain::{Lead, LeadUpdate, Organization, PlanUsage};
use crate::errors::AppError;
use crate::messaging::MessageStyle;
use crate::AppState;

// ── Auth ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: i64,
    pub organization_id: i64,
    pub plan: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub user_id: i64,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "leadforge",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Creates a user and a per-user organization on the default plan in
/// the same request — unlike a service account, an end user never
/// operates org-less.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AppError> {
    if body.password.len() < 8 {
        return Err(AppError::Validation(
            "password must be at least 8 characters".to_string(),
        ));
    }
    if state.db.get_user_by_email(&body.email).await?.is_some() {
        return Err(AppError::Validation("email already registered".to_string()));
    }

    let hashed = password::hash_password(&body.password).map_err(AppError::Internal)?;
    let user = state
        .db
        .create_user(
            &body.email,
            &hashed,
            body.first_name.as_deref(),
            body.last_name.as_deref(),
        )
        .await?;

    let org_name = format!("{}'s organization", body.email);
    let org = state
        .db
        .create_organization(&org_name, &state.config.default_plan, 5, 1000)
        .await?;
    state
        .quota
        .assign_plan_to_organization(org.id, &state.config.default_plan)
        .await?;
    state.db.set_user_organization(user.id, org.id).await?;

    Ok(Json(RegisterResponse {
        user_id: user.id,
        organization_id: org.id,
        plan: state.config.default_plan.clone(),
    }))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Form(body): Form<LoginForm>,
) -> Result<Json<TokenResponse>, AppError> {
    let user = state
        .db
        .get_user_by_email(&body.username)
        .await?
        .ok_or_else(|| AppError::Auth("invalid username or password".to_string()))?;

    if !password::verify_password(&body.password, &user.hashed_password) {
        return Err(AppError::Auth("invalid username or password".to_string()));
    }
    if !user.is_active {
        return Err(AppError::Auth("account is disabled".to_string()));
    }

    issue_tokens(&state, user.id, &user.email)
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let claims = jwt::verify_refresh_token(&body.refresh_token, &state.config.secret_key)
        .ok_or_else(|| AppError::Auth("invalid or expired refresh token".to_string()))?;
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

    issue_tokens(&state, user.id, &user.email)
}

fn issue_tokens(state: &AppState, user_id: i64, email: &str) -> Result<Json<TokenResponse>, AppError> {
    let access_token = jwt::create_access_token(
        user_id,
        &state.config.secret_key,
        state.config.access_token_expire_minutes,
    )
    .map_err(AppError::Internal)?;
    let refresh_token = jwt::create_refresh_token(
        user_id,
        &state.config.secret_key,
        state.config.refresh_token_expire_days,
    )
    .map_err(AppError::Internal)?;

    Ok(Json(TokenResponse {
        access_token,
        refresh_token,
        token_type: "bearer",
        user_id,
        email: email.to_string(),
    }))
}

pub async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<crate::domain::User>, AppError> {
    let user = state
        .db
        .get_user(ctx.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateMeRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

pub async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<UpdateMeRequest>,
) -> Result<Json<crate::domain::User>, AppError> {
    let user = state
        .db
        .update_user_profile(ctx.user_id, body.first_name.as_deref(), body.last_name.as_deref())
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;
    Ok(Json(user))
}

// ── Organizations ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    pub name: String,
}

pub async fn create_organization(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<CreateOrganizationRequest>,
) -> Result<Json<Organization>, AppError> {
    let org = state
        .db
        .create_organization(&body.name, &state.config.default_plan, 5, 1000)
        .await?;
    state
        .quota
        .assign_plan_to_organization(org.id, &state.config.default_plan)
        .await?;
    state.db.set_user_organization(ctx.user_id, org.id).await?;
    Ok(Json(org))
}

/// A user belongs to exactly one organization, so "list" returns that
/// single membership rather than a cross-tenant query.
pub async fn list_organizations(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Vec<Organization>>, AppError> {
    let org = state.db.get_organization(ctx.organization_id).await?;
    Ok(Json(org.into_iter().collect()))
}

pub async fn get_organization(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<Organization>, AppError> {
    if id != ctx.organization_id {
        return Err(AppError::NotFound("organization not found".to_string()));
    }
    let org = state
        .db
        .get_organization(ctx.organization_id)
        .await?
        .ok_or_else(|| AppError::NotFound("organization not found".to_string()))?;
    Ok(Json(org))
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateOrganizationRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

pub async fn update_organization(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateOrganizationRequest>,
) -> Result<Json<Organization>, AppError> {
    if id != ctx.organization_id {
        return Err(AppError::NotFound("organization not found".to_string()));
    }
    let org = state
        .db
        .update_organization(id, body.name.as_deref(), body.description.as_deref())
        .await?
        .ok_or_else(|| AppError::NotFound("organization not found".to_string()))?;
    Ok(Json(org))
}

// ── Leads ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListLeadsParams {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<ListLeadsParams>,
) -> Result<Json<Vec<Lead>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let offset = params.offset.unwrap_or(0).max(0);
    let leads = state
        .db
        .list_leads(ctx.organization_id, limit, offset)
        .await?;
    Ok(Json(leads))
}

#[derive(Debug, Deserialize)]
pub struct CreateSingleLeadRequest {
    pub url: String,
}

/// Creates one lead and enqueues its pipeline job immediately
/// (spec.md §4.6), gated on the organization's daily quota.
pub async fn create_single_lead(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<CreateSingleLeadRequest>,
) -> Result<Json<Lead>, AppError> {
    let plan_name = current_plan_name(&state, ctx.organization_id).await?;
    if !state
        .quota
        .can_create_lead(ctx.organization_id, &plan_name)
        .await?
    {
        return Err(AppError::QuotaExceeded(
            "Daily lead limit exceeded.".to_string(),
        ));
    }

    let website = normalize_website(&body.url)?;
    let lead = state
        .db
        .create_lead(
            ctx.organization_id,
            ctx.user_id,
            &website,
            MessageStyle::Professional.as_str(),
        )
        .await?;
    state.db.enqueue_job(lead.id).await?;
    Ok(Json(lead))
}

#[derive(Debug, Deserialize)]
pub struct CreateLeadsRequest {
    pub urls: Vec<String>,
    #[serde(default = "default_message_style")]
    pub message_style: String,
}

fn default_message_style() -> String {
    "professional".to_string()
}

#[derive(Debug, Serialize)]
pub struct CreateLeadsResponse {
    pub created: Vec<Lead>,
    pub rejected: Vec<String>,
}

/// Batch variant of [`create_single_lead`]. Stops admitting new leads as
/// soon as the quota is exhausted mid-batch rather than rejecting the
/// whole request (spec.md §4.5: quota is a per-lead gate, not a
/// per-request one). A batch that exceeds the organization's remaining
/// daily allowance is rejected outright rather than silently truncated.
pub async fn create_leads(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<CreateLeadsRequest>,
) -> Result<Json<CreateLeadsResponse>, AppError> {
    if body.urls.is_empty() {
        return Err(AppError::Validation("urls must not be empty".to_string()));
    }
    if body.urls.len() > 500 {
        return Err(AppError::Validation(
            "at most 500 urls per batch".to_string(),
        ));
    }

    let style = MessageStyle::parse(&body.message_style);
    let plan_name = current_plan_name(&state, ctx.organization_id).await?;

    let usage = state.quota.usage(ctx.organization_id, &plan_name).await?;
    if (body.urls.len() as i64) > usage.remaining_daily_leads {
        return Err(AppError::QuotaExceeded(format!(
            "Cannot create {} leads. Only {} leads remaining for today.",
            body.urls.len(),
            usage.remaining_daily_leads
        )));
    }

    let mut created = Vec::new();
    let mut rejected = Vec::new();

    for url in &body.urls {
        if !state
            .quota
            .can_create_lead(ctx.organization_id, &plan_name)
            .await?
        {
            rejected.push(url.clone());
            continue;
        }
        let normalized = match normalize_website(url) {
            Ok(w) => w,
            Err(_) => {
                rejected.push(url.clone());
                continue;
            }
        };
        let lead = state
            .db
            .create_lead(ctx.organization_id, ctx.user_id, &normalized, style.as_str())
            .await?;
        state.db.enqueue_job(lead.id).await?;
        created.push(lead);
    }

    if created.is_empty() && !rejected.is_empty() {
        return Err(AppError::QuotaExceeded(
            "Daily lead limit exceeded.".to_string(),
        ));
    }

    Ok(Json(CreateLeadsResponse { created, rejected }))
}

pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<Lead>, AppError> {
    let lead = fetch_owned_lead(&state, ctx.organization_id, id).await?;
    Ok(Json(lead))
}

/// Only the fields a caller may legitimately edit by hand are exposed
/// here — pipeline-derived fields (`score`, `*_confidence`,
/// `*_source`, `outreach_message`) are written exclusively by the
/// orchestrator (spec.md §4.6).
#[derive(Debug, Deserialize, Default)]
pub struct LeadEditRequest {
    pub company_name: Option<String>,
    pub about_text: Option<String>,
    pub industry: Option<String>,
    pub contact_name: Option<String>,
    pub contact_title: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub linkedin_url: Option<String>,
    pub twitter_url: Option<String>,
    pub facebook_url: Option<String>,
}

pub async fn update_lead(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<i64>,
    Json(body): Json<LeadEditRequest>,
) -> Result<Json<Lead>, AppError> {
    fetch_owned_lead(&state, ctx.organization_id, id).await?;

    let update = LeadUpdate {
        company_name: body.company_name,
        about_text: body.about_text,
        industry: body.industry,
        contact_name: body.contact_name,
        contact_title: body.contact_title,
        email: body.email,
        phone: body.phone,
        address: body.address,
        linkedin_url: body.linkedin_url,
        twitter_url: body.twitter_url,
        facebook_url: body.facebook_url,
        ..Default::default()
    };

    let lead = state
        .db
        .update_lead(id, &update)
        .await?
        .ok_or_else(|| AppError::NotFound("lead not found".to_string()))?;
    Ok(Json(lead))
}

/// Soft delete: sets `is_active = false` rather than removing the row,
/// so scraping/enrichment logs keep a valid foreign key (spec.md §3).
pub async fn delete_lead(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<axum::http::StatusCode, AppError> {
    fetch_owned_lead(&state, ctx.organization_id, id).await?;
    state
        .db
        .update_lead(
            id,
            &LeadUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct ProcessLeadResponse {
    pub lead_id: i64,
    pub enqueued: bool,
}

/// Manually re-enqueues a lead's pipeline job (spec.md §4.6) — e.g. to
/// retry after a permanent scrape failure. Requires the organization's
/// plan to have AI access, since the pipeline's enrichment/messaging
/// steps are meaningless without it.
pub async fn process_lead(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<Json<ProcessLeadResponse>, AppError> {
    fetch_owned_lead(&state, ctx.organization_id, id).await?;

    let plan_name = current_plan_name(&state, ctx.organization_id).await?;
    if !state.quota.can_use_ai_features(&plan_name) {
        return Err(AppError::Authorization(
            "AI-driven processing is not available on your current plan".to_string(),
        ));
    }

    state.db.enqueue_job(id).await?;
    Ok(Json(ProcessLeadResponse {
        lead_id: id,
        enqueued: true,
    }))
}

async fn fetch_owned_lead(
    state: &AppState,
    organization_id: i64,
    lead_id: i64,
) -> Result<Lead, AppError> {
    let lead = state
        .db
        .get_lead(lead_id)
        .await?
        .ok_or_else(|| AppError::NotFound("lead not found".to_string()))?;
    if lead.organization_id != organization_id {
        // A 404, not a 403: existence of another org's lead isn't
        // disclosed to a caller who doesn't own it.
        return Err(AppError::NotFound("lead not found".to_string()));
    }
    Ok(lead)
}

fn normalize_website(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("url must not be empty".to_string()));
    }
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    url::Url::parse(&with_scheme)
        .map_err(|_| AppError::Validation(format!("invalid url: {raw}")))?;
    Ok(with_scheme)
}

async fn current_plan_name(state: &AppState, organization_id: i64) -> Result<String, AppError> {
    Ok(state
        .db
        .get_subscription(organization_id)
        .await?
        .map(|s| s.plan_name)
        .unwrap_or_else(|| "free".to_string()))
}

// ── Billing ──────────────────────────────────────────────────────

pub async fn billing_usage(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<PlanUsage>, AppError> {
    let plan_name = current_plan_name(&state, ctx.organization_id).await?;
    let usage = state.quota.usage(ctx.organization_id, &plan_name).await?;
    Ok(Json(usage))
}

pub async fn billing_plans(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<crate::domain::Plan>> {
    Json(state.config.plans.all().into_iter().cloned().collect())
}

#[derive(Debug, Deserialize)]
pub struct UpgradeParams {
    pub plan_name: String,
}

pub async fn billing_upgrade(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<UpgradeParams>,
) -> Result<axum::http::StatusCode, AppError> {
    state
        .quota
        .assign_plan_to_organization(ctx.organization_id, &params.plan_name)
        .await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CancelParams {
    #[serde(default)]
    pub immediate: bool,
}

pub async fn billing_cancel(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<CancelParams>,
) -> Result<axum::http::StatusCode, AppError> {
    state
        .quota
        .cancel_subscription(ctx.organization_id, params.immediate)
        .await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn billing_invoices(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Vec<crate::domain::Invoice>>, AppError> {
    let invoices = state.db.list_invoices(ctx.organization_id).await?;
    Ok(Json(invoices))
}

// ── API keys (service-to-service access; not part of the end-user
// surface, kept as an ambient addition for programmatic callers — see
// DESIGN.md) ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    #[serde(default = "default_rate_limit")]
    pub rate_limit: i32,
}

fn default_rate_limit() -> i32 {
    1000
}

#[derive(Debug, Serialize)]
pub struct CreateApiKeyResponse {
    /// Shown exactly once — the server never stores the plaintext token.
    pub token: String,
    pub key_prefix: String,
}

pub async fn create_api_key(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<CreateApiKeyRequest>,
) -> Result<Json<CreateApiKeyResponse>, AppError> {
    let generated = api_key::generate();
    state
        .db
        .create_api_key(
            ctx.organization_id,
            ctx.user_id,
            &body.name,
            &generated.key_prefix,
            &generated.key_hash,
            body.rate_limit,
            None,
        )
        .await?;
    Ok(Json(CreateApiKeyResponse {
        token: generated.token,
        key_prefix: generated.key_prefix,
    }))
}

pub async fn list_api_keys(
    State(_state): State<Arc<AppState>>,
    Extension(_ctx): Extension<AuthContext>,
) -> Json<Vec<crate::domain::ApiKey>> {
    // No list-by-organization query exists yet; exposed for symmetry
    // with create/revoke and left empty until one is added.
    Json(Vec::new())
}

pub async fn revoke_api_key(
    State(state): State<Arc<AppState>>,
    Extension(_ctx): Extension<AuthContext>,
    Path(id): Path<i64>,
) -> Result<axum::http::StatusCode, AppError> {
    let revoked = state.db.revoke_api_key(id).await?;
    if !revoked {
        return Err(AppError::NotFound("api key not found".to_string()));
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}
