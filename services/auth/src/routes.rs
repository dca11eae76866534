//! Authentication service routes

use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, instrument, warn};

use crate::{
    otp::OtpError,
    password::hash_password,
    state::AppState,
    validation::{normalize_email, validate_email, validate_name, validate_password},
};

/// Request for account registration
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Request for code verification
#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

/// Request for a new code
#[derive(Deserialize)]
pub struct ResendOtpRequest {
    pub email: String,
}

/// Body of every response from the auth endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let auth = Router::new()
        .route("/register", post(register))
        .route("/verify-otp", post(verify_otp))
        .route("/resend-otp", post(resend_otp));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
                })
                .on_response(
                    |res: &Response, latency: std::time::Duration, _span: &tracing::Span| {
                        let status = res.status();
                        if status.is_server_error() {
                            error!(%status, ?latency, "response");
                        } else {
                            info!(%status, ?latency, "response");
                        }
                    },
                ),
        )
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "auth-service"
    }))
}

/// Register a user and mail the first verification code
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let name = payload.name.trim().to_string();
    let email = normalize_email(&payload.email);

    validate_name(&name).map_err(AuthError::Validation)?;
    validate_email(&email).map_err(AuthError::Validation)?;
    validate_password(&payload.password).map_err(AuthError::Validation)?;

    if state
        .users
        .find_by_email(&email)
        .await
        .context("look up existing user")?
        .is_some()
    {
        warn!(email = %email, "registration for taken email");
        return Err(AuthError::EmailTaken);
    }

    let password_hash = hash_password(&payload.password)?;
    state.otp.register(name, email, password_hash).await?;

    Ok(MessageResponse::new("OTP sent to your email. Please verify."))
}

/// Check a submitted code and mark the account verified
#[instrument(skip_all)]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let email = normalize_email(&payload.email);

    if !state.verify_limiter.is_allowed(&email).await {
        warn!(email = %email, "verification attempts throttled");
        return Err(AuthError::TooManyRequests(
            "Too many attempts. Please try again later.",
        ));
    }

    state.otp.validate(&email, payload.otp.trim()).await?;
    state.verify_limiter.reset(&email).await;

    Ok(MessageResponse::new("Email verified successfully!"))
}

/// Replace the outstanding code and mail the new one
#[instrument(skip_all)]
pub async fn resend_otp(
    State(state): State<AppState>,
    Json(payload): Json<ResendOtpRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let email = normalize_email(&payload.email);

    let user = state.otp.pending_user(&email).await?;

    if !state
        .resend_cooldown
        .begin(&email)
        .await
        .context("start resend cooldown")?
    {
        warn!(email = %email, "resend requested during cooldown");
        return Err(AuthError::TooManyRequests(
            "Please wait before requesting a new code.",
        ));
    }

    if let Err(err) = state.otp.reissue(&user).await {
        if let Err(release_err) = state.resend_cooldown.release(&email).await {
            warn!(error = %release_err, "failed to release resend cooldown");
        }
        return Err(err.into());
    }

    Ok(MessageResponse::new("A new OTP has been sent to your email."))
}

/// Custom error type for authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Email already used")]
    EmailTaken,

    #[error("{0}")]
    Validation(String),

    #[error("Invalid or expired OTP")]
    InvalidOrExpiredOtp,

    #[error("User not found.")]
    UserNotFound,

    #[error("User already verified.")]
    AlreadyVerified,

    #[error("{0}")]
    TooManyRequests(&'static str),

    #[error("Server error")]
    Internal(#[from] anyhow::Error),
}

impl From<OtpError> for AuthError {
    fn from(err: OtpError) -> Self {
        match err {
            OtpError::InvalidOrExpired => AuthError::InvalidOrExpiredOtp,
            OtpError::UserNotFound => AuthError::UserNotFound,
            OtpError::AlreadyVerified => AuthError::AlreadyVerified,
            OtpError::EmailTaken => AuthError::EmailTaken,
            other @ (OtpError::Database(_) | OtpError::Mail(_)) => {
                AuthError::Internal(anyhow::Error::new(other))
            }
        }
    }
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::EmailTaken
            | AuthError::Validation(_)
            | AuthError::InvalidOrExpiredOtp
            | AuthError::UserNotFound
            | AuthError::AlreadyVerified => StatusCode::BAD_REQUEST,
            AuthError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let AuthError::Internal(err) = &self {
            error!(error = ?err, "request failed");
        }

        let body = Json(MessageResponse {
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}
