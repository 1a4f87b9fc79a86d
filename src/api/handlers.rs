//! HTTP request handlers

use super::types::{
    CreateCheckoutRequest, CreateCheckoutResponse, CreateSessionRequest, CreateSessionResponse,
    ErrorResponse, HealthResponse, LoginRequest, LoginResponse, MessageView, SendMessageRequest,
    SessionKind, SessionSnapshotResponse, SignupRequest, UserResponse,
};
use super::{AppState, SessionEntry};
use crate::assistant::session::ChatSession;
use crate::assistant::tools::ToolRegistry;
use crate::assistant::{ChatMessage, Sender};
use crate::auth::{self, Claims};
use crate::db::DbError;
use crate::markdown::markdown_to_html;
use crate::payments;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        // Accounts
        .route("/api/login", post(login))
        .route("/api/signup", post(signup))
        .route("/api/users/:id", get(get_user).delete(delete_user))
        .route("/api/students", get(list_students))
        // Payments
        .route("/api/payments/create-checkout", post(create_checkout))
        .route("/api/payments/webhook", post(stripe_webhook))
        // Assistant sessions
        .route("/api/assistant/sessions", post(create_session))
        .route(
            "/api/assistant/sessions/:id",
            get(get_session).delete(delete_session),
        )
        .route("/api/assistant/sessions/:id/messages", post(send_message))
        .with_state(state)
}

// ============================================================
// Health
// ============================================================

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================
// Accounts
// ============================================================

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let credentials = match state.db.get_credentials_by_email(&req.email) {
        Ok(c) => c,
        Err(DbError::UserNotFound(_)) => {
            return Err(AppError::Unauthorized("Invalid credentials".to_string()))
        }
        Err(e) => return Err(AppError::Internal(e.to_string())),
    };

    if !auth::verify_password(&req.password, &credentials.password_salt, &credentials.password_hash)
    {
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }

    let token = auth::issue_token(
        &Claims::for_user(&credentials.user),
        &state.config.auth_secret,
    );
    info!(user_id = credentials.user.id, "user logged in");

    Ok(Json(LoginResponse {
        token,
        user: credentials.user.into(),
    }))
}

async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<LoginResponse>), AppError> {
    if req.name.trim().is_empty() || req.email.trim().is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest(
            "name, email, and password are required".to_string(),
        ));
    }

    let hashed = auth::hash_password(&req.password);
    let user = match state.db.create_user(
        req.name.trim(),
        req.email.trim(),
        &hashed.hash,
        &hashed.salt,
        crate::db::Role::Student,
        state.config.new_user_starting_credits,
    ) {
        Ok(user) => user,
        Err(DbError::EmailExists(_)) => {
            return Err(AppError::Conflict("Email is already registered".to_string()))
        }
        Err(e) => return Err(AppError::Internal(e.to_string())),
    };

    let token = auth::issue_token(&Claims::for_user(&user), &state.config.auth_secret);
    info!(user_id = user.id, "user signed up");

    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            token,
            user: user.into(),
        }),
    ))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, AppError> {
    match state.db.get_user(id) {
        Ok(user) => Ok(Json(user.into())),
        Err(DbError::UserNotFound(_)) => Err(AppError::NotFound("User not found".to_string())),
        Err(e) => Err(AppError::Internal(e.to_string())),
    }
}

async fn list_students(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    require_admin(&state, &headers)?;
    let students = state
        .db
        .list_students()
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(students.into_iter().map(Into::into).collect()))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let claims = require_admin(&state, &headers)?;
    match state.db.delete_user(id) {
        Ok(()) => {
            info!(user_id = id, by = claims.sub, "user deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(DbError::UserNotFound(_)) => Err(AppError::NotFound("User not found".to_string())),
        Err(e) => Err(AppError::Internal(e.to_string())),
    }
}

/// Admin-only guard: validate the bearer token and check the role.
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<Claims, AppError> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    let claims = auth::verify_token(token, &state.config.auth_secret)
        .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))?;

    if claims.role != crate::db::Role::Admin {
        return Err(AppError::Forbidden("Admin role required".to_string()));
    }
    Ok(claims)
}

// ============================================================
// Payments
// ============================================================

async fn create_checkout(
    State(state): State<AppState>,
    Json(req): Json<CreateCheckoutRequest>,
) -> Result<Json<CreateCheckoutResponse>, AppError> {
    let Some(stripe) = &state.stripe else {
        return Err(AppError::Unavailable("Payments are not configured".to_string()));
    };

    // Price always comes from server-side config, never the client
    let package = state
        .config
        .package_for_credits(req.credits)
        .ok_or_else(|| AppError::BadRequest("Unknown credit package".to_string()))?;

    let user = match state.db.get_user(req.user_id) {
        Ok(user) => user,
        Err(DbError::UserNotFound(_)) => {
            return Err(AppError::NotFound("User not found".to_string()))
        }
        Err(e) => return Err(AppError::Internal(e.to_string())),
    };

    let session = stripe
        .create_checkout_session(
            package,
            user.id,
            &state.config.stripe.success_url,
            &state.config.stripe.cancel_url,
        )
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    info!(user_id = user.id, session_id = %session.id, credits = package.credits,
          "checkout session created");

    let url = session
        .url
        .ok_or_else(|| AppError::Internal("Checkout session has no URL".to_string()))?;
    Ok(Json(CreateCheckoutResponse { url }))
}

async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let Some(secret) = &state.config.stripe.webhook_secret else {
        return Err(AppError::Unavailable(
            "Webhook secret is not configured".to_string(),
        ));
    };

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing stripe-signature header".to_string()))?;

    payments::verify_webhook_signature(
        &body,
        signature,
        secret,
        payments::DEFAULT_TOLERANCE_SECS,
        chrono::Utc::now().timestamp(),
    )
    .map_err(|e| {
        warn!(error = %e, "webhook signature rejected");
        AppError::BadRequest("Invalid webhook signature".to_string())
    })?;

    let event =
        payments::parse_event(&body).map_err(|e| AppError::BadRequest(e.to_string()))?;

    if let Some(purchase) = payments::completed_checkout(&event) {
        let balance = state
            .db
            .add_credits(purchase.user_id, purchase.credits)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        info!(user_id = purchase.user_id, credits = purchase.credits, balance,
              "credits purchased");
    }

    // Acknowledge every verified event, handled or not
    Ok(StatusCode::OK)
}

// ============================================================
// Assistant Sessions
// ============================================================

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    let Some(llm) = &state.llm else {
        return Err(AppError::Unavailable(
            "Assistant is not configured".to_string(),
        ));
    };

    let user = match state.db.get_user(req.user_id) {
        Ok(user) => user,
        Err(DbError::UserNotFound(_)) => {
            return Err(AppError::NotFound("User not found".to_string()))
        }
        Err(e) => return Err(AppError::Internal(e.to_string())),
    };

    let (session, charges_credits) = match req.kind {
        SessionKind::Student => {
            let registry = ToolRegistry::for_student(Arc::clone(&state.catalog));
            (ChatSession::student(registry, Arc::clone(llm)), true)
        }
        SessionKind::Curriculum => {
            let course_name = req.course_name.as_deref().ok_or_else(|| {
                AppError::BadRequest("course_name is required for curriculum sessions".to_string())
            })?;
            let registry =
                ToolRegistry::for_curriculum(Arc::clone(&state.catalog), Arc::clone(llm));
            (
                ChatSession::curriculum(registry, Arc::clone(llm), course_name),
                false,
            )
        }
    };

    let session_id = uuid::Uuid::new_v4().to_string();
    state.sessions.write().await.insert(
        session_id.clone(),
        Arc::new(SessionEntry {
            user_id: user.id,
            charges_credits,
            session: Arc::new(tokio::sync::Mutex::new(session)),
        }),
    );
    info!(user_id = user.id, session_id = %session_id, kind = ?req.kind, "session created");

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse { session_id }),
    ))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshotResponse>, AppError> {
    let entry = lookup_session(&state, &id).await?;
    let session = entry.session.lock().await;
    let snapshot = session.snapshot();
    drop(session);

    let credits = state.db.get_user(entry.user_id).map(|u| u.credits).ok();
    Ok(Json(render_snapshot(snapshot, credits, None)))
}

/// Drop a finished session so its transcript can be reclaimed.
async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    match state.sessions.write().await.remove(&id) {
        Some(entry) => {
            info!(user_id = entry.user_id, session_id = %id, "session deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(AppError::NotFound("Session not found".to_string())),
    }
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SessionSnapshotResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::BadRequest("Message text is required".to_string()));
    }

    let entry = lookup_session(&state, &id).await?;

    // One turn at a time per session
    let Ok(mut session) = entry.session.try_lock() else {
        return Err(AppError::Conflict(
            "A turn is already in progress for this session".to_string(),
        ));
    };

    let cost = state.config.assistant_credit_cost;
    if entry.charges_credits {
        let user = state
            .db
            .get_user(entry.user_id)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        if user.credits < cost {
            return Err(AppError::PaymentRequired(
                "Not enough credits to use the assistant".to_string(),
            ));
        }
    }

    let turn = session.run_turn(req.text.trim()).await;
    let snapshot = session.snapshot();
    drop(session);

    // Failed turns are not billed
    let mut credits = None;
    let mut billed = None;
    if turn.is_ok() && entry.charges_credits {
        match state.db.spend_credits(entry.user_id, cost) {
            Ok(balance) => {
                credits = Some(balance);
                billed = Some(true);
            }
            Err(e) => {
                warn!(user_id = entry.user_id, error = %e, "credit deduction failed");
                credits = state.db.get_user(entry.user_id).map(|u| u.credits).ok();
                billed = Some(false);
            }
        }
    } else if entry.charges_credits {
        credits = state.db.get_user(entry.user_id).map(|u| u.credits).ok();
    }

    // The snapshot already carries the error message for failed turns
    Ok(Json(render_snapshot(snapshot, credits, billed)))
}

async fn lookup_session(state: &AppState, id: &str) -> Result<Arc<SessionEntry>, AppError> {
    state
        .sessions
        .read()
        .await
        .get(id)
        .cloned()
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))
}

fn render_snapshot(
    messages: Vec<ChatMessage>,
    credits: Option<i64>,
    billed: Option<bool>,
) -> SessionSnapshotResponse {
    let messages = messages
        .into_iter()
        .map(|m| {
            let html = (m.sender == Sender::Assistant).then(|| markdown_to_html(&m.text));
            MessageView {
                sender: m.sender,
                text: m.text,
                html,
                payload: m.payload,
            }
        })
        .collect();

    SessionSnapshotResponse {
        messages,
        credits,
        billed,
    }
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Unauthorized(String),
    PaymentRequired(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::PaymentRequired(msg) => (StatusCode::PAYMENT_REQUIRED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
