use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use super::companion::ChatRequest;
use super::errors::CareError;
use super::generation::TextGenerator;
use super::repository::{AccountStore, ChatHistoryStore};
use super::requests::{
    AccountOpening, AssessmentSubmission, DoctorChoice, DoctorNoteInput, DoctorProfileUpdate,
    RoleSelection,
};
use super::service::CareService;

/// Header carrying the identity established by the authentication layer.
pub const CALLER_HEADER: &str = "x-account-email";

type SharedService<S, H, G> = State<Arc<CareService<S, H, G>>>;

/// Router builder exposing the care workflows over HTTP.
pub fn care_router<S, H, G>(service: Arc<CareService<S, H, G>>) -> Router
where
    S: AccountStore + 'static,
    H: ChatHistoryStore + 'static,
    G: TextGenerator + 'static,
{
    Router::new()
        .route("/api/v1/accounts", post(open_account_handler::<S, H, G>))
        .route("/api/v1/session", get(session_handler::<S, H, G>))
        .route("/api/v1/user/role", post(role_handler::<S, H, G>))
        .route("/api/v1/doctor/profile", post(doctor_profile_handler::<S, H, G>))
        .route("/api/v1/assessment", post(assessment_handler::<S, H, G>))
        .route("/api/v1/doctors", get(doctors_handler::<S, H, G>))
        .route(
            "/api/v1/patient/change-doctor",
            post(change_doctor_handler::<S, H, G>),
        )
        .route(
            "/api/v1/patient/permanent-doctor",
            post(permanent_doctor_handler::<S, H, G>),
        )
        .route("/api/v1/ai/chat", post(chat_handler::<S, H, G>))
        .route("/api/v1/ai/chat/history", get(chat_history_handler::<S, H, G>))
        .route("/api/v1/ai/follow-up", post(follow_up_handler::<S, H, G>))
        .route(
            "/api/v1/patient/followups",
            get(patient_follow_ups_handler::<S, H, G>),
        )
        .route(
            "/api/v1/doctor/followups",
            get(doctor_follow_ups_handler::<S, H, G>),
        )
        .route(
            "/api/v1/doctor/followups/:patient_email/notes",
            post(doctor_note_handler::<S, H, G>),
        )
        .with_state(service)
}

pub(crate) async fn open_account_handler<S, H, G>(
    State(service): SharedService<S, H, G>,
    Json(opening): Json<AccountOpening>,
) -> Response
where
    S: AccountStore + 'static,
    H: ChatHistoryStore + 'static,
    G: TextGenerator + 'static,
{
    respond(service.open_account(opening).await, |view| json!({ "user": view }))
}

pub(crate) async fn session_handler<S, H, G>(
    State(service): SharedService<S, H, G>,
    headers: HeaderMap,
) -> Response
where
    S: AccountStore + 'static,
    H: ChatHistoryStore + 'static,
    G: TextGenerator + 'static,
{
    let email = match caller(&headers) {
        Ok(email) => email,
        Err(response) => return response,
    };
    respond(service.account_view(&email).await, |view| json!({ "user": view }))
}

pub(crate) async fn role_handler<S, H, G>(
    State(service): SharedService<S, H, G>,
    headers: HeaderMap,
    Json(selection): Json<RoleSelection>,
) -> Response
where
    S: AccountStore + 'static,
    H: ChatHistoryStore + 'static,
    G: TextGenerator + 'static,
{
    let email = match caller(&headers) {
        Ok(email) => email,
        Err(response) => return response,
    };
    respond(service.choose_role(&email, selection).await, |view| {
        json!({ "success": true, "user": view })
    })
}

pub(crate) async fn doctor_profile_handler<S, H, G>(
    State(service): SharedService<S, H, G>,
    headers: HeaderMap,
    Json(update): Json<DoctorProfileUpdate>,
) -> Response
where
    S: AccountStore + 'static,
    H: ChatHistoryStore + 'static,
    G: TextGenerator + 'static,
{
    let email = match caller(&headers) {
        Ok(email) => email,
        Err(response) => return response,
    };
    respond(
        service.update_doctor_profile(&email, update).await,
        |profile| json!({ "success": true, "doctor": profile }),
    )
}

pub(crate) async fn assessment_handler<S, H, G>(
    State(service): SharedService<S, H, G>,
    headers: HeaderMap,
    Json(submission): Json<AssessmentSubmission>,
) -> Response
where
    S: AccountStore + 'static,
    H: ChatHistoryStore + 'static,
    G: TextGenerator + 'static,
{
    let email = match caller(&headers) {
        Ok(email) => email,
        Err(response) => return response,
    };
    respond(service.submit_assessment(&email, submission).await, |view| {
        json!({ "success": true, "assessment": view.assessment, "user": view })
    })
}

pub(crate) async fn doctors_handler<S, H, G>(State(service): SharedService<S, H, G>) -> Response
where
    S: AccountStore + 'static,
    H: ChatHistoryStore + 'static,
    G: TextGenerator + 'static,
{
    respond(service.doctors(), |doctors| json!({ "doctors": doctors }))
}

pub(crate) async fn change_doctor_handler<S, H, G>(
    State(service): SharedService<S, H, G>,
    headers: HeaderMap,
    Json(choice): Json<DoctorChoice>,
) -> Response
where
    S: AccountStore + 'static,
    H: ChatHistoryStore + 'static,
    G: TextGenerator + 'static,
{
    let email = match caller(&headers) {
        Ok(email) => email,
        Err(response) => return response,
    };
    respond(
        service.choose_doctor(&email, &choice.doctor_id).await,
        |view| json!({ "success": true, "user": view }),
    )
}

pub(crate) async fn permanent_doctor_handler<S, H, G>(
    State(service): SharedService<S, H, G>,
    headers: HeaderMap,
    Json(choice): Json<DoctorChoice>,
) -> Response
where
    S: AccountStore + 'static,
    H: ChatHistoryStore + 'static,
    G: TextGenerator + 'static,
{
    let email = match caller(&headers) {
        Ok(email) => email,
        Err(response) => return response,
    };
    respond(
        service.set_permanent_doctor(&email, &choice.doctor_id).await,
        |view| json!({ "success": true, "user": view }),
    )
}

pub(crate) async fn chat_handler<S, H, G>(
    State(service): SharedService<S, H, G>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response
where
    S: AccountStore + 'static,
    H: ChatHistoryStore + 'static,
    G: TextGenerator + 'static,
{
    let email = match caller(&headers) {
        Ok(email) => email,
        Err(response) => return response,
    };
    respond(service.chat(&email, request).await, |reply| json!({ "reply": reply }))
}

pub(crate) async fn chat_history_handler<S, H, G>(
    State(service): SharedService<S, H, G>,
    headers: HeaderMap,
) -> Response
where
    S: AccountStore + 'static,
    H: ChatHistoryStore + 'static,
    G: TextGenerator + 'static,
{
    let email = match caller(&headers) {
        Ok(email) => email,
        Err(response) => return response,
    };
    respond(service.chat_history(&email), |history| json!({ "history": history }))
}

pub(crate) async fn follow_up_handler<S, H, G>(
    State(service): SharedService<S, H, G>,
    headers: HeaderMap,
) -> Response
where
    S: AccountStore + 'static,
    H: ChatHistoryStore + 'static,
    G: TextGenerator + 'static,
{
    let email = match caller(&headers) {
        Ok(email) => email,
        Err(response) => return response,
    };
    respond(service.share_follow_up(&email).await, |follow_up| {
        json!({ "success": true, "followUp": follow_up })
    })
}

pub(crate) async fn patient_follow_ups_handler<S, H, G>(
    State(service): SharedService<S, H, G>,
    headers: HeaderMap,
) -> Response
where
    S: AccountStore + 'static,
    H: ChatHistoryStore + 'static,
    G: TextGenerator + 'static,
{
    let email = match caller(&headers) {
        Ok(email) => email,
        Err(response) => return response,
    };
    respond(service.patient_follow_ups(&email).await, |view| json!(view))
}

pub(crate) async fn doctor_follow_ups_handler<S, H, G>(
    State(service): SharedService<S, H, G>,
    headers: HeaderMap,
) -> Response
where
    S: AccountStore + 'static,
    H: ChatHistoryStore + 'static,
    G: TextGenerator + 'static,
{
    let email = match caller(&headers) {
        Ok(email) => email,
        Err(response) => return response,
    };
    respond(service.doctor_follow_ups(&email), |patients| {
        json!({ "patients": patients })
    })
}

pub(crate) async fn doctor_note_handler<S, H, G>(
    State(service): SharedService<S, H, G>,
    headers: HeaderMap,
    Path(patient_email): Path<String>,
    Json(input): Json<DoctorNoteInput>,
) -> Response
where
    S: AccountStore + 'static,
    H: ChatHistoryStore + 'static,
    G: TextGenerator + 'static,
{
    let email = match caller(&headers) {
        Ok(email) => email,
        Err(response) => return response,
    };
    respond(
        service
            .add_doctor_note(&email, &patient_email, &input.follow_up_id, &input.note)
            .await,
        |follow_up| json!({ "success": true, "followUp": follow_up }),
    )
}

fn caller(headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            let payload = json!({ "error": "Not authenticated." });
            (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
        })
}

fn respond<T>(result: Result<T, CareError>, body: impl FnOnce(T) -> serde_json::Value) -> Response {
    match result {
        Ok(value) => (StatusCode::OK, Json(body(value))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) fn status_for(error: &CareError) -> StatusCode {
    match error {
        CareError::Validation(_) => StatusCode::BAD_REQUEST,
        CareError::Policy(policy) if policy.is_role_mismatch() => StatusCode::FORBIDDEN,
        CareError::Policy(_) => StatusCode::CONFLICT,
        CareError::NotFound(_) => StatusCode::NOT_FOUND,
        CareError::UpstreamUnavailable {
            retryable: true, ..
        } => StatusCode::SERVICE_UNAVAILABLE,
        CareError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
        CareError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: CareError) -> Response {
    let status = status_for(&error);
    let message = match &error {
        CareError::UpstreamUnavailable {
            retryable: true, ..
        } => "The Empathic Companion is taking a short break. Please try again in a moment."
            .to_string(),
        CareError::UpstreamUnavailable { .. } => {
            "Unable to reach the companion right now.".to_string()
        }
        CareError::Repository(_) => {
            tracing::error!(%error, "storage failure while handling request");
            "Storage is temporarily unavailable.".to_string()
        }
        other => other.to_string(),
    };
    let payload = json!({ "error": message });
    (status, Json(payload)).into_response()
}
