use super::common::*;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::care::errors::{CareError, NotFoundError, PolicyError, ValidationError};
use crate::care::generation::GenerationError;
use crate::care::repository::RepositoryError;
use crate::care::router::status_for;
use crate::care::{care_router, Role, CALLER_HEADER};

const PATIENT: &str = "pat@example.com";
const D1: &str = "d1@clinic.test";

fn router(script: Vec<Result<String, GenerationError>>) -> (Router, Harness) {
    let h = harness(
        vec![doctor(D1, "Dr. One"), patient(PATIENT), account("new@example.com", None)],
        script,
    );
    (care_router(h.service.clone()), h)
}

fn request(method: Method, uri: &str, caller: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        builder = builder.header(CALLER_HEADER, caller);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).expect("serialize body")))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

#[tokio::test]
async fn missing_caller_is_unauthenticated() {
    let (router, _) = router(Vec::new());
    let response = router
        .oneshot(request(Method::GET, "/api/v1/session", None, None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await, json!({ "error": "Not authenticated." }));
}

#[tokio::test]
async fn session_returns_the_derived_view() {
    let (router, _) = router(Vec::new());
    let response = router
        .oneshot(request(Method::GET, "/api/v1/session", Some(PATIENT), None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["user"]["email"], json!(PATIENT));
    assert_eq!(body["user"]["assignmentState"], json!("unassigned"));
    assert_eq!(body["user"]["permanentDoctorDays"], json!(2));
}

#[tokio::test]
async fn short_assessment_is_a_bad_request() {
    let (router, _) = router(Vec::new());
    let response = router
        .oneshot(request(
            Method::POST,
            "/api/v1/assessment",
            Some(PATIENT),
            Some(json!({ "answers": [1, 2, 3] })),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["error"], json!("all 10 answers are required (received 3)"));
}

#[tokio::test]
async fn assessment_response_carries_the_score() {
    let (router, _) = router(Vec::new());
    let response = router
        .oneshot(request(
            Method::POST,
            "/api/v1/assessment",
            Some(PATIENT),
            Some(json!({ "answers": [3, 3, 3, 3, 3, 3, 3, 3, 3, 3], "doctorId": D1 })),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["assessment"]["percentage"], json!(75));
    assert_eq!(body["assessment"]["level"], json!("high"));
    assert_eq!(body["user"]["selectedDoctor"]["id"], json!(D1));
}

#[tokio::test]
async fn numeric_strings_and_whole_floats_are_accepted_as_answers() {
    let (router, _) = router(Vec::new());
    let response = router
        .oneshot(request(
            Method::POST,
            "/api/v1/assessment",
            Some(PATIENT),
            Some(json!({ "answers": ["4", 4.0, 4, "4", 4, 4, 4, 4, 4, 4], "noDoctor": true })),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["assessment"]["score"], json!(40));
}

#[tokio::test]
async fn malformed_answers_are_bad_requests_with_an_error_body() {
    let cases = [
        (json!([3, 3, 3, 3, 3, 3, 3, 3, 3, 1e30]), "answer 10 must be between 1 and 4"),
        (json!([3, 2.5, 3, 3, 3, 3, 3, 3, 3, 3]), "answer 2 must be a whole number (received 2.5)"),
        (json!([3, 3, "often", 3, 3, 3, 3, 3, 3, 3]), "answer 3 must be a whole number"),
        (json!("3,3,3"), "all 10 answers are required (received 0)"),
    ];
    for (answers, expected) in cases {
        let (router, h) = router(Vec::new());
        let before = h.accounts.records();
        let response = router
            .oneshot(request(
                Method::POST,
                "/api/v1/assessment",
                Some(PATIENT),
                Some(json!({ "answers": answers })),
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{answers}");
        let body = read_json(response).await;
        assert!(
            body["error"]
                .as_str()
                .is_some_and(|message| message.starts_with(expected)),
            "{body}"
        );
        assert_eq!(h.accounts.records(), before);
    }
}

#[tokio::test]
async fn doctor_routes_reject_patients() {
    let (router, _) = router(Vec::new());
    let response = router
        .oneshot(request(Method::GET, "/api/v1/doctor/followups", Some(PATIENT), None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn changing_role_is_a_conflict() {
    let (router, _) = router(Vec::new());
    let response = router
        .oneshot(request(
            Method::POST,
            "/api/v1/user/role",
            Some(D1),
            Some(json!({ "role": "patient" })),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_account_is_not_found() {
    let (router, _) = router(Vec::new());
    let response = router
        .oneshot(request(Method::GET, "/api/v1/session", Some("ghost@example.com"), None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn overloaded_companion_is_service_unavailable() {
    let overloaded = || {
        Err(GenerationError::Status {
            status: 503,
            message: "overloaded".to_string(),
        })
    };
    let (router, h) = router(vec![overloaded(), overloaded(), overloaded()]);
    let response = router
        .oneshot(request(
            Method::POST,
            "/api/v1/ai/chat",
            Some(PATIENT),
            Some(json!({ "message": "hello" })),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json(response).await;
    assert!(body["error"]
        .as_str()
        .is_some_and(|message| message.contains("short break")));
    assert_eq!(h.generator.calls(), 3);
}

#[tokio::test]
async fn chat_route_returns_the_reply() {
    let (router, _) = router(vec![Ok("I'm listening.".to_string())]);
    let response = router
        .oneshot(request(
            Method::POST,
            "/api/v1/ai/chat",
            Some(PATIENT),
            Some(json!({
                "message": "hello",
                "history": [{ "role": "assistant", "text": "Welcome" }],
                "language": "English"
            })),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({ "reply": "I'm listening." }));
}

#[tokio::test]
async fn doctor_listing_needs_no_profile_edits() {
    let (router, _) = router(Vec::new());
    let response = router
        .oneshot(request(Method::GET, "/api/v1/doctors", Some("new@example.com"), None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["doctors"][0]["id"], json!(D1));
    assert_eq!(body["doctors"][0]["name"], json!("Dr. One"));
    assert_eq!(body["doctors"].as_array().map(Vec::len), Some(1));
}

#[test]
fn statuses_follow_error_kinds() {
    assert_eq!(
        status_for(&ValidationError::MissingField("note").into()),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        status_for(
            &PolicyError::RoleRequired {
                required: Role::Doctor,
                action: "add notes"
            }
            .into()
        ),
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        status_for(&PolicyError::SharingRestricted { days: 2 }.into()),
        StatusCode::CONFLICT
    );
    assert_eq!(
        status_for(&NotFoundError::FollowUp("f-1".to_string()).into()),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        status_for(&CareError::UpstreamUnavailable {
            retryable: false,
            source: GenerationError::Unconfigured,
        }),
        StatusCode::BAD_GATEWAY
    );
    assert_eq!(
        status_for(&RepositoryError::Unavailable("down".to_string()).into()),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}
