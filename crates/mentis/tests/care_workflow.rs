use std::sync::Arc;

use mentis::care::{
    AccountOpening, AssessmentLevel, AssessmentSubmission, AssignmentState, CareService,
    ChatRequest, DoctorProfileUpdate, GenerationError, GenerationPurpose, GenerationRequest,
    JsonFileAccountStore, JsonFileChatHistory, RawAnswer, RetryPolicy, RoleSelection,
    TextGenerator,
};
use mentis::config::CareConfig;
use serde_json::{json, Value};

/// Answers companion turns with a fixed line and follow-up prompts with a
/// well-formed brief.
struct CannedGenerator;

impl TextGenerator for CannedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        match request.purpose {
            GenerationPurpose::Companion => Ok("Tell me more about that moment.".to_string()),
            GenerationPurpose::FollowUp => Ok(json!({
                "summary": "Daydreaming peaks in lectures.",
                "keyThemes": ["lectures", "sleep"],
                "riskSignals": [],
                "nextSteps": ["Try a five minute grounding exercise"],
                "improvementPercentage": 40
            })
            .to_string()),
        }
    }
}

type FileService = CareService<JsonFileAccountStore, JsonFileChatHistory, CannedGenerator>;

fn service(dir: &std::path::Path) -> FileService {
    CareService::new(
        Arc::new(JsonFileAccountStore::new(dir.join("accounts.json"))),
        Arc::new(JsonFileChatHistory::new(dir.join("db").join("email.json"))),
        Arc::new(CannedGenerator),
        &CareConfig::default(),
        RetryPolicy::default(),
    )
}

fn opening(email: &str, username: &str) -> AccountOpening {
    AccountOpening {
        email: email.to_string(),
        username: Some(username.to_string()),
        provider: None,
    }
}

#[tokio::test]
async fn patient_shares_a_follow_up_with_their_doctor() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("accounts.json"),
        json!({ "accounts": [], "sessions": { "token": "kept" } }).to_string(),
    )
    .expect("seed accounts file");

    let care = service(dir.path());

    care.open_account(opening("doc@clinic.test", "Dr. Hana"))
        .await
        .expect("doctor account");
    care.choose_role(
        "doc@clinic.test",
        RoleSelection {
            role: "doctor".to_string(),
        },
    )
    .await
    .expect("doctor role");
    care.update_doctor_profile(
        "doc@clinic.test",
        DoctorProfileUpdate {
            description: "Attention and focus coaching".to_string(),
            languages: Some(vec!["en".to_string(), "ar".to_string()]),
            location: Some("Amman".to_string()),
            speciality: None,
        },
    )
    .await
    .expect("doctor profile");

    care.open_account(opening("sam@example.com", "Sam"))
        .await
        .expect("patient account");
    care.choose_role(
        "sam@example.com",
        RoleSelection {
            role: "patient".to_string(),
        },
    )
    .await
    .expect("patient role");

    let view = care
        .submit_assessment(
            "sam@example.com",
            AssessmentSubmission {
                answers: [2, 3, 2, 3, 2, 3, 2, 3, 2, 3].map(RawAnswer::Integer).to_vec(),
                language: Some("en".to_string()),
                doctor_id: Some("doc@clinic.test".to_string()),
                ..AssessmentSubmission::default()
            },
        )
        .await
        .expect("assessment");
    let assessment = view.assessment.expect("assessment recorded");
    assert_eq!(assessment.score, 25);
    assert_eq!(assessment.percentage, 63);
    assert_eq!(assessment.level, AssessmentLevel::High);
    assert_eq!(view.assignment_state, AssignmentState::Selecting);

    let reply = care
        .chat(
            "sam@example.com",
            ChatRequest {
                message: "I lost the whole lecture again".to_string(),
                history: Vec::new(),
                language: "auto".to_string(),
            },
        )
        .await
        .expect("companion reply");
    assert_eq!(reply, "Tell me more about that moment.");

    let follow_up = care
        .share_follow_up("sam@example.com")
        .await
        .expect("follow-up shared");
    assert_eq!(follow_up.summary, "Daydreaming peaks in lectures.");
    assert_eq!(follow_up.improvement_percentage, 40);

    let noted = care
        .add_doctor_note(
            "doc@clinic.test",
            "sam@example.com",
            &follow_up.id,
            "Let's review this on Thursday.",
        )
        .await
        .expect("doctor note");
    assert_eq!(noted.doctor_notes[0].doctor_name, "Dr. Hana");

    // a fresh service over the same files sees everything
    let reopened = service(dir.path());
    let patients = reopened
        .doctor_follow_ups("doc@clinic.test")
        .expect("doctor follow-ups");
    assert_eq!(patients.len(), 1);
    assert_eq!(patients[0].username, "Sam");
    assert_eq!(patients[0].follow_ups[0].doctor_notes.len(), 1);

    let history = reopened
        .chat_history("sam@example.com")
        .expect("chat history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].user_message, "I lost the whole lecture again");

    let own = reopened
        .patient_follow_ups("sam@example.com")
        .await
        .expect("patient follow-ups");
    let own = serde_json::to_value(own).expect("serializes");
    assert!(own["followUps"][0].get("riskSignals").is_none());
    assert_eq!(own["doctor"]["location"], json!("Amman"));

    let raw: Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("accounts.json")).expect("accounts file"),
    )
    .expect("accounts json");
    assert_eq!(raw["sessions"], json!({ "token": "kept" }));
    assert_eq!(raw["accounts"].as_array().map(Vec::len), Some(2));
}
