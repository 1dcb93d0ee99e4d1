use chrono::{DateTime, Duration, Utc};
use clap::Args;
use mentis::care::{
    AccountOpening, AssessmentScore, AssessmentScorer, AssessmentSubmission, CareService,
    ChatRequest, Clock, DoctorProfileUpdate, GenerationError, GenerationPurpose,
    GenerationRequest, HistoryItem, InMemoryAccountStore, InMemoryChatHistory, RawAnswer,
    RetryPolicy, RoleSelection, TextGenerator,
};
use mentis::config::CareConfig;
use mentis::error::AppError;
use serde::Serialize;
use std::sync::{Arc, Mutex};

#[derive(Args, Debug)]
pub(crate) struct AssessArgs {
    /// Ten comma-separated answers, each between 1 and 4
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
    pub(crate) answers: Vec<i64>,
    /// Print the result as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Days a patient may switch doctors before choosing a permanent one
    #[arg(long, default_value_t = 2)]
    pub(crate) lock_window_days: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssessmentReport {
    answers: Vec<u8>,
    #[serde(flatten)]
    score: AssessmentScore,
}

pub(crate) fn run_assessment(args: AssessArgs) -> Result<(), AppError> {
    let scorer = AssessmentScorer::standard();
    let answers = match scorer.validate(&args.answers) {
        Ok(answers) => answers,
        Err(err) => {
            println!("Assessment rejected: {}", err);
            return Ok(());
        }
    };
    let report = AssessmentReport {
        score: scorer.score(&answers),
        answers,
    };

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(err) => println!("Assessment payload unavailable: {}", err),
        }
        return Ok(());
    }

    println!(
        "Score {} / {} ({}%) -> {}",
        report.score.score,
        report.score.max_score,
        report.score.percentage,
        report.score.level.label()
    );
    Ok(())
}

/// Canned generator so the walkthrough runs without credentials.
struct ScriptedCompanion;

impl TextGenerator for ScriptedCompanion {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        match request.purpose {
            GenerationPurpose::Companion => Ok(
                "That sounds draining. When did you notice the drifting start today?".to_string(),
            ),
            GenerationPurpose::FollowUp => Ok(serde_json::json!({
                "summary": "Patient reports long daydreaming spells during lectures and late evenings.",
                "keyThemes": ["lecture focus", "evening rumination"],
                "riskSignals": [],
                "nextSteps": ["Short grounding exercise before lectures", "Fixed wind-down time"],
                "improvementPercentage": 45
            })
            .to_string()),
        }
    }
}

struct DemoClock {
    now: Mutex<DateTime<Utc>>,
}

impl DemoClock {
    fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("demo clock poisoned");
        *now += by;
    }
}

impl Clock for DemoClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("demo clock poisoned")
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let care_config = CareConfig {
        lock_window_days: args.lock_window_days.max(1),
        ..CareConfig::default()
    };
    let clock = Arc::new(DemoClock {
        now: Mutex::new(Utc::now()),
    });
    let service = CareService::new(
        Arc::new(InMemoryAccountStore::default()),
        Arc::new(InMemoryChatHistory::default()),
        Arc::new(ScriptedCompanion),
        &care_config,
        RetryPolicy::default(),
    )
    .with_clock(clock.clone());

    println!("Mentis Anchora care demo");

    let doctor = "hana@clinic.test";
    let patient = "sam@example.com";
    let setup = async {
        service
            .open_account(AccountOpening {
                email: doctor.to_string(),
                username: Some("Dr. Hana".to_string()),
                provider: None,
            })
            .await?;
        service
            .choose_role(
                doctor,
                RoleSelection {
                    role: "doctor".to_string(),
                },
            )
            .await?;
        service
            .update_doctor_profile(
                doctor,
                DoctorProfileUpdate {
                    description: "Focus and attention coaching".to_string(),
                    languages: Some(vec!["en".to_string(), "ar".to_string()]),
                    location: Some("Amman".to_string()),
                    speciality: None,
                },
            )
            .await?;
        service
            .open_account(AccountOpening {
                email: patient.to_string(),
                username: Some("Sam".to_string()),
                provider: None,
            })
            .await?;
        service
            .choose_role(
                patient,
                RoleSelection {
                    role: "patient".to_string(),
                },
            )
            .await
    };
    if let Err(err) = setup.await {
        println!("  Setup failed: {}", err);
        return Ok(());
    }

    let doctors = match service.doctors() {
        Ok(doctors) => doctors,
        Err(err) => {
            println!("  Doctor directory unavailable: {}", err);
            return Ok(());
        }
    };
    println!("\nDoctor directory");
    for profile in &doctors {
        println!(
            "- {} <{}> | {} | languages: {}",
            profile.name,
            profile.id,
            profile.speciality,
            profile.languages.join(", ")
        );
    }

    let submission = AssessmentSubmission {
        answers: [3, 4, 2, 3, 3, 4, 2, 3, 3, 2].map(RawAnswer::Integer).to_vec(),
        language: Some("en".to_string()),
        doctor_id: Some(doctor.to_string()),
        ..AssessmentSubmission::default()
    };
    let view = match service.submit_assessment(patient, submission).await {
        Ok(view) => view,
        Err(err) => {
            println!("  Assessment rejected: {}", err);
            return Ok(());
        }
    };
    println!("\nAssessment");
    if let Some(assessment) = &view.assessment {
        println!(
            "- {} scored {} / {} ({}%) -> {}",
            view.username,
            assessment.score,
            assessment.max_score,
            assessment.percentage,
            assessment.level.label()
        );
    }
    println!(
        "- Assignment state: {} | free changes for another {} h",
        view.assignment_state.label(),
        view.time_until_permanent_required.unwrap_or_default() / 3_600_000
    );

    println!("\nCompanion chat");
    let request = ChatRequest {
        message: "I keep drifting off in lectures, my number is 555-123-4567".to_string(),
        history: vec![HistoryItem::new("assistant", "Welcome back, Sam.")],
        language: "auto".to_string(),
    };
    match service.chat(patient, request).await {
        Ok(reply) => println!("- Companion: {}", reply),
        Err(err) => println!("- Companion unavailable: {}", err),
    }

    println!("\nFollow-up sharing");
    let follow_up = match service.share_follow_up(patient).await {
        Ok(follow_up) => follow_up,
        Err(err) => {
            println!("  Sharing refused: {}", err);
            return Ok(());
        }
    };
    println!(
        "- Shared {} | improvement {}% | themes: {}",
        follow_up.id,
        follow_up.improvement_percentage,
        follow_up.key_themes.join(", ")
    );

    if let Err(err) = service
        .add_doctor_note(
            doctor,
            patient,
            &follow_up.id,
            "Let's try the grounding exercise together on Thursday.",
        )
        .await
    {
        println!("  Note rejected: {}", err);
    }
    match service.doctor_follow_ups(doctor) {
        Ok(patients) => {
            for entry in patients {
                let notes: usize = entry
                    .follow_ups
                    .iter()
                    .map(|follow_up| follow_up.doctor_notes.len())
                    .sum();
                println!(
                    "- {} sees {}: {} follow-up(s), {} note(s)",
                    doctor,
                    entry.username,
                    entry.follow_ups.len(),
                    notes
                );
            }
        }
        Err(err) => println!("  Doctor view unavailable: {}", err),
    }

    println!("\nLock-in window");
    clock.advance(Duration::days(i64::from(care_config.lock_window_days)));
    match service.share_follow_up(patient).await {
        Ok(_) => println!("- Sharing still open"),
        Err(err) => println!("- Sharing paused: {}", err),
    }
    match service.set_permanent_doctor(patient, doctor).await {
        Ok(view) => println!(
            "- Permanent doctor {} -> state {}",
            view.permanent_doctor_id.unwrap_or_default(),
            view.assignment_state.label()
        ),
        Err(err) => println!("- Permanent doctor rejected: {}", err),
    }
    match service.share_follow_up(patient).await {
        Ok(follow_up) => println!("- Shared {} with the permanent doctor", follow_up.id),
        Err(err) => println!("- Sharing refused: {}", err),
    }

    Ok(())
}
