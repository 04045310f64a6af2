//! Mock-interview handlers.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Result, non_field_error};
use crate::interview::{
    FinalSummary, Feedback, InterviewConfig, InterviewService, MAX_QUESTIONS, Status,
};
use crate::router::Valid;
use crate::text;
use crate::user::User;
use crate::AppState;

const INVALID_ANSWER: &str = "Answer is empty, too long, or contains forbidden content.";

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct StartBody {
    #[validate(length(min = 1, message = "Role must not be empty."))]
    pub role: Option<String>,
    /// Alias for `role`; wins when both are present.
    pub position: Option<String>,
    #[validate(length(min = 1, message = "Experience level must not be empty."))]
    pub experience_level: Option<String>,
    pub industry: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionInfo {
    pub role: String,
    pub experience_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    pub question_number: usize,
    pub total_questions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub session_id: String,
    pub question: String,
    pub session_info: SessionInfo,
}

/// Handler to start a new mock interview.
pub async fn start(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Valid(body): Valid<StartBody>,
) -> Result<Json<StartResponse>> {
    let role = body
        .position
        .or(body.role)
        .map(|role| role.trim().to_owned())
        .filter(|role| !role.is_empty())
        .ok_or_else(|| non_field_error("Role is required."))?;

    let config = InterviewConfig {
        role,
        experience_level: body
            .experience_level
            .unwrap_or_else(|| "mid-level".to_owned()),
        industry: body.industry,
    };

    let service = InterviewService::new(state.cache.clone(), state.llm.clone());
    let session = service.start(&user.id, config).await?;

    let question = session
        .current_question()
        .unwrap_or_default()
        .to_owned();
    Ok(Json(StartResponse {
        session_id: session.session_id.clone(),
        question,
        session_info: SessionInfo {
            role: session.config.role.clone(),
            experience_level: session.config.experience_level.clone(),
            industry: session.config.industry.clone(),
            question_number: session.question_number(),
            total_questions: MAX_QUESTIONS,
        },
    }))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct AnswerBody {
    #[validate(length(min = 1, message = "Session id must not be empty."))]
    pub session_id: String,
    pub answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub status: String,
    pub feedback: Feedback,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_summary: Option<FinalSummary>,
    pub progress: Progress,
}

/// Handler recording an answer and returning feedback plus either the next
/// question or the closing summary.
pub async fn answer(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Valid(body): Valid<AnswerBody>,
) -> Result<Json<AnswerResponse>> {
    if !text::validate_prompt(&body.answer) {
        return Err(non_field_error(INVALID_ANSWER).into());
    }
    let answer = text::sanitize_input(&body.answer);

    let service = InterviewService::new(state.cache.clone(), state.llm.clone());
    let session = service
        .submit_answer(&user.id, &body.session_id, &answer)
        .await?;

    let feedback = session
        .responses
        .last()
        .map(|record| record.feedback.clone())
        .unwrap_or_default();
    let progress = Progress {
        answered: session.responses.len(),
        total: MAX_QUESTIONS,
    };

    Ok(Json(match session.status {
        Status::Completed => AnswerResponse {
            status: "completed".into(),
            feedback,
            next_question: None,
            final_summary: session.final_summary,
            progress,
        },
        Status::Active => AnswerResponse {
            status: "continue".into(),
            feedback,
            next_question: session.current_question().map(str::to_owned),
            final_summary: None,
            progress,
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DebugInfo {
    pub current_question_index: usize,
    pub questions_in_cache: usize,
    pub responses_submitted: usize,
    pub index_valid: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub session_id: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_question: Option<String>,
    pub progress: Progress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_summary: Option<FinalSummary>,
    pub debug_info: DebugInfo,
}

/// Handler returning a snapshot of a session.
pub async fn status(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(params): Query<StatusParams>,
) -> Result<Json<StatusResponse>> {
    let service = InterviewService::new(state.cache.clone(), state.llm.clone());
    let session = service.load(&user.id, &params.session_id).await?;

    Ok(Json(StatusResponse {
        session_id: session.session_id.clone(),
        status: session.status,
        current_question: session.current_question().map(str::to_owned),
        progress: Progress {
            answered: session.responses.len(),
            total: MAX_QUESTIONS,
        },
        debug_info: DebugInfo {
            current_question_index: session.current_question_index,
            questions_in_cache: session.questions.len(),
            responses_submitted: session.responses.len(),
            index_valid: session.index_valid(),
        },
        final_summary: session.final_summary,
    }))
}
