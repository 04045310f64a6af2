//! Mock-interview sessions.
//!
//! A session is a cached JSON document under `interview_session:{id}` with a
//! one hour TTL; expiry abandons the interview. Questions are generated one
//! at a time, and writes go through a versioned compare-and-swap so two
//! concurrent answers cannot silently overwrite each other.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::cache::{Cache, CasOutcome};
use crate::error::{Result, ServerError, non_field_error};
use crate::llm::GeminiClient;
use crate::text;

pub const MAX_QUESTIONS: usize = 20;
pub const SESSION_TTL_SECS: u64 = 3600;

const CAS_ATTEMPTS: usize = 3;

pub const SESSION_NOT_FOUND: &str = "Interview session";
const ALREADY_COMPLETED: &str = "Interview is already completed.";
const FEEDBACK_UNAVAILABLE: &str = "Unable to generate feedback for this answer.";

/// Parameters the interview is tailored to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterviewConfig {
    pub role: String,
    pub experience_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Completed,
}

/// Structured feedback on one answer, decoded best-effort from model text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feedback {
    pub score: Option<u8>,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub suggestions: Vec<String>,
    pub text: String,
}

/// One answered question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerRecord {
    pub question: String,
    pub question_number: usize,
    pub answer: String,
    pub feedback: Feedback,
    pub answered_at: i64,
}

/// Closing report once the last question is answered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalSummary {
    pub overall_score: f64,
    pub individual_scores: Vec<Option<u8>>,
    pub questions_answered: usize,
    pub duration: String,
    pub narrative: String,
}

/// Interview session as saved on cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterviewSession {
    pub session_id: String,
    pub user_id: String,
    pub config: InterviewConfig,
    pub questions: Vec<String>,
    pub responses: Vec<AnswerRecord>,
    pub current_question_index: usize,
    pub status: Status,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub final_summary: Option<FinalSummary>,
    pub version: u64,
}

impl InterviewSession {
    /// Question awaiting an answer, if the session is still active.
    pub fn current_question(&self) -> Option<&str> {
        match self.status {
            Status::Active => self
                .questions
                .get(self.current_question_index)
                .map(String::as_str),
            Status::Completed => None,
        }
    }

    /// One-based number of the question awaiting an answer.
    pub fn question_number(&self) -> usize {
        self.current_question_index + 1
    }

    /// Whether the stored index points at an existing question.
    pub fn index_valid(&self) -> bool {
        self.current_question_index < self.questions.len()
    }

    /// Bring a cached document back to a usable shape. Clamps a runaway
    /// index onto the last known question and synthesizes a first question
    /// when the list came back empty, so an interview never strands
    /// mid-flight.
    fn repair(&mut self) -> bool {
        let mut changed = false;

        if self.questions.is_empty() && self.status == Status::Active {
            self.questions.push(fallback_question(&self.config.role));
            self.current_question_index = 0;
            changed = true;
        }

        if self.status == Status::Active && !self.index_valid() {
            self.current_question_index = self.questions.len().saturating_sub(1);
            changed = true;
        }

        if changed {
            tracing::warn!(session_id = %self.session_id, "repaired interview session");
        }

        changed
    }
}

fn key(session_id: &str) -> String {
    format!("interview_session:{session_id}")
}

fn new_session_id(user_id: &str) -> String {
    format!("interview_{user_id}_{}", Utc::now().timestamp())
}

/// Question used when generation yields nothing usable.
pub fn fallback_question(role: &str) -> String {
    format!("Can you tell me about your experience with {role} responsibilities?")
}

fn position_phrase(config: &InterviewConfig) -> String {
    let industry = config
        .industry
        .as_deref()
        .map(|industry| format!(" in the {industry} industry"))
        .unwrap_or_default();
    format!("{} {} position{industry}", config.experience_level, config.role)
}

fn question_prompt(config: &InterviewConfig, asked: &[String]) -> String {
    let mut prompt = format!(
        "You are interviewing a candidate for a {}. \
         Ask one interview question. Reply with the question only.",
        position_phrase(config)
    );

    if !asked.is_empty() {
        prompt.push_str("\nDo not repeat any of these already asked questions:\n");
        for question in asked {
            prompt.push_str("- ");
            prompt.push_str(question);
            prompt.push('\n');
        }
    }

    prompt
}

fn feedback_prompt(config: &InterviewConfig, question: &str, answer: &str) -> String {
    format!(
        "You are interviewing a candidate for a {}.\n\
         Question: {question}\n\
         Candidate answer: {answer}\n\n\
         Evaluate the answer. Reply with:\n\
         Score: <1-10>/10\n\
         Strengths:\n- ...\n\
         Areas for improvement:\n- ...\n\
         Suggestions:\n- ...",
        position_phrase(config)
    )
}

fn summary_prompt(session: &InterviewSession) -> String {
    let mut prompt = format!(
        "The candidate just finished a mock interview for a {}. \
         Write a short closing assessment (3-4 sentences) of their overall \
         performance based on this transcript:\n",
        position_phrase(&session.config)
    );
    for record in &session.responses {
        prompt.push_str(&format!(
            "Q{}: {}\nA: {}\n",
            record.question_number, record.question, record.answer
        ));
    }
    prompt
}

/// Decode model feedback text into its structured parts. Anything the text
/// does not carry stays empty.
pub fn parse_feedback(raw: &str) -> Feedback {
    Feedback {
        score: text::extract_score(raw),
        strengths: text::extract_section_items(raw, &["strengths"]),
        improvements: text::extract_section_items(
            raw,
            &["areas for improvement", "improvements"],
        ),
        suggestions: text::extract_section_items(raw, &["suggestions"]),
        text: text::format_response(raw),
    }
}

fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{}m {}s", seconds / 60, seconds % 60)
}

/// Mean of the scores the model actually produced; 0 when none were.
pub fn build_summary(session: &InterviewSession, now: i64, narrative: String) -> FinalSummary {
    let individual_scores: Vec<Option<u8>> = session
        .responses
        .iter()
        .map(|record| record.feedback.score)
        .collect();

    let present: Vec<u8> = individual_scores.iter().filter_map(|score| *score).collect();
    let overall_score = if present.is_empty() {
        0.0
    } else {
        present.iter().map(|score| f64::from(*score)).sum::<f64>() / present.len() as f64
    };

    FinalSummary {
        overall_score,
        individual_scores,
        questions_answered: session.responses.len(),
        duration: format_duration(now - session.start_time),
        narrative,
    }
}

/// Interview manager.
#[derive(Clone)]
pub struct InterviewService {
    cache: Cache,
    llm: GeminiClient,
}

impl InterviewService {
    /// Create a new [`InterviewService`].
    pub fn new(cache: Cache, llm: GeminiClient) -> Self {
        Self { cache, llm }
    }

    /// Ask the model for the next question; fall back to the template when
    /// generation fails or produces nothing usable.
    async fn next_question(&self, config: &InterviewConfig, asked: &[String]) -> String {
        let generated = self
            .llm
            .generate(None, &[], &question_prompt(config, asked))
            .await
            .unwrap_or_default();

        let question = text::format_response(&generated);
        if generated.trim().is_empty() || question.len() < 10 {
            fallback_question(&config.role)
        } else {
            question
        }
    }

    /// Start a fresh session with its first question.
    pub async fn start(
        &self,
        user_id: &str,
        config: InterviewConfig,
    ) -> Result<InterviewSession> {
        let first_question = self.next_question(&config, &[]).await;

        let session = InterviewSession {
            session_id: new_session_id(user_id),
            user_id: user_id.to_owned(),
            config,
            questions: vec![first_question],
            responses: Vec::new(),
            current_question_index: 0,
            status: Status::Active,
            start_time: Utc::now().timestamp(),
            end_time: None,
            final_summary: None,
            version: 1,
        };

        match self
            .cache
            .cas_json(&key(&session.session_id), 0, &session, SESSION_TTL_SECS)
            .await?
        {
            CasOutcome::Stored => Ok(session),
            // Same user, same second. The existing document wins.
            _ => self.load(user_id, &session.session_id).await,
        }
    }

    /// Load a session owned by `user_id`. Ownership mismatch reads as
    /// absence, so session ids do not leak across accounts.
    pub async fn load(&self, user_id: &str, session_id: &str) -> Result<InterviewSession> {
        let mut session: InterviewSession = self
            .cache
            .get_json(&key(session_id))
            .await?
            .ok_or(ServerError::NotFound(SESSION_NOT_FOUND))?;

        if session.user_id != user_id {
            return Err(ServerError::NotFound(SESSION_NOT_FOUND));
        }

        if session.repair() {
            let expected = session.version;
            session.version += 1;
            // A conflict here means someone else already moved the session
            // forward; their copy is the repaired truth.
            self.cache
                .cas_json(&key(session_id), expected, &session, SESSION_TTL_SECS)
                .await?;
        }

        Ok(session)
    }

    /// Record an answer to the current question, attach feedback, and
    /// either ask the next question or close the interview.
    pub async fn submit_answer(
        &self,
        user_id: &str,
        session_id: &str,
        answer: &str,
    ) -> Result<InterviewSession> {
        let mut session = self.load(user_id, session_id).await?;

        for _ in 0..CAS_ATTEMPTS {
            let question = match session.current_question() {
                Some(question) => question.to_owned(),
                None => return Err(non_field_error(ALREADY_COMPLETED).into()),
            };

            let feedback = match self
                .llm
                .generate(
                    None,
                    &[],
                    &feedback_prompt(&session.config, &question, answer),
                )
                .await
            {
                Ok(raw) => parse_feedback(&raw),
                Err(err) => {
                    tracing::warn!(%session_id, error = %err, "feedback generation failed");
                    Feedback {
                        text: FEEDBACK_UNAVAILABLE.to_owned(),
                        ..Default::default()
                    }
                }
            };

            let now = Utc::now().timestamp();
            session.responses.push(AnswerRecord {
                question,
                question_number: session.question_number(),
                answer: answer.to_owned(),
                feedback,
                answered_at: now,
            });

            if session.question_number() >= MAX_QUESTIONS {
                session.status = Status::Completed;
                session.end_time = Some(now);

                let narrative = self
                    .llm
                    .generate(None, &[], &summary_prompt(&session))
                    .await
                    .map(|raw| text::format_response(&raw))
                    .unwrap_or_default();
                session.final_summary = Some(build_summary(&session, now, narrative));
            } else {
                let next = self.next_question(&session.config, &session.questions).await;
                session.questions.push(next);
                session.current_question_index += 1;
            }

            let expected = session.version;
            session.version += 1;

            match self
                .cache
                .cas_json(&key(session_id), expected, &session, SESSION_TTL_SECS)
                .await?
            {
                CasOutcome::Stored => return Ok(session),
                CasOutcome::Missing => {
                    return Err(ServerError::NotFound(SESSION_NOT_FOUND));
                }
                CasOutcome::Conflict => {
                    tracing::debug!(%session_id, "interview write conflict, retrying");
                    session = self.load(user_id, session_id).await?;
                }
            }
        }

        Err(non_field_error(
            "Interview session is being updated elsewhere. Please retry.",
        )
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> InterviewConfig {
        InterviewConfig {
            role: "backend engineer".into(),
            experience_level: "senior".into(),
            industry: None,
        }
    }

    fn session(questions: Vec<String>) -> InterviewSession {
        InterviewSession {
            session_id: "interview_u_0".into(),
            user_id: "u".into(),
            config: config(),
            questions,
            responses: Vec::new(),
            current_question_index: 0,
            status: Status::Active,
            start_time: 0,
            end_time: None,
            final_summary: None,
            version: 1,
        }
    }

    fn answered(score: Option<u8>) -> AnswerRecord {
        AnswerRecord {
            question: "q".into(),
            question_number: 1,
            answer: "a".into(),
            feedback: Feedback {
                score,
                ..Default::default()
            },
            answered_at: 0,
        }
    }

    #[test]
    fn test_repair_synthesizes_first_question() {
        let mut broken = session(vec![]);
        broken.current_question_index = 5;

        assert!(broken.repair());
        assert_eq!(
            broken.questions,
            vec!["Can you tell me about your experience with backend engineer responsibilities?"]
        );
        assert_eq!(broken.current_question_index, 0);
        assert!(broken.index_valid());
    }

    #[test]
    fn test_repair_clamps_index_onto_last_question() {
        let mut broken = session(vec!["q1".into(), "q2".into()]);
        broken.current_question_index = 9;

        assert!(broken.repair());
        assert_eq!(broken.current_question_index, 1);
    }

    #[test]
    fn test_repair_is_idempotent() {
        let mut broken = session(vec![]);
        assert!(broken.repair());
        assert!(!broken.repair());
    }

    #[test]
    fn test_repair_leaves_sane_sessions_alone() {
        let mut fine = session(vec!["q1".into()]);
        assert!(!fine.repair());
    }

    #[test]
    fn test_current_question_none_when_completed() {
        let mut done = session(vec!["q1".into()]);
        done.status = Status::Completed;
        assert_eq!(done.current_question(), None);
    }

    #[test]
    fn test_parse_feedback_sections() {
        let feedback = parse_feedback(
            "Score: 8/10\nStrengths:\n- clear\nAreas for improvement:\n- depth\nSuggestions:\n- examples",
        );
        assert_eq!(feedback.score, Some(8));
        assert_eq!(feedback.strengths, vec!["clear"]);
        assert_eq!(feedback.improvements, vec!["depth"]);
        assert_eq!(feedback.suggestions, vec!["examples"]);
    }

    #[test]
    fn test_parse_feedback_degrades_gracefully() {
        let feedback = parse_feedback("Nice answer overall");
        assert_eq!(feedback.score, None);
        assert!(feedback.strengths.is_empty());
        assert_eq!(feedback.text, "Nice answer overall.");
    }

    #[test]
    fn test_summary_means_present_scores_only() {
        let mut done = session(vec![]);
        done.responses = vec![answered(Some(6)), answered(None), answered(Some(10))];

        let summary = build_summary(&done, 185, String::new());
        assert_eq!(summary.overall_score, 8.0);
        assert_eq!(summary.individual_scores, vec![Some(6), None, Some(10)]);
        assert_eq!(summary.questions_answered, 3);
        assert_eq!(summary.duration, "3m 5s");
    }

    #[test]
    fn test_summary_without_scores_is_zero() {
        let mut done = session(vec![]);
        done.responses = vec![answered(None)];
        assert_eq!(build_summary(&done, 60, String::new()).overall_score, 0.0);
    }

    #[test]
    fn test_duration_never_negative() {
        let done = session(vec![]);
        assert_eq!(build_summary(&done, -5, String::new()).duration, "0m 0s");
    }

    #[test]
    fn test_question_prompt_avoids_repeats() {
        let prompt = question_prompt(&config(), &["What is Rust?".into()]);
        assert!(prompt.contains("Do not repeat"));
        assert!(prompt.contains("What is Rust?"));

        let first = question_prompt(&config(), &[]);
        assert!(!first.contains("Do not repeat"));
    }

    #[test]
    fn test_position_phrase_mentions_industry_when_set() {
        let mut with_industry = config();
        with_industry.industry = Some("fintech".into());
        assert!(position_phrase(&with_industry).contains("in the fintech industry"));
        assert!(!position_phrase(&config()).contains("industry"));
    }

    // Without an API key the service runs entirely on fallbacks, which is
    // exactly what these flow tests need: no network, deterministic text.
    fn offline_service(cache: Cache) -> InterviewService {
        InterviewService::new(
            cache,
            GeminiClient::new(&crate::config::Llm::default(), None),
        )
    }

    async fn seed(cache: &Cache, session: &InterviewSession) {
        cache
            .set_json(&key(&session.session_id), session, SESSION_TTL_SECS)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_start_persists_session_with_first_question() {
        let cache = Cache::memory();
        let service = offline_service(cache.clone());

        let started = service.start("u", config()).await.unwrap();
        assert_eq!(started.status, Status::Active);
        assert_eq!(
            started.questions,
            vec![fallback_question("backend engineer")]
        );

        let loaded = service.load("u", &started.session_id).await.unwrap();
        assert_eq!(loaded, started);
    }

    #[tokio::test]
    async fn test_load_hides_sessions_from_other_accounts() {
        let cache = Cache::memory();
        let service = offline_service(cache.clone());
        seed(&cache, &session(vec!["q1".into()])).await;

        assert!(service.load("u", "interview_u_0").await.is_ok());
        assert!(matches!(
            service.load("someone-else", "interview_u_0").await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_answer_advances_to_a_new_question() {
        let cache = Cache::memory();
        let service = offline_service(cache.clone());
        seed(&cache, &session(vec!["q1".into()])).await;

        let updated = service
            .submit_answer("u", "interview_u_0", "my answer")
            .await
            .unwrap();

        assert_eq!(updated.status, Status::Active);
        assert_eq!(updated.responses.len(), 1);
        assert_eq!(updated.responses[0].question_number, 1);
        assert_eq!(updated.responses[0].feedback.text, FEEDBACK_UNAVAILABLE);
        assert_eq!(updated.questions.len(), 2);
        assert_eq!(updated.current_question_index, 1);
    }

    #[tokio::test]
    async fn test_final_answer_completes_without_extra_question() {
        let cache = Cache::memory();
        let service = offline_service(cache.clone());

        let mut nearly_done = session((1..=MAX_QUESTIONS).map(|n| format!("q{n}")).collect());
        nearly_done.current_question_index = MAX_QUESTIONS - 1;
        nearly_done.responses = (1..MAX_QUESTIONS).map(|_| answered(Some(7))).collect();
        seed(&cache, &nearly_done).await;

        let done = service
            .submit_answer("u", "interview_u_0", "closing answer")
            .await
            .unwrap();

        assert_eq!(done.status, Status::Completed);
        assert_eq!(done.questions.len(), MAX_QUESTIONS);
        assert_eq!(done.responses.len(), MAX_QUESTIONS);
        assert!(done.end_time.is_some());

        let summary = done.final_summary.unwrap();
        assert_eq!(summary.questions_answered, MAX_QUESTIONS);
        assert_eq!(summary.individual_scores.len(), MAX_QUESTIONS);
    }

    #[tokio::test]
    async fn test_completed_session_rejects_further_answers() {
        let cache = Cache::memory();
        let service = offline_service(cache.clone());

        let mut done = session(vec!["q1".into()]);
        done.status = Status::Completed;
        seed(&cache, &done).await;

        assert!(
            service
                .submit_answer("u", "interview_u_0", "one more")
                .await
                .is_err()
        );
    }
}
