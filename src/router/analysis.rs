//! Text analysis handler.

use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::analysis::{self, AnalysisKind, AnalysisReport};
use crate::error::{Result, non_field_error};
use crate::ratelimit;
use crate::router::Valid;
use crate::text;
use crate::user::User;
use crate::AppState;

const INVALID_INPUT: &str = "Text is empty, too long, or contains forbidden content.";

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    pub text: String,
    #[serde(default = "default_kind")]
    pub analysis_type: AnalysisKind,
}

fn default_kind() -> AnalysisKind {
    AnalysisKind::General
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    #[serde(flatten)]
    pub report: AnalysisReport,
    pub analysis_type: AnalysisKind,
    pub input_length: usize,
}

/// Handler running one analysis over the submitted text.
pub async fn analyze(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Valid(body): Valid<Body>,
) -> Result<Json<Response>> {
    if !text::validate_prompt(&body.text) {
        return Err(non_field_error(INVALID_INPUT).into());
    }
    ratelimit::check(&state.cache, &user.id).await?;

    let input = text::sanitize_input(&body.text);
    let report = analysis::analyze(&state.llm, body.analysis_type, &input).await?;

    Ok(Json(Response {
        analysis_type: body.analysis_type,
        input_length: input.len(),
        report,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_names_the_kind_exactly_once() {
        let response = Response {
            report: analysis::parse_report("Score: 6/10\nSummary: Fine."),
            analysis_type: AnalysisKind::Sentiment,
            input_length: 5,
        };

        let value = serde_json::to_value(&response).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object["analysis_type"], "sentiment");
        assert!(!object.contains_key("kind"));
        assert_eq!(object["score"], 6);
    }
}
