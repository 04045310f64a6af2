//! One-shot text analysis.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::llm::GeminiClient;
use crate::text;

/// Angle an analysis is run from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Sentiment,
    Performance,
    Interview,
    General,
}

impl AnalysisKind {
    fn instruction(&self) -> &'static str {
        match self {
            AnalysisKind::Sentiment => {
                "Analyze the sentiment and emotional tone of the following text."
            }
            AnalysisKind::Performance => {
                "Evaluate the following text as a description of professional performance."
            }
            AnalysisKind::Interview => {
                "Assess the following text as an interview answer and judge its readiness."
            }
            AnalysisKind::General => "Analyze the following text.",
        }
    }
}

/// Structured report decoded from the model reply. Sections the reply does
/// not carry come back empty. The requested kind travels separately so the
/// response body names it exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisReport {
    pub score: Option<u8>,
    pub summary: String,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
}

fn prompt(kind: AnalysisKind, input: &str) -> String {
    format!(
        "{}\n\nText:\n{input}\n\nReply with:\n\
         Score: <1-10>/10\n\
         Summary: ...\n\
         Insights:\n- ...\n\
         Recommendations:\n- ...",
        kind.instruction()
    )
}

/// Decode a model reply into an [`AnalysisReport`]. The full formatted
/// reply stands in for the summary when no `Summary:` section is present.
pub fn parse_report(raw: &str) -> AnalysisReport {
    let summary = text::extract_section(raw, &["summary"])
        .unwrap_or_else(|| text::format_response(raw));

    AnalysisReport {
        score: text::extract_score(raw),
        summary,
        insights: text::extract_section_items(raw, &["insights", "key insights"]),
        recommendations: text::extract_section_items(raw, &["recommendations"]),
    }
}

/// Run one analysis over sanitized input.
pub async fn analyze(
    llm: &GeminiClient,
    kind: AnalysisKind,
    input: &str,
) -> Result<AnalysisReport> {
    let raw = llm.generate(None, &[], &prompt(kind, input)).await?;
    Ok(parse_report(&raw))
}
