//! Conversational assistant handlers.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::chat::{self, StoredMessage};
use crate::error::{Result, field_error, non_field_error};
use crate::ratelimit;
use crate::router::Valid;
use crate::text;
use crate::user::User;
use crate::AppState;

const INVALID_MESSAGE: &str = "Message is empty, too long, or contains forbidden content.";

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct SendBody {
    pub message: String,
    pub conversation_id: Option<String>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct SendResponse {
    pub reply: String,
    pub conversation_id: String,
}

/// Handler forwarding a message to the assistant within its conversation.
pub async fn send(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Valid(body): Valid<SendBody>,
) -> Result<Json<SendResponse>> {
    if !text::validate_prompt(&body.message) {
        return Err(non_field_error(INVALID_MESSAGE).into());
    }
    ratelimit::check(&state.cache, &user.id).await?;

    let message = text::sanitize_input(&body.message);
    let conversation_id = body
        .conversation_id
        .unwrap_or_else(|| chat::new_conversation_id(&user.id));

    let history = chat::load_history(&state.cache, &conversation_id, &user.id).await?;
    let raw = state
        .llm
        .generate(Some(chat::SYSTEM_PROMPT), &chat::to_turns(&history), &message)
        .await?;
    let reply = text::format_response(&raw);

    chat::append_exchange(&state.cache, &conversation_id, &user.id, &message, &reply)
        .await?;

    Ok(Json(SendResponse {
        reply,
        conversation_id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub conversation_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub conversation_id: String,
    pub messages: Vec<StoredMessage>,
    pub count: usize,
}

/// Handler returning the newest stored messages of a conversation,
/// chronological.
pub async fn history(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>> {
    if params.conversation_id.trim().is_empty() {
        return Err(
            field_error("conversation_id", "Conversation id must not be empty.").into(),
        );
    }

    let full = chat::load_history(&state.cache, &params.conversation_id, &user.id).await?;
    let start = full.len().saturating_sub(chat::PROMPT_MESSAGE_CAP);
    let messages = full[start..].to_vec();

    Ok(Json(HistoryResponse {
        conversation_id: params.conversation_id,
        count: messages.len(),
        messages,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::{app, make_request, test_state};

    #[tokio::test]
    async fn test_send_requires_authorization() {
        let response = make_request(
            None,
            app(test_state()),
            Method::POST,
            "/chat/send",
            json!({"message": "hello"}).to_string(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_history_requires_authorization() {
        let response = make_request(
            None,
            app(test_state()),
            Method::GET,
            "/chat/history?conversation_id=conv_u_0",
            String::new(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
