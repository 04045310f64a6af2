//! Conversational assistant state.
//!
//! History lives in the cache under `conversation:{conversation_id}:{user_id}`
//! and expires one hour after the last exchange. Writes keep the last 20
//! messages; prompts sent to the model carry the last 10.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::cache::Cache;
use crate::error::Result;
use crate::llm::{Role, Turn};

pub const HISTORY_TTL_SECS: u64 = 3600;
pub const STORED_MESSAGE_CAP: usize = 20;
pub const PROMPT_MESSAGE_CAP: usize = 10;

pub const SYSTEM_PROMPT: &str = "You are SakSin, an interview preparation assistant. \
Help the user practice for job interviews: answer questions about interview technique, \
review their answers, and suggest improvements. Keep replies focused and encouraging.";

/// One stored message of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Mint a conversation id bound to its owner.
pub fn new_conversation_id(user_id: &str) -> String {
    format!("conv_{user_id}_{}", Utc::now().timestamp())
}

fn key(conversation_id: &str, user_id: &str) -> String {
    format!("conversation:{conversation_id}:{user_id}")
}

/// Load the stored history for a conversation; empty when expired or new.
pub async fn load_history(
    cache: &Cache,
    conversation_id: &str,
    user_id: &str,
) -> Result<Vec<StoredMessage>> {
    Ok(cache
        .get_json(&key(conversation_id, user_id))
        .await?
        .unwrap_or_default())
}

/// Append a prompt/reply exchange, truncating to the newest
/// [`STORED_MESSAGE_CAP`] messages and refreshing the expiry.
pub async fn append_exchange(
    cache: &Cache,
    conversation_id: &str,
    user_id: &str,
    prompt: &str,
    reply: &str,
) -> Result<()> {
    let mut history = load_history(cache, conversation_id, user_id).await?;
    let now = Utc::now().timestamp();

    history.push(StoredMessage {
        role: MessageRole::User,
        content: prompt.to_owned(),
        timestamp: now,
    });
    history.push(StoredMessage {
        role: MessageRole::Assistant,
        content: reply.to_owned(),
        timestamp: now,
    });

    cap_stored(&mut history);

    cache
        .set_json(&key(conversation_id, user_id), &history, HISTORY_TTL_SECS)
        .await
}

/// Drop the oldest messages beyond [`STORED_MESSAGE_CAP`].
fn cap_stored(history: &mut Vec<StoredMessage>) {
    if history.len() > STORED_MESSAGE_CAP {
        history.drain(..history.len() - STORED_MESSAGE_CAP);
    }
}

/// Convert the newest stored messages into model turns.
pub fn to_turns(history: &[StoredMessage]) -> Vec<Turn> {
    let start = history.len().saturating_sub(PROMPT_MESSAGE_CAP);
    history[start..]
        .iter()
        .map(|message| Turn {
            role: match message.role {
                MessageRole::User => Role::User,
                MessageRole::Assistant => Role::Model,
            },
            text: message.content.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(role: MessageRole, content: &str) -> StoredMessage {
        StoredMessage {
            role,
            content: content.to_owned(),
            timestamp: 0,
        }
    }

    #[test]
    fn test_conversation_id_carries_owner() {
        let id = new_conversation_id("user-1");
        assert!(id.starts_with("conv_user-1_"));
    }

    #[test]
    fn test_cache_key_layout() {
        assert_eq!(key("conv_u_1", "u"), "conversation:conv_u_1:u");
    }

    #[test]
    fn test_to_turns_caps_at_prompt_window() {
        let history: Vec<_> = (0..15)
            .map(|i| message(MessageRole::User, &format!("m{i}")))
            .collect();

        let turns = to_turns(&history);
        assert_eq!(turns.len(), PROMPT_MESSAGE_CAP);
        assert_eq!(turns.first().map(|t| t.text.as_str()), Some("m5"));
        assert_eq!(turns.last().map(|t| t.text.as_str()), Some("m14"));
    }

    #[test]
    fn test_stored_history_caps_at_twenty() {
        let mut history: Vec<_> = (0..22)
            .map(|i| message(MessageRole::User, &format!("m{i}")))
            .collect();

        cap_stored(&mut history);
        assert_eq!(history.len(), STORED_MESSAGE_CAP);
        assert_eq!(history.first().map(|m| m.content.as_str()), Some("m2"));
        assert_eq!(history.last().map(|m| m.content.as_str()), Some("m21"));
    }

    #[test]
    fn test_roles_map_to_model_turns() {
        let history = vec![
            message(MessageRole::User, "hi"),
            message(MessageRole::Assistant, "hello"),
        ];
        let turns = to_turns(&history);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Model);
    }
}
