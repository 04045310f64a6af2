//! Generative AI (Gemini) client.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::Llm;
use crate::error::{Result, ServerError};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const TEMPERATURE: f64 = 0.7;
const MAX_OUTPUT_TOKENS: u32 = 4096;
const TOP_P: f64 = 0.9;
const TOP_K: u32 = 40;

/// One conversation turn as the provider expects it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
    top_p: f64,
    top_k: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Client for the generative AI provider.
///
/// Holds a pool of API keys drawn from `GEMINI_API_KEYS`; each request picks
/// one at random, which spreads per-key quota across the pool.
#[derive(Debug, Clone, Default)]
pub struct GeminiClient {
    http: reqwest::Client,
    model: String,
    keys: Vec<String>,
}

impl GeminiClient {
    /// Create a new [`GeminiClient`]. `keys` is a comma-separated pool.
    pub fn new(config: &Llm, keys: Option<String>) -> Self {
        let keys = keys
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_owned)
            .collect();

        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_default(),
            model: config.model.clone(),
            keys,
        }
    }

    /// Whether at least one API key is available.
    pub fn is_configured(&self) -> bool {
        !self.keys.is_empty()
    }

    fn pick_key(&self) -> Result<&str> {
        if self.keys.is_empty() {
            return Err(ServerError::internal("no gemini api key configured"));
        }
        let index = rand::thread_rng().gen_range(0..self.keys.len());
        Ok(&self.keys[index])
    }

    /// Run one completion over an optional system instruction, prior turns
    /// and the new user prompt. Returns the raw model text, possibly empty
    /// when the provider withholds a candidate.
    pub async fn generate(
        &self,
        system: Option<&str>,
        history: &[Turn],
        prompt: &str,
    ) -> Result<String> {
        let key = self.pick_key()?;

        let mut contents: Vec<Content> = history
            .iter()
            .map(|turn| Content {
                role: match turn.role {
                    Role::User => "user",
                    Role::Model => "model",
                },
                parts: vec![Part { text: &turn.text }],
            })
            .collect();
        contents.push(Content {
            role: "user",
            parts: vec![Part { text: prompt }],
        });

        let request = GenerateRequest {
            contents,
            system_instruction: system.map(|text| SystemInstruction {
                parts: vec![Part { text }],
            }),
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
                top_p: TOP_P,
                top_k: TOP_K,
            },
        };

        let url = format!("{API_BASE}/{}:generateContent", self.model);
        let response: GenerateResponse = self
            .http
            .post(&url)
            .query(&[("key", key)])
            .json(&request)
            .send()
            .await
            .map_err(|err| ServerError::upstream("gemini", err))?
            .error_for_status()
            .map_err(|err| ServerError::upstream("gemini", err))?
            .json()
            .await
            .map_err(|err| ServerError::upstream("gemini", err))?;

        let text = response
            .candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .map(|part| part.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(keys: Option<&str>) -> GeminiClient {
        GeminiClient::new(&Llm::default(), keys.map(str::to_owned))
    }

    #[test]
    fn test_key_pool_parsing() {
        assert!(!client(None).is_configured());
        assert!(!client(Some("  ,  ")).is_configured());

        let pooled = client(Some("key-a, key-b,key-c"));
        assert!(pooled.is_configured());
        assert_eq!(pooled.keys, vec!["key-a", "key-b", "key-c"]);
    }

    #[test]
    fn test_pick_key_without_pool_fails() {
        assert!(client(None).pick_key().is_err());
    }

    #[test]
    fn test_pick_key_stays_in_pool() {
        let pooled = client(Some("one,two"));
        for _ in 0..20 {
            let key = pooled.pick_key().unwrap();
            assert!(key == "one" || key == "two");
        }
    }
}
