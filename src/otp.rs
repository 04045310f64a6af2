//! One-time codes.
//!
//! Six-digit numeric codes keyed by `otp:{purpose}:{email}` with a 10 minute
//! TTL. Issuing overwrites any live code for the same purpose and email;
//! a code is deleted only after a successful match, so a failed attempt
//! does not burn it.

use rand::Rng;

use crate::cache::Cache;
use crate::error::Result;

pub const OTP_TTL_SECS: u64 = 600;

/// Flow a one-time code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Register,
    Login,
    Forget,
    Update,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Register => "register",
            Purpose::Login => "login",
            Purpose::Forget => "forget",
            Purpose::Update => "update",
        }
    }
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn key(purpose: Purpose, email: &str) -> String {
    format!("otp:{purpose}:{email}")
}

/// Generate a fresh 6-digit code.
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Store a code under `(purpose, email)`, replacing any prior one.
pub async fn store(cache: &Cache, purpose: Purpose, email: &str, code: &str) -> Result<()> {
    cache.set(&key(purpose, email), code, OTP_TTL_SECS).await
}

/// Validate a submitted code. Consumes (deletes) it on the first successful
/// match; returns `false` on mismatch or expiry without touching the entry.
pub async fn verify_and_consume(
    cache: &Cache,
    purpose: Purpose,
    email: &str,
    submitted: &str,
) -> Result<bool> {
    let key = key(purpose, email);
    match cache.get(&key).await? {
        Some(stored) if !submitted.is_empty() && stored == submitted => {
            cache.delete(&key).await?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_code_is_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert!(!code.starts_with('0'));
        }
    }

    #[test]
    fn test_cache_key_layout() {
        assert_eq!(key(Purpose::Register, "a@x.com"), "otp:register:a@x.com");
        assert_eq!(key(Purpose::Forget, "a@x.com"), "otp:forget:a@x.com");
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let cache = Cache::memory();
        store(&cache, Purpose::Register, "a@x.com", "123456")
            .await
            .unwrap();

        assert!(
            verify_and_consume(&cache, Purpose::Register, "a@x.com", "123456")
                .await
                .unwrap()
        );
        assert!(
            !verify_and_consume(&cache, Purpose::Register, "a@x.com", "123456")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_failed_attempt_keeps_code_alive() {
        let cache = Cache::memory();
        store(&cache, Purpose::Register, "a@x.com", "123456")
            .await
            .unwrap();

        assert!(
            !verify_and_consume(&cache, Purpose::Register, "a@x.com", "654321")
                .await
                .unwrap()
        );
        assert!(
            !verify_and_consume(&cache, Purpose::Register, "a@x.com", "")
                .await
                .unwrap()
        );

        // The stored code survives the bad guesses.
        assert!(
            verify_and_consume(&cache, Purpose::Register, "a@x.com", "123456")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_reissue_overwrites_previous_code() {
        let cache = Cache::memory();
        store(&cache, Purpose::Login, "a@x.com", "111111")
            .await
            .unwrap();
        store(&cache, Purpose::Login, "a@x.com", "222222")
            .await
            .unwrap();

        assert!(
            !verify_and_consume(&cache, Purpose::Login, "a@x.com", "111111")
                .await
                .unwrap()
        );
        assert!(
            verify_and_consume(&cache, Purpose::Login, "a@x.com", "222222")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_purposes_are_isolated() {
        let cache = Cache::memory();
        store(&cache, Purpose::Register, "a@x.com", "123456")
            .await
            .unwrap();

        assert!(
            !verify_and_consume(&cache, Purpose::Login, "a@x.com", "123456")
                .await
                .unwrap()
        );
    }
}
