//! Per-user request quotas for the chat and analysis routes.
//!
//! Counters live in the shared cache so every instance sees the same quota.
//! Keys are `rate:{user_id}:{unit}:{window}`; one atomic increment per unit
//! per request, expiry set on the window's first hit.

use chrono::Utc;

use crate::cache::Cache;
use crate::error::{Result, ServerError};

pub const MAX_REQUESTS_PER_MINUTE: i64 = 60;
pub const MAX_REQUESTS_PER_HOUR: i64 = 1000;

const MINUTE_SECS: i64 = 60;
const HOUR_SECS: i64 = 3600;

fn window_key(user_id: &str, unit: &str, window: i64) -> String {
    format!("rate:{user_id}:{unit}:{window}")
}

/// Count this request against both windows, failing with
/// [`ServerError::RateLimited`] once either quota is exhausted.
pub async fn check(cache: &Cache, user_id: &str) -> Result<()> {
    check_at(cache, user_id, Utc::now().timestamp()).await
}

async fn check_at(cache: &Cache, user_id: &str, now: i64) -> Result<()> {
    let minute = cache
        .incr_window(
            &window_key(user_id, "minute", now / MINUTE_SECS),
            MINUTE_SECS as u64,
        )
        .await?;
    if minute > MAX_REQUESTS_PER_MINUTE {
        return Err(ServerError::RateLimited);
    }

    let hour = cache
        .incr_window(
            &window_key(user_id, "hour", now / HOUR_SECS),
            HOUR_SECS as u64,
        )
        .await?;
    if hour > MAX_REQUESTS_PER_HOUR {
        return Err(ServerError::RateLimited);
    }

    Ok(())
}
