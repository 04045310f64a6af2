//! Password change and reset handlers.

use axum::{Extension, Json, extract::State};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Result, ServerError, non_field_error};
use crate::otp::{self, Purpose};
use crate::router::{INVALID_OTP, Valid};
use crate::router::account::MessageResponse;
use crate::user::{User, UserRepository};
use crate::AppState;

const INCORRECT_PASSWORD: &str = "Current password is incorrect.";

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ChangeBody {
    #[validate(length(min = 1, message = "Password must not be empty."))]
    pub old_password: String,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    pub new_password: String,
    pub otp: String,
}

/// Handler to change the authenticated account's password. Requires the
/// current password and a fresh `update` code.
pub async fn change(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Valid(body): Valid<ChangeBody>,
) -> Result<Json<MessageResponse>> {
    if !otp::verify_and_consume(&state.cache, Purpose::Update, &user.email, &body.otp).await? {
        return Err(non_field_error(INVALID_OTP).into());
    }

    if !state
        .crypto
        .verify_password(&body.old_password, &user.password)
    {
        return Err(non_field_error(INCORRECT_PASSWORD).into());
    }

    let hash = state
        .crypto
        .hash_password(&body.new_password)
        .map_err(ServerError::internal)?;
    UserRepository::new(state.db.postgres.clone())
        .update_password(&user.id, &hash)
        .await?;

    Ok(Json(MessageResponse {
        msg: "Password updated successfully.".into(),
    }))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ResetBody {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    pub otp: String,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    pub new_password: String,
}

/// Handler to reset a forgotten password with a `forget` code. No old
/// password needed.
pub async fn reset(
    State(state): State<AppState>,
    Valid(body): Valid<ResetBody>,
) -> Result<Json<MessageResponse>> {
    if !otp::verify_and_consume(&state.cache, Purpose::Forget, &body.email, &body.otp).await? {
        return Err(non_field_error(INVALID_OTP).into());
    }

    let repository = UserRepository::new(state.db.postgres.clone());
    let user = repository.find_by_email(&body.email).await?;

    let hash = state
        .crypto
        .hash_password(&body.new_password)
        .map_err(ServerError::internal)?;
    repository.update_password(&user.id, &hash).await?;

    Ok(Json(MessageResponse {
        msg: "Password reset successfully.".into(),
    }))
}
