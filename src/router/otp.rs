//! One-time code request handlers.
//!
//! Each handler checks the flow's email precondition, issues a code, and
//! emails it. The code never appears in any response body.

use axum::{Extension, Json, extract::State};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Result, field_error};
use crate::otp::{self, Purpose};
use crate::router::Valid;
use crate::router::account::MessageResponse;
use crate::user::{User, UserRepository};
use crate::AppState;

const ALREADY_REGISTERED: &str = "Email is already registered.";
const NOT_REGISTERED: &str = "Email is not registered.";
const SENT: &str = "OTP sent successfully";

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
}

async fn issue(state: &AppState, purpose: Purpose, email: &str) -> Result<Json<MessageResponse>> {
    let code = otp::generate_code();
    otp::store(&state.cache, purpose, email, &code).await?;
    state.mail.send_code(purpose, email, &code).await?;

    Ok(Json(MessageResponse { msg: SENT.into() }))
}

/// Send a registration code. The email must not belong to an account yet.
pub async fn register(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<MessageResponse>> {
    let repository = UserRepository::new(state.db.postgres.clone());
    if repository.email_exists(&body.email).await? {
        return Err(field_error("email", ALREADY_REGISTERED).into());
    }

    issue(&state, Purpose::Register, &body.email).await
}

/// Send a login code. The email must belong to an account.
pub async fn login(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<MessageResponse>> {
    let repository = UserRepository::new(state.db.postgres.clone());
    if !repository.email_exists(&body.email).await? {
        return Err(field_error("email", NOT_REGISTERED).into());
    }

    issue(&state, Purpose::Login, &body.email).await
}

/// Send a password-reset code. The email must belong to an account.
pub async fn forget_password(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<MessageResponse>> {
    let repository = UserRepository::new(state.db.postgres.clone());
    if !repository.email_exists(&body.email).await? {
        return Err(field_error("email", NOT_REGISTERED).into());
    }

    issue(&state, Purpose::Forget, &body.email).await
}

/// Send a password-update code to the authenticated account's email.
pub async fn update_password(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<MessageResponse>> {
    issue(&state, Purpose::Update, &user.email).await
}
