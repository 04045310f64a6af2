//! Registration, login and token handlers.

use axum::http::StatusCode;
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Result, ServerError, non_field_error};
use crate::otp::{self, Purpose};
use crate::router::{INVALID_OTP, LoginIdentifier, Valid};
use crate::token::TokenPair;
use crate::user::{User, UserRepository};
use crate::AppState;

const INVALID_CREDENTIALS: &str = "Invalid credentials.";

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RegisterBody {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(min = 2, max = 30, message = "Username must be 2 to 30 characters."))]
    pub username: Option<String>,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    pub password: String,
    pub otp: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub msg: String,
}

/// A registration blocked by an existing account, email taking precedence
/// over username.
fn duplicate_conflict(email_taken: bool, username_taken: bool) -> Option<ServerError> {
    if email_taken {
        Some(ServerError::Conflict("Email"))
    } else if username_taken {
        Some(ServerError::Conflict("Username"))
    } else {
        None
    }
}

/// Handler to create user.
///
/// Uniqueness is checked before the code is consumed, so a rejected
/// registration leaves the code valid for the corrected retry.
pub async fn register(
    State(state): State<AppState>,
    Valid(body): Valid<RegisterBody>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let repository = UserRepository::new(state.db.postgres.clone());
    let email_taken = repository.email_exists(&body.email).await?;
    let username_taken = match &body.username {
        Some(username) => repository.username_exists(username).await?,
        None => false,
    };
    if let Some(conflict) = duplicate_conflict(email_taken, username_taken) {
        return Err(conflict);
    }

    if !otp::verify_and_consume(&state.cache, Purpose::Register, &body.email, &body.otp)
        .await?
    {
        return Err(non_field_error(INVALID_OTP).into());
    }

    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        username: body.username,
        email: body.email,
        password: state
            .crypto
            .hash_password(&body.password)
            .map_err(ServerError::internal)?,
        ..Default::default()
    };
    repository.insert(&user).await?;

    tracing::info!(user_id = %user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            msg: "User registered successfully.".into(),
        }),
    ))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LoginBody {
    /// Email when it carries an `@`, username otherwise.
    #[validate(length(min = 1, message = "Login must not be empty."))]
    pub login: String,
    #[validate(length(min = 1, message = "Password must not be empty."))]
    pub password: String,
    pub otp: Option<String>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub username: Option<String>,
    pub email: String,
}

/// Handler to log a user in with password (and OTP when the instance
/// requires one).
pub async fn login(
    State(state): State<AppState>,
    Valid(body): Valid<LoginBody>,
) -> Result<Json<LoginResponse>> {
    let repository = UserRepository::new(state.db.postgres.clone());
    let user = LoginIdentifier::parse(&body.login).find(&repository).await?;

    if state.config.login_otp_required {
        let submitted = body.otp.as_deref().unwrap_or_default();
        if !otp::verify_and_consume(&state.cache, Purpose::Login, &user.email, submitted)
            .await?
        {
            return Err(non_field_error(INVALID_OTP).into());
        }
    }

    if !state.crypto.verify_password(&body.password, &user.password) {
        return Err(non_field_error(INVALID_CREDENTIALS).into());
    }

    let pair = state
        .token
        .issue(&user.id, user.username.as_deref(), &user.email)?;

    Ok(Json(LoginResponse {
        access: pair.access,
        refresh: pair.refresh,
        username: user.username,
        email: user.email,
    }))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct GoogleBody {
    #[validate(length(min = 1, message = "Token must not be empty."))]
    pub id_token: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct GoogleResponse {
    pub access: String,
    pub refresh: String,
    pub username: Option<String>,
    pub email: String,
    pub is_new_user: bool,
}

/// Handler to log in, or sign up, with a Google ID token.
pub async fn google(
    State(state): State<AppState>,
    Valid(body): Valid<GoogleBody>,
) -> Result<Json<GoogleResponse>> {
    let claims = state.google.verify(&body.id_token).await?;

    let repository = UserRepository::new(state.db.postgres.clone());
    let (user, is_new_user) = match repository.find_by_email(&claims.email).await {
        Ok(user) => (user, false),
        Err(ServerError::NotFound(_)) => {
            // Password stays empty: these accounts only sign in via Google.
            let user = User {
                id: uuid::Uuid::new_v4().to_string(),
                email: claims.email,
                name: claims.name,
                ..Default::default()
            };
            repository.insert(&user).await?;
            tracing::info!(user_id = %user.id, "user created from identity provider");
            (user, true)
        }
        Err(err) => return Err(err),
    };

    let pair = state
        .token
        .issue(&user.id, user.username.as_deref(), &user.email)?;

    Ok(Json(GoogleResponse {
        access: pair.access,
        refresh: pair.refresh,
        username: user.username,
        email: user.email,
        is_new_user,
    }))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RefreshBody {
    #[validate(length(min = 1, message = "Token must not be empty."))]
    pub refresh: String,
}

/// Handler to rotate a refresh token into a fresh pair.
pub async fn refresh(
    State(state): State<AppState>,
    Valid(body): Valid<RefreshBody>,
) -> Result<Json<TokenPair>> {
    let pair = state.token.rotate(&state.cache, &body.refresh).await?;
    Ok(Json(pair))
}
