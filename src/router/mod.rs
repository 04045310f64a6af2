//! HTTP surface.

pub mod account;
pub mod analysis;
pub mod chat;
pub mod health;
pub mod interview;
pub mod otp;
pub mod password;
pub mod profile;

use axum::extract::{FromRequest, Request, State};
use axum::http::header;
use axum::response::Response;
use axum::{Json, middleware};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::{Result, ServerError};
use crate::user::{User, UserRepository};
use crate::AppState;

const BEARER: &str = "Bearer ";

pub const INVALID_OTP: &str = "Invalid or expired OTP.";

/// JSON extractor running `validator` rules before the handler sees the
/// body.
pub struct Valid<T>(pub T);

impl<S, T> FromRequest<S> for Valid<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
    Json<T>: FromRequest<S, Rejection = axum::extract::rejection::JsonRejection>,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// What a user typed into the login field, decided once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginIdentifier {
    Email(String),
    Username(String),
}

impl LoginIdentifier {
    /// An `@` anywhere in the value reads as an email address.
    pub fn parse(value: &str) -> Self {
        if value.contains('@') {
            LoginIdentifier::Email(value.to_owned())
        } else {
            LoginIdentifier::Username(value.to_owned())
        }
    }

    /// Resolve the identifier to a stored account.
    pub async fn find(&self, repository: &UserRepository) -> Result<User> {
        match self {
            LoginIdentifier::Email(email) => repository.find_by_email(email).await,
            LoginIdentifier::Username(username) => {
                repository.find_by_username(username).await
            }
        }
    }
}

/// Custom middleware for authentification.
///
/// Decodes the bearer access token and loads the account behind it into a
/// request extension.
pub async fn auth(
    State(state): State<AppState>,
    mut req: Request,
    next: middleware::Next,
) -> Result<Response> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or(ServerError::Unauthorized)?;

    let claims = state.token.authenticate(&token.replace(BEARER, ""))?;
    let user = UserRepository::new(state.db.postgres.clone())
        .find_by_id(&claims.sub)
        .await
        .map_err(|_| ServerError::Unauthorized)?;

    req.extensions_mut().insert::<User>(user);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_identifier_dispatch() {
        assert_eq!(
            LoginIdentifier::parse("a@x.com"),
            LoginIdentifier::Email("a@x.com".into())
        );
        assert_eq!(
            LoginIdentifier::parse("alice"),
            LoginIdentifier::Username("alice".into())
        );
    }
}
