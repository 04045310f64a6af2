//! Google ID token verification.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;

use crate::error::{Result, ServerError, non_field_error};

const CERTS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];

pub const INVALID_ID_TOKEN: &str = "Invalid Google ID token.";

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

/// Claims asserted by Google on a verified ID token.
#[derive(Debug, Deserialize)]
pub struct GoogleClaims {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Verifier for the third-party identity provider.
#[derive(Clone, Default)]
pub struct GoogleVerifier {
    http: reqwest::Client,
    client_id: Option<String>,
}

impl GoogleVerifier {
    /// Create a new [`GoogleVerifier`].
    pub fn new(client_id: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
        }
    }

    fn invalid() -> ServerError {
        non_field_error(INVALID_ID_TOKEN).into()
    }

    /// Verify an ID token against Google's published keys and the expected
    /// audience. Any verification failure collapses into one user-safe
    /// error.
    pub async fn verify(&self, id_token: &str) -> Result<GoogleClaims> {
        let Some(client_id) = &self.client_id else {
            return Err(ServerError::internal("google client id is not configured"));
        };

        let header = decode_header(id_token).map_err(|_| Self::invalid())?;
        let kid = header.kid.ok_or_else(Self::invalid)?;

        let jwks: Jwks = self
            .http
            .get(CERTS_URL)
            .send()
            .await
            .map_err(|err| ServerError::upstream("google", err))?
            .error_for_status()
            .map_err(|err| ServerError::upstream("google", err))?
            .json()
            .await
            .map_err(|err| ServerError::upstream("google", err))?;

        let jwk = jwks
            .keys
            .iter()
            .find(|key| key.kid == kid)
            .ok_or_else(Self::invalid)?;
        let decoding_key =
            DecodingKey::from_rsa_components(&jwk.n, &jwk.e).map_err(|_| Self::invalid())?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[client_id]);
        validation.set_issuer(&ISSUERS);

        let data = decode::<GoogleClaims>(id_token, &decoding_key, &validation)
            .map_err(|_| Self::invalid())?;

        Ok(data.claims)
    }
}
