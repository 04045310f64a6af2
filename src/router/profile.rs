//! Profile handlers.

use axum::extract::{Multipart, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Result, field_error, non_field_error};
use crate::media;
use crate::router::Valid;
use crate::user::{SocialLinks, User, UserRepository};
use crate::AppState;

const USERNAME_TAKEN: &str = "Username is already taken.";
const INVALID_EXTENSION: &str = "Profile image must be a .png, .jpg or .jpeg file.";
const MISSING_FILE: &str = "No file was provided.";

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub username: Option<String>,
    pub email: String,
    pub name: Option<String>,
    pub role: String,
    pub bio: Option<String>,
    pub profile: Option<String>,
    pub social_links: SocialLinks,
    pub date_joined: chrono::DateTime<chrono::Utc>,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            email: user.email,
            name: user.name,
            role: user.role,
            bio: user.bio,
            profile: user.profile,
            social_links: user.social_links,
            date_joined: user.date_joined,
        }
    }
}

/// Handler returning the authenticated account's profile.
pub async fn get(Extension(user): Extension<User>) -> Json<ProfileResponse> {
    Json(user.into())
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateBody {
    #[validate(length(min = 2, max = 30, message = "Username must be 2 to 30 characters."))]
    pub username: Option<String>,
    #[validate(length(max = 100, message = "Name is too long."))]
    pub name: Option<String>,
    #[validate(length(max = 200, message = "Bio must be 200 characters or fewer."))]
    pub bio: Option<String>,
    #[validate(length(min = 1, max = 50, message = "Role must be 1 to 50 characters."))]
    pub role: Option<String>,
    #[validate(url(message = "Profile must be a valid URL."))]
    pub profile: Option<String>,
    pub social_links: Option<SocialLinks>,
}

/// Handler for partial profile updates. Absent fields stay untouched;
/// social links merge key by key.
pub async fn update(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
    Valid(body): Valid<UpdateBody>,
) -> Result<Json<ProfileResponse>> {
    let repository = UserRepository::new(state.db.postgres.clone());

    if let Some(username) = body.username {
        if user.username.as_deref() != Some(&username)
            && repository.username_exists(&username).await?
        {
            return Err(field_error("username", USERNAME_TAKEN).into());
        }
        user.username = Some(username);
    }
    if let Some(name) = body.name {
        user.name = Some(name);
    }
    if let Some(bio) = body.bio {
        user.bio = Some(bio);
    }
    if let Some(role) = body.role {
        user.role = role;
    }
    if let Some(profile) = body.profile {
        user.profile = Some(profile);
    }
    if let Some(links) = body.social_links {
        user.social_links.merge(links);
    }

    repository.update(&user).await?;
    Ok(Json(user.into()))
}

/// Handler replacing the profile image from a multipart upload.
///
/// The extension gate runs before any byte leaves the server; the previous
/// asset is removed best-effort once the new one is stored.
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(mut user): Extension<User>,
    mut multipart: Multipart,
) -> Result<Json<ProfileResponse>> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart.next_field().await? {
        if let Some(filename) = field.file_name().map(str::to_owned) {
            upload = Some((filename, field.bytes().await?.to_vec()));
            break;
        }
    }

    let Some((filename, bytes)) = upload else {
        return Err(non_field_error(MISSING_FILE).into());
    };
    if !media::has_allowed_extension(&filename) {
        return Err(non_field_error(INVALID_EXTENSION).into());
    }

    let previous = user.profile.take();
    user.profile = Some(state.media.upload(&filename, bytes).await?);
    UserRepository::new(state.db.postgres.clone())
        .update(&user)
        .await?;

    if let Some(previous) = previous {
        state.media.delete_by_url(&previous).await;
    }

    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize)]
pub struct CheckUsernameParams {
    pub username: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckUsernameResponse {
    pub available: bool,
    pub msg: String,
}

/// Handler to check whether a username is free.
pub async fn check_username(
    State(state): State<AppState>,
    Query(params): Query<CheckUsernameParams>,
) -> Result<Json<CheckUsernameResponse>> {
    if params.username.trim().is_empty() {
        return Err(field_error("username", "Username must not be empty.").into());
    }

    let taken = UserRepository::new(state.db.postgres.clone())
        .username_exists(&params.username)
        .await?;

    Ok(Json(CheckUsernameResponse {
        available: !taken,
        msg: if taken {
            USERNAME_TAKEN.into()
        } else {
            "Username is available.".into()
        },
    }))
}
