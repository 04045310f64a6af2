mod repository;

pub use repository::*;

use serde::{Deserialize, Serialize};

pub const DEFAULT_ROLE: &str = "student";

/// User as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: Option<String>,
    pub email: String,
    #[serde(skip)]
    pub password: String,
    pub name: Option<String>,
    pub role: String,
    pub bio: Option<String>,
    pub profile: Option<String>,
    #[sqlx(json)]
    pub social_links: SocialLinks,
    pub date_joined: chrono::DateTime<chrono::Utc>,
}

impl Default for User {
    fn default() -> Self {
        Self {
            id: String::default(),
            username: None,
            email: String::default(),
            password: String::default(),
            name: None,
            role: DEFAULT_ROLE.to_owned(),
            bio: None,
            profile: None,
            social_links: SocialLinks::default(),
            date_joined: chrono::Utc::now(),
        }
    }
}

/// Social profile links of a [`User`].
///
/// Updates merge key by key, so sending `github` alone never clears
/// `linkedin`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialLinks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl SocialLinks {
    /// Overlay the provided keys onto the stored set.
    pub fn merge(&mut self, patch: SocialLinks) {
        if patch.github.is_some() {
            self.github = patch.github;
        }
        if patch.linkedin.is_some() {
            self.linkedin = patch.linkedin;
        }
        if patch.twitter.is_some() {
            self.twitter = patch.twitter;
        }
        if patch.website.is_some() {
            self.website = patch.website;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_social_links_merge_is_per_key() {
        let mut stored = SocialLinks {
            github: Some("https://github.com/a".into()),
            linkedin: Some("https://linkedin.com/in/a".into()),
            ..Default::default()
        };

        stored.merge(SocialLinks {
            github: Some("https://github.com/b".into()),
            website: Some("https://a.dev".into()),
            ..Default::default()
        });

        assert_eq!(stored.github.as_deref(), Some("https://github.com/b"));
        assert_eq!(
            stored.linkedin.as_deref(),
            Some("https://linkedin.com/in/a")
        );
        assert_eq!(stored.website.as_deref(), Some("https://a.dev"));
        assert_eq!(stored.twitter, None);
    }

    #[test]
    fn test_password_never_serializes() {
        let user = User {
            password: "$argon2id$secret".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(!json.contains("password"));
    }

    #[test]
    fn test_default_role() {
        assert_eq!(User::default().role, "student");
    }
}
