//! Handle database requests.

use sqlx::types::Json;
use sqlx::{Pool, Postgres};

use crate::error::{Result, ServerError};
use crate::user::User;

const USER_COLUMNS: &str =
    "id, username, email, password, name, role, bio, profile, social_links, date_joined";

#[derive(Clone)]
pub struct UserRepository {
    pool: Pool<Postgres>,
}

impl UserRepository {
    /// Create a new [`UserRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert [`User`] into database.
    pub async fn insert(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO users (id, username, email, password, name, role, bio, profile, social_links, date_joined)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.name)
        .bind(&user.role)
        .bind(&user.bio)
        .bind(&user.profile)
        .bind(Json(&user.social_links))
        .bind(user.date_joined)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Find current user using `id` field.
    pub async fn find_by_id(&self, user_id: &str) -> Result<User> {
        sqlx::query_as::<_, User>(&get_by_field_query(Field::Id))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound("User"))
    }

    /// Find current user using `email` field.
    pub async fn find_by_email(&self, email: &str) -> Result<User> {
        sqlx::query_as::<_, User>(&get_by_field_query(Field::Email))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound("User"))
    }

    /// Find current user using `username` field.
    pub async fn find_by_username(&self, username: &str) -> Result<User> {
        sqlx::query_as::<_, User>(&get_by_field_query(Field::Username))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound("User"))
    }

    /// Whether an account already uses this email.
    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        let exists: (bool,) =
            sqlx::query_as(r#"SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)"#)
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists.0)
    }

    /// Whether an account already uses this username.
    pub async fn username_exists(&self, username: &str) -> Result<bool> {
        let exists: (bool,) =
            sqlx::query_as(r#"SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)"#)
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists.0)
    }

    /// Update current user's mutable profile fields.
    pub async fn update(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"UPDATE users
                SET username = $1, name = $2, role = $3, bio = $4, profile = $5, social_links = $6
                WHERE id = $7"#,
        )
        .bind(&user.username)
        .bind(&user.name)
        .bind(&user.role)
        .bind(&user.bio)
        .bind(&user.profile)
        .bind(Json(&user.social_links))
        .bind(&user.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replace a user's password hash.
    pub async fn update_password(&self, user_id: &str, password: &str) -> Result<()> {
        sqlx::query(r#"UPDATE users SET password = $1 WHERE id = $2"#)
            .bind(password)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Field {
    Id,
    Email,
    Username,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Field::Id => write!(f, "id"),
            Field::Email => write!(f, "email"),
            Field::Username => write!(f, "username"),
        }
    }
}

fn get_by_field_query(field: Field) -> String {
    format!(r#"SELECT {USER_COLUMNS} FROM users WHERE {field} = $1"#)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_query_layout() {
        let query = get_by_field_query(Field::Email);
        assert!(query.contains("WHERE email = $1"));
        assert!(query.contains("social_links"));
    }
}
