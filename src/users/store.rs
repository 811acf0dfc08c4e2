use std::collections::HashMap;
use std::sync::Arc;

use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use super::dto::{NewUser, Preferences, UserPatch, UserSummary};
use super::hooks;
use super::password::hash_password;
use super::query::Filter;
use crate::error::ApiError;
use crate::mailer::Mailer;

/// Full user row. Only leaves this module wrapped in a sanitized DTO.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub name: String,
    pub bio: String,
    pub url: String,
    pub twitter: String,
    pub background: i32,
    pub interests: serde_json::Value,
    pub preferences: Json<Preferences>,
    pub recovery_code: String,
    pub active: bool,
    pub admin: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Repository over the users collection. Constructed once at startup and
/// handed to handlers through the shared state; write operations trigger
/// the notification hooks after commit.
#[derive(Clone)]
pub struct UserStore {
    db: PgPool,
    mailer: Arc<dyn Mailer>,
}

impl UserStore {
    pub fn new(db: PgPool, mailer: Arc<dyn Mailer>) -> Self {
        Self { db, mailer }
    }

    /// List users matching a string filter, restricted to the whitelisted
    /// columns both for filtering and for selection.
    pub async fn query(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<Vec<UserSummary>, ApiError> {
        let filter = Filter::parse(params)?;

        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT name, email, username, bio, url, twitter, background FROM users",
        );
        filter.apply(&mut qb);

        let rows = qb
            .build_query_as::<UserSummary>()
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, name, bio, url, twitter,
                   background, interests, preferences, recovery_code, active, admin,
                   created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    /// Insert a new user. Email and username are normalized before the
    /// write; the unique indexes turn races into a validation error. The
    /// welcome email is spawned after the insert commits.
    pub async fn create(&self, mut attrs: NewUser) -> Result<User, ApiError> {
        attrs.email = normalize(&attrs.email);
        attrs.username = normalize(&attrs.username);
        attrs.name = attrs.name.trim().to_string();

        for (field, value) in [
            ("email", &attrs.email),
            ("username", &attrs.username),
            ("password", &attrs.password),
            ("name", &attrs.name),
        ] {
            if value.is_empty() {
                return Err(ApiError::Validation(format!("{field} is required")));
            }
        }

        let password_hash = hash_password(&attrs.password).map_err(ApiError::Internal)?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, username, password_hash, name, bio, url, twitter,
                               background, interests, preferences)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, email, username, password_hash, name, bio, url, twitter,
                      background, interests, preferences, recovery_code, active, admin,
                      created_at, updated_at
            "#,
        )
        .bind(&attrs.email)
        .bind(&attrs.username)
        .bind(&password_hash)
        .bind(&attrs.name)
        .bind(&attrs.bio)
        .bind(&attrs.url)
        .bind(&attrs.twitter)
        .bind(attrs.background)
        .bind(&attrs.interests)
        .bind(Json(attrs.preferences.clone()))
        .fetch_one(&self.db)
        .await?;

        hooks::notify_created(self.mailer.clone(), user.email.clone());

        Ok(user)
    }

    /// Partial update; absent patch fields keep their stored value. Returns
    /// the post-update row, `None` when no row matched. A non-empty
    /// recovery code in the patch spawns the password-reset email after
    /// the write commits.
    pub async fn update_by_id(
        &self,
        id: Uuid,
        mut patch: UserPatch,
    ) -> Result<Option<User>, ApiError> {
        if let Some(email) = patch.email.as_mut() {
            *email = normalize(email);
        }
        if let Some(username) = patch.username.as_mut() {
            *username = normalize(username);
        }
        if let Some(name) = patch.name.as_mut() {
            *name = name.trim().to_string();
        }

        let password_hash = match patch.password.as_deref() {
            Some(p) if !p.is_empty() => Some(hash_password(p).map_err(ApiError::Internal)?),
            _ => None,
        };
        let pending_code = pending_recovery(&patch);

        let user = sqlx::query_as::<_, User>(UPDATE_BY_ID_SQL)
        .bind(id)
        .bind(&patch.email)
        .bind(&patch.username)
        .bind(&password_hash)
        .bind(&patch.name)
        .bind(&patch.bio)
        .bind(&patch.url)
        .bind(&patch.twitter)
        .bind(patch.background)
        .bind(&patch.interests)
        .bind(patch.preferences.clone().map(Json))
        .bind(&patch.recovery_code)
        .bind(patch.active)
        .bind(patch.admin)
        .fetch_optional(&self.db)
        .await?;

        if let (Some(user), Some(code)) = (&user, pending_code) {
            hooks::notify_recovery(self.mailer.clone(), user.email.clone(), code);
        }

        Ok(user)
    }

    /// Soft delete: rows are never removed, only deactivated.
    pub async fn deactivate(&self, id: Uuid) -> Result<Option<User>, ApiError> {
        self.update_by_id(id, deactivation_patch()).await
    }
}

/// Columns a patch may touch, in bind order ($2..) of [`UPDATE_BY_ID_SQL`].
const PATCH_COLUMNS: [&str; 13] = [
    "email",
    "username",
    "password_hash",
    "name",
    "bio",
    "url",
    "twitter",
    "background",
    "interests",
    "preferences",
    "recovery_code",
    "active",
    "admin",
];

/// Every patchable column goes through COALESCE so an absent patch field
/// keeps the stored value.
const UPDATE_BY_ID_SQL: &str = r#"
    UPDATE users SET
        email = COALESCE($2, email),
        username = COALESCE($3, username),
        password_hash = COALESCE($4, password_hash),
        name = COALESCE($5, name),
        bio = COALESCE($6, bio),
        url = COALESCE($7, url),
        twitter = COALESCE($8, twitter),
        background = COALESCE($9, background),
        interests = COALESCE($10, interests),
        preferences = COALESCE($11, preferences),
        recovery_code = COALESCE($12, recovery_code),
        active = COALESCE($13, active),
        admin = COALESCE($14, admin),
        updated_at = now()
    WHERE id = $1
    RETURNING id, email, username, password_hash, name, bio, url, twitter,
              background, interests, preferences, recovery_code, active, admin,
              created_at, updated_at
"#;

/// The soft-delete patch flips `active` and nothing else.
fn deactivation_patch() -> UserPatch {
    UserPatch {
        active: Some(false),
        ..Default::default()
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// A reset email goes out only when the patch actually sets a code.
fn pending_recovery(patch: &UserPatch) -> Option<String> {
    patch
        .recovery_code
        .clone()
        .filter(|code| !code.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_and_trims() {
        assert_eq!(normalize("  Jo@Example.COM "), "jo@example.com");
        assert_eq!(normalize("MixedCase"), "mixedcase");
    }

    #[test]
    fn empty_recovery_code_triggers_no_reset() {
        let patch = UserPatch {
            recovery_code: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(pending_recovery(&patch), None);
        assert_eq!(pending_recovery(&UserPatch::default()), None);
    }

    #[test]
    fn non_empty_recovery_code_is_pending() {
        let patch = UserPatch {
            recovery_code: Some("XK42".into()),
            ..Default::default()
        };
        assert_eq!(pending_recovery(&patch).as_deref(), Some("XK42"));
    }

    #[test]
    fn update_coalesces_every_patch_column() {
        // An absent patch field must fall back to the stored value; a column
        // written without COALESCE would silently clobber it.
        for (i, column) in PATCH_COLUMNS.iter().enumerate() {
            let bind = i + 2; // $1 is the row id
            let clause = format!("{column} = COALESCE(${bind}, {column})");
            assert!(
                UPDATE_BY_ID_SQL.contains(&clause),
                "missing clause: {clause}"
            );
        }
        assert!(UPDATE_BY_ID_SQL.contains("updated_at = now()"));
        assert!(UPDATE_BY_ID_SQL.contains("WHERE id = $1"));
        // No DELETE path exists: the update statement is the whole surface.
        assert!(UPDATE_BY_ID_SQL.trim_start().starts_with("UPDATE users"));
    }

    #[test]
    fn deactivation_patch_only_flips_active() {
        let patch = deactivation_patch();
        assert_eq!(patch.active, Some(false));
        assert!(patch.email.is_none());
        assert!(patch.username.is_none());
        assert!(patch.password.is_none());
        assert!(patch.name.is_none());
        assert!(patch.bio.is_none());
        assert!(patch.url.is_none());
        assert!(patch.twitter.is_none());
        assert!(patch.background.is_none());
        assert!(patch.interests.is_none());
        assert!(patch.preferences.is_none());
        assert!(patch.recovery_code.is_none());
        assert!(patch.admin.is_none());
        // No reset email rides along with a soft delete.
        assert_eq!(pending_recovery(&patch), None);
    }
}
