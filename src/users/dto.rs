use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use super::store::User;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPrefs {
    pub daily: bool,
    pub weekly: bool,
    pub follows: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preferences {
    pub notifications: NotificationPrefs,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            notifications: NotificationPrefs {
                daily: false,
                weekly: true,
                follows: true,
            },
        }
    }
}

fn default_background() -> i32 {
    1
}

fn default_interests() -> Value {
    Value::Array(Vec::new())
}

/// Request body for POST /users.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub twitter: String,
    #[serde(default = "default_background")]
    pub background: i32,
    #[serde(default = "default_interests")]
    pub interests: Value,
    #[serde(default)]
    pub preferences: Preferences,
}

/// Partial update for PUT /users/:id. Absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub url: Option<String>,
    pub twitter: Option<String>,
    pub background: Option<i32>,
    pub interests: Option<Value>,
    pub preferences: Option<Preferences>,
    pub recovery_code: Option<String>,
    pub active: Option<bool>,
    pub admin: Option<bool>,
}

/// Full user view minus the sensitive fields. The password hash and the
/// recovery code never cross the HTTP boundary.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub name: String,
    pub bio: String,
    pub url: String,
    pub twitter: String,
    pub background: i32,
    pub interests: Value,
    pub preferences: Preferences,
    pub active: bool,
    pub admin: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            username: u.username,
            name: u.name,
            bio: u.bio,
            url: u.url,
            twitter: u.twitter,
            background: u.background,
            interests: u.interests,
            preferences: u.preferences.0,
            active: u.active,
            admin: u.admin,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// Row shape for GET /users: the whitelisted columns only.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct UserSummary {
    pub name: String,
    pub email: String,
    pub username: String,
    pub bio: String,
    pub url: String,
    pub twitter: String,
    pub background: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "a@b.co".into(),
            username: "ab".into(),
            password_hash: "$argon2id$fake".into(),
            name: "A B".into(),
            bio: String::new(),
            url: String::new(),
            twitter: String::new(),
            background: 1,
            interests: Value::Array(Vec::new()),
            preferences: Json(Preferences::default()),
            recovery_code: "SECRET".into(),
            active: true,
            admin: false,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn public_user_never_exposes_sensitive_fields() {
        let public: PublicUser = sample_user().into();
        let json = serde_json::to_value(&public).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("password"));
        assert!(!obj.contains_key("passwordHash"));
        assert!(!obj.contains_key("recoveryCode"));
        assert_eq!(json["email"], "a@b.co");
    }

    #[test]
    fn public_user_uses_camel_case_timestamps() {
        let public: PublicUser = sample_user().into();
        let json = serde_json::to_value(&public).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_some());
    }

    #[test]
    fn patch_deserializes_camel_case_recovery_code() {
        let patch: UserPatch =
            serde_json::from_str(r#"{"recoveryCode": "XK42", "bio": "hi"}"#).unwrap();
        assert_eq!(patch.recovery_code.as_deref(), Some("XK42"));
        assert_eq!(patch.bio.as_deref(), Some("hi"));
        assert!(patch.email.is_none());
    }

    #[test]
    fn preferences_default_matches_schema_defaults() {
        let prefs = Preferences::default();
        assert!(!prefs.notifications.daily);
        assert!(prefs.notifications.weekly);
        assert!(prefs.notifications.follows);
    }

    #[test]
    fn new_user_fills_defaults() {
        let body: NewUser = serde_json::from_str(
            r#"{"email":"a@b.co","username":"ab","password":"pw","name":"A"}"#,
        )
        .unwrap();
        assert_eq!(body.background, 1);
        assert_eq!(body.interests, Value::Array(Vec::new()));
        assert_eq!(body.preferences, Preferences::default());
    }
}
