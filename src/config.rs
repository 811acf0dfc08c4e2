use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub resend_key: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "userhub".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "userhub-users".into()),
        };
        // An absent key leaves the service bootable; sends will fail and be logged.
        let mail = MailConfig {
            resend_key: std::env::var("RESEND_API_KEY").unwrap_or_default(),
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "noreply@userhub.local".into()),
        };
        Ok(Self {
            database_url,
            jwt,
            mail,
        })
    }
}
