use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;

/// Claims expected on the bearer token issued by the upstream auth service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,   // user ID
    pub exp: usize,  // expiration time
    pub iat: usize,  // issued at
    pub iss: String, // issuer
    pub aud: String, // audience
}

/// Extracts and validates the JWT, returning the caller's user id.
#[derive(Debug)]
pub struct AuthUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Read Authorization header
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "missing Authorization header".into(),
            ))?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or((StatusCode::UNAUTHORIZED, "invalid auth scheme".into()))?;

        let cfg = &state.config.jwt;
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&cfg.audience));
        validation.set_issuer(std::slice::from_ref(&cfg.issuer));
        let decoding = DecodingKey::from_secret(cfg.secret.as_bytes());

        let data = decode::<Claims>(token, &decoding, &validation)
            .map_err(|_| (StatusCode::UNAUTHORIZED, "invalid or expired token".into()))?;

        Ok(AuthUser(data.claims.sub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use time::OffsetDateTime;

    fn token_for(sub: Uuid, secret: &str) -> String {
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        let claims = Claims {
            sub,
            exp: now + 600,
            iat: now,
            iss: "test".into(),
            aud: "test".into(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn extracts_subject_from_valid_token() {
        let state = AppState::fake();
        let sub = Uuid::new_v4();
        let req = Request::builder()
            .header(
                axum::http::header::AUTHORIZATION,
                format!("Bearer {}", token_for(sub, "test")),
            )
            .body(())
            .unwrap();
        let (mut parts, _) = req.into_parts();

        let AuthUser(got) = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .expect("extraction should succeed");
        assert_eq!(got, sub);
    }

    #[tokio::test]
    async fn rejects_missing_header() {
        let state = AppState::fake();
        let req = Request::builder().body(()).unwrap();
        let (mut parts, _) = req.into_parts();

        let (status, _) = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rejects_wrong_secret() {
        let state = AppState::fake();
        let req = Request::builder()
            .header(
                axum::http::header::AUTHORIZATION,
                format!("Bearer {}", token_for(Uuid::new_v4(), "other-secret")),
            )
            .body(())
            .unwrap();
        let (mut parts, _) = req.into_parts();

        let (status, _) = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
