use anyhow::Context;
use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{claims::Claims, error::TokenError};
use crate::{config::JwtConfig, error::ApiError, state::AppState};

/// Issues and verifies stateless bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    ttl: Duration,
}

impl FromRef<AppState> for TokenService {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

impl TokenService {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            algorithm: cfg.algorithm,
            ttl: Duration::seconds(cfg.expiration_hours.saturating_mul(3600)),
        }
    }

    pub fn issue(&self, user_id: Uuid, email: &str) -> anyhow::Result<String> {
        self.issue_at(user_id, email, OffsetDateTime::now_utc())
    }

    pub(crate) fn issue_at(
        &self,
        user_id: Uuid,
        email: &str,
        issued_at: OffsetDateTime,
    ) -> anyhow::Result<String> {
        let expires_at = issued_at
            .checked_add(self.ttl)
            .context("token expiry out of range")?;
        let claims = Claims {
            user_id,
            email: email.to_string(),
            iat: issued_at.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
        };
        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "jwt signed");
        Ok(token)
    }

    /// Checks signature and expiry. A token is accepted up to and including its `exp` second.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        match decode::<Claims>(token, &self.decoding, &validation) {
            Ok(data) => {
                debug!(user_id = %data.claims.user_id, "jwt verified");
                Ok(data.claims)
            }
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => Err(TokenError::Expired),
                _ => {
                    debug!(error = %e, "jwt rejected");
                    Err(TokenError::Invalid)
                }
            },
        }
    }

    /// Like [`TokenService::verify`], for callers that treat any rejection as a terminal 401.
    pub fn decode_or_fail(&self, token: &str) -> Result<Claims, ApiError> {
        self.verify(token).map_err(|e| {
            warn!(reason = %e, "bearer token rejected");
            ApiError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn service(secret: &str, algorithm: Algorithm, hours: i64) -> TokenService {
        TokenService::new(&JwtConfig::new(secret, algorithm, hours).expect("valid config"))
    }

    #[test]
    fn issued_token_verifies_with_claims() {
        let tokens = service("dev-secret", Algorithm::HS256, 24);
        let user_id = Uuid::new_v4();
        let token = tokens.issue(user_id, "alice@x.com").expect("issue");
        let claims = tokens.verify(&token).expect("verify");
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.email, "alice@x.com");
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn oversized_expiry_is_an_error_not_a_panic() {
        let cfg = JwtConfig {
            secret: "dev-secret".into(),
            algorithm: Algorithm::HS256,
            expiration_hours: 100_000_000,
        };
        let tokens = TokenService::new(&cfg);
        let err = tokens.issue(Uuid::new_v4(), "alice@x.com").unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn expired_token_reports_expired() {
        let tokens = service("dev-secret", Algorithm::HS256, 1);
        let issued = OffsetDateTime::now_utc() - Duration::hours(2);
        let token = tokens
            .issue_at(Uuid::new_v4(), "alice@x.com", issued)
            .expect("issue");
        assert_eq!(tokens.verify(&token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn token_accepted_until_expiry_instant() {
        let tokens = service("dev-secret", Algorithm::HS256, 1);
        let issued = OffsetDateTime::now_utc() - Duration::minutes(59);
        let token = tokens
            .issue_at(Uuid::new_v4(), "alice@x.com", issued)
            .expect("issue");
        assert!(tokens.verify(&token).is_ok());
    }

    #[test]
    fn altered_token_is_invalid() {
        let tokens = service("dev-secret", Algorithm::HS256, 24);
        let token = tokens.issue(Uuid::new_v4(), "alice@x.com").expect("issue");

        // flip one character in the signature segment
        let mut bytes = token.into_bytes();
        let last = bytes.len() - 2;
        bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        assert_eq!(tokens.verify(&tampered).unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn malformed_token_is_invalid() {
        let tokens = service("dev-secret", Algorithm::HS256, 24);
        assert_eq!(tokens.verify("not.a.jwt").unwrap_err(), TokenError::Invalid);
        assert_eq!(tokens.verify("").unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn token_from_other_secret_is_invalid() {
        let ours = service("secret-a", Algorithm::HS256, 24);
        let theirs = service("secret-b", Algorithm::HS256, 24);
        let token = theirs.issue(Uuid::new_v4(), "alice@x.com").expect("issue");
        assert_eq!(ours.verify(&token).unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn token_with_other_algorithm_is_invalid() {
        let hs256 = service("same-secret", Algorithm::HS256, 24);
        let hs512 = service("same-secret", Algorithm::HS512, 24);
        let token = hs512.issue(Uuid::new_v4(), "alice@x.com").expect("issue");
        assert!(hs512.verify(&token).is_ok());
        assert_eq!(hs256.verify(&token).unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn decode_or_fail_distinguishes_expired_and_invalid() {
        let tokens = service("dev-secret", Algorithm::HS256, 1);
        let issued = OffsetDateTime::now_utc() - Duration::hours(3);
        let expired = tokens
            .issue_at(Uuid::new_v4(), "alice@x.com", issued)
            .expect("issue");

        let err = tokens.decode_or_fail(&expired).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "Token has expired");

        let err = tokens.decode_or_fail("garbage").unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), "Invalid token");
    }
}
