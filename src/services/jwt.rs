use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::models::UserRole;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub email: String,
    pub role: UserRole,
    pub exp: i64,
    pub iat: i64,
}

pub struct JwtService;

impl JwtService {
    pub fn generate_access_token(
        user_id: &ObjectId,
        email: &str,
        role: UserRole,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let secret = Self::require_secret(crate::config::Config::jwt_secret())?;
        let expiry = crate::config::Config::jwt_expiry();
        Self::sign(user_id, email, role, &secret, expiry, chrono::Utc::now().timestamp())
    }

    pub fn verify_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        Self::verify_with(token, crate::config::Config::jwt_secret())
    }

    fn require_secret(secret: Option<String>) -> Result<String, jsonwebtoken::errors::Error> {
        secret.ok_or_else(|| ErrorKind::InvalidKeyFormat.into())
    }

    fn verify_with(token: &str, secret: Option<String>) -> Result<Claims, jsonwebtoken::errors::Error> {
        let secret = Self::require_secret(secret)?;
        Self::decode_with(token, &secret)
    }

    fn sign(
        user_id: &ObjectId,
        email: &str,
        role: UserRole,
        secret: &str,
        expiry: i64,
        now: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            sub: user_id.to_hex(),
            email: email.to_string(),
            role,
            exp: now + expiry,
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    fn decode_with(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_with_same_secret() {
        let user_id = ObjectId::new();
        let now = chrono::Utc::now().timestamp();
        let token = JwtService::sign(&user_id, "a@b.lk", UserRole::Admin, "s3cret", 3600, now).unwrap();

        let claims = JwtService::decode_with(&token, "s3cret").unwrap();
        assert_eq!(claims.sub, user_id.to_hex());
        assert_eq!(claims.role, UserRole::Admin);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn rejects_wrong_secret_and_expired_tokens() {
        let user_id = ObjectId::new();
        let now = chrono::Utc::now().timestamp();

        let token = JwtService::sign(&user_id, "a@b.lk", UserRole::User, "s3cret", 3600, now).unwrap();
        assert!(JwtService::decode_with(&token, "other").is_err());

        let stale = JwtService::sign(&user_id, "a@b.lk", UserRole::User, "s3cret", 60, now - 7200).unwrap();
        assert!(JwtService::decode_with(&stale, "s3cret").is_err());
    }

    #[test]
    fn missing_secret_accepts_no_token() {
        let user_id = ObjectId::new();
        let now = chrono::Utc::now().timestamp();
        let forged = JwtService::sign(&user_id, "a@b.lk", UserRole::Admin, "default-secret", 3600, now).unwrap();

        assert!(JwtService::verify_with(&forged, None).is_err());
        assert!(JwtService::require_secret(None).is_err());
        assert!(JwtService::verify_with(&forged, Some("default-secret".into())).is_ok());
    }
}
