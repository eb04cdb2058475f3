//! JWT issuance and verification (HS256). The signing secret comes from
//! configuration and is never compiled in.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use crate::config::JwtConfig;

/// Token claims. `sub` carries the user's IIN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_minutes: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self, AppError> {
        if config.secret.len() < 32 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT secret must be at least 32 bytes"
            )));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            expiry_minutes: config.expiry_minutes,
        })
    }

    pub fn issue(&self, iin: &str) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: iin.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.expiry_minutes)).timestamp(),
        };
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let data = decode::<Claims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new(&JwtConfig {
            secret: "test-secret-0123456789abcdef0123456789".to_string(),
            expiry_minutes: 60,
        })
        .unwrap()
    }

    #[test]
    fn issued_token_verifies() {
        let jwt = service();
        let token = jwt.issue("123456789012").unwrap();
        let claims = jwt.verify(&token).unwrap();
        assert_eq!(claims.sub, "123456789012");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn tampered_token_rejected() {
        let jwt = service();
        let mut token = jwt.issue("123456789012").unwrap();
        token.push('x');
        assert!(jwt.verify(&token).is_err());
    }

    #[test]
    fn short_secret_rejected() {
        let result = JwtService::new(&JwtConfig {
            secret: "short".to_string(),
            expiry_minutes: 60,
        });
        assert!(result.is_err());
    }
}
