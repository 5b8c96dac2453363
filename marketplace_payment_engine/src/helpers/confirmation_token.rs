//! The delivery confirmation token: a short-lived HS256 JWT the customer's device hands to the courier at the
//! door. It binds the order id and the agreed missing-item list, so neither side can complete a different order
//! or quietly alter what was (not) delivered.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use mpe_common::Secret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{MissingItem, OrderId};

const TOKEN_TYPE: &str = "order-completion";

#[derive(Debug, Clone, Error)]
pub enum TokenError {
    #[error("Token is invalid: {0}")]
    Invalid(String),
    #[error("Token was issued for a different order")]
    SubjectMismatch,
    #[error("Token is not an order completion token")]
    WrongType,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        TokenError::Invalid(e.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionClaims {
    pub sub: String,
    pub typ: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_items: Option<Vec<MissingItem>>,
}

#[derive(Clone)]
pub struct CompletionTokenIssuer {
    secret: Secret<String>,
    ttl: Duration,
}

impl CompletionTokenIssuer {
    pub fn new(secret: Secret<String>, ttl: Duration) -> Self {
        Self { secret, ttl }
    }

    pub fn issue(
        &self,
        order_id: &OrderId,
        missing_items: Option<Vec<MissingItem>>,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = CompletionClaims {
            sub: order_id.as_str().to_string(),
            typ: TOKEN_TYPE.to_string(),
            exp: (now + self.ttl).timestamp(),
            iat: now.timestamp(),
            missing_items,
        };
        let key = EncodingKey::from_secret(self.secret.as_bytes());
        Ok(encode(&Header::default(), &claims, &key)?)
    }

    /// Checks signature, expiry, token type and that the token was issued for `order_id`.
    pub fn verify(&self, token: &str, order_id: &OrderId) -> Result<CompletionClaims, TokenError> {
        let key = DecodingKey::from_secret(self.secret.as_bytes());
        let data = decode::<CompletionClaims>(token, &key, &Validation::default())?;
        let claims = data.claims;
        if claims.typ != TOKEN_TYPE {
            return Err(TokenError::WrongType);
        }
        if claims.sub != order_id.as_str() {
            return Err(TokenError::SubjectMismatch);
        }
        Ok(claims)
    }
}
