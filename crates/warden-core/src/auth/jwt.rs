use std::fmt;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// What a token may be used for. Serialized as the `type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
    Reset,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::Reset => "reset",
        }
    }

    /// Lifetime of a freshly issued token of this kind.
    pub fn lifetime(&self) -> Duration {
        match self {
            TokenKind::Access => Duration::hours(1),
            TokenKind::Refresh => Duration::days(30),
            TokenKind::Reset => Duration::hours(1),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT claims payload.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (decimal user ID)
    pub sub: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    /// Unique token id, the revocation key
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Claims for a new token of `kind` issued at `now`, with a fresh `jti`.
    pub fn new(user_id: i32, kind: TokenKind, now: DateTime<Utc>) -> Self {
        let expires = now + kind.lifetime();
        Claims {
            sub: user_id.to_string(),
            kind,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
        }
    }

    pub fn user_id(&self) -> Option<i32> {
        self.sub.parse().ok()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// `exp` equal to `now` is still valid.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() > self.exp
    }
}

/// Sign claims with HS256.
pub fn encode_claims(claims: &Claims, secret: &[u8]) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
}

/// Verify the signature and structure of a token and return its claims.
///
/// Expiry is NOT checked here; callers compare `exp` against their own clock.
pub fn decode_claims(token: &str, secret: &[u8]) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp", "sub"]);

    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"jwt-test-secret";

    #[test]
    fn claims_carry_kind_as_type() {
        let claims = Claims::new(7, TokenKind::Refresh, Utc::now());
        let token = encode_claims(&claims, SECRET).unwrap();
        let decoded = decode_claims(&token, SECRET).unwrap();
        assert_eq!(decoded, claims);
        assert_eq!(decoded.user_id(), Some(7));

        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["type"], "refresh");
    }

    #[test]
    fn lifetimes_by_kind() {
        let now = Utc::now();
        let access = Claims::new(1, TokenKind::Access, now);
        let refresh = Claims::new(1, TokenKind::Refresh, now);
        assert_eq!(access.exp - access.iat, 3600);
        assert_eq!(refresh.exp - refresh.iat, 30 * 24 * 3600);
    }

    #[test]
    fn every_token_gets_its_own_jti() {
        let now = Utc::now();
        let a = Claims::new(1, TokenKind::Access, now);
        let b = Claims::new(1, TokenKind::Access, now);
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = encode_claims(&Claims::new(1, TokenKind::Access, Utc::now()), SECRET).unwrap();
        assert!(decode_claims(&token, b"other-secret").is_err());
    }

    #[test]
    fn expired_tokens_still_decode() {
        let issued = Utc::now() - Duration::days(2);
        let claims = Claims::new(1, TokenKind::Access, issued);
        let token = encode_claims(&claims, SECRET).unwrap();
        let decoded = decode_claims(&token, SECRET).unwrap();
        assert!(decoded.is_expired_at(Utc::now()));
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let claims = Claims::new(1, TokenKind::Access, now);
        let at_exp = claims.expires_at().unwrap();
        assert!(!claims.is_expired_at(at_exp));
        assert!(claims.is_expired_at(at_exp + Duration::seconds(1)));
    }
}
