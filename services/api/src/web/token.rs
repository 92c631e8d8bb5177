//! services/api/src/web/token.rs
//!
//! Bearer token validation and JWT issuance.
//!
//! Validation runs in a fixed order and stops at the first failure: header
//! presence, structure and signature, expiry, then resolution of the live
//! principal and the subject match. Expiry is classified here rather than by
//! the decoder so that an expired token is always reported as `token_expired`.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use reservation_core::{
    DatabaseService, Failure, FailureClass, FailureKind, PortError, Principal, User,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::error::ApiError;

//=========================================================================================
// Claims
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// The claims carried by every issued token. Only `sub`, `token_type`, `exp`
/// and `iat` take part in validation; the rest are informational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub token_type: TokenType,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub username: String,
    pub email: String,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    pub role: Option<String>,
}

impl Claims {
    fn for_user(user: &User, token_type: TokenType, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub: user.id.to_string(),
            token_type,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role.as_ref().map(|role| role.name.clone()),
        }
    }

    /// The subject as a user id.
    pub fn subject(&self) -> Result<Uuid, Failure> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| Failure::new(FailureKind::InvalidToken, "Token subject is not a valid user id."))
    }
}

pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

//=========================================================================================
// The JWT Manager
//=========================================================================================

#[derive(Clone)]
pub struct JwtManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtManager {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.jwt_secret,
            Duration::minutes(config.access_token_ttl_minutes),
            Duration::hours(config.refresh_token_ttl_hours),
        )
    }

    pub fn issue(
        &self,
        user: &User,
        token_type: TokenType,
        now: DateTime<Utc>,
    ) -> Result<String, ApiError> {
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        let claims = Claims::for_user(user, token_type, now, ttl);
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }

    pub fn issue_pair(&self, user: &User, now: DateTime<Utc>) -> Result<TokenPair, ApiError> {
        Ok(TokenPair {
            access: self.issue(user, TokenType::Access, now)?,
            refresh: self.issue(user, TokenType::Refresh, now)?,
        })
    }

    /// Checks structure, signature, token type and expiry of a raw token.
    pub fn decode(
        &self,
        token: &str,
        expected: TokenType,
        now: DateTime<Utc>,
    ) -> Result<Claims, Failure> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidToken
                | ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidAlgorithmName
                | ErrorKind::MissingRequiredClaim(_)
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => {
                    Failure::new(FailureKind::InvalidToken, "Token is invalid.")
                }
                other => {
                    debug!("Unexpected token decoding error: {:?}", other);
                    Failure::new(FailureKind::TokenValidationFailed, "Token validation failed.")
                }
            })?
            .claims;

        if claims.token_type != expected {
            return Err(Failure::new(
                FailureKind::InvalidToken,
                "Token has the wrong type.",
            ));
        }
        if claims.exp <= now.timestamp() {
            return Err(Failure::new(FailureKind::TokenExpired, "Token has expired."));
        }
        Ok(claims)
    }
}

//=========================================================================================
// Request Authentication
//=========================================================================================

/// Extracts the token from an `Authorization` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, Failure> {
    let header = header.ok_or_else(|| {
        Failure::new(
            FailureKind::NoToken,
            "Authentication credentials were not provided.",
        )
    })?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            Failure::new(
                FailureKind::InvalidTokenHeader,
                "Authorization header must be 'Bearer <token>'.",
            )
        })
}

/// Rejects a principal that is not the token's subject with
/// `token_user_mismatch`. `resolve_principal` looks the user up by `sub`, so
/// this cannot fail there today; it stays as a guard for any lookup that
/// resolves the principal some other way.
pub fn ensure_subject(claims: &Claims, principal: &Principal) -> Result<(), Failure> {
    if claims.subject()? == principal.user_id {
        Ok(())
    } else {
        Err(Failure::new(
            FailureKind::TokenUserMismatch,
            "Token does not belong to this user.",
        ))
    }
}

/// Re-reads the token's subject from the user store. The subject is still
/// compared with the loaded user through [`ensure_subject`], even though the
/// lookup key is `sub` itself.
pub async fn resolve_principal(
    db: &dyn DatabaseService,
    claims: &Claims,
) -> Result<Principal, ApiError> {
    let user = match db.get_user_by_id(claims.subject()?).await {
        Ok(user) => user,
        Err(PortError::NotFound(_)) => {
            return Err(Failure::new(FailureKind::UserNotFound, "User not found.").into())
        }
        Err(e) => return Err(e.into()),
    };
    if !user.is_active {
        return Err(Failure::new(FailureKind::UserInactive, "User account is disabled.").into());
    }

    let principal = Principal::from(user);
    ensure_subject(claims, &principal)?;
    Ok(principal)
}

/// Validates an `Authorization` header value and resolves the live principal.
pub async fn authenticate(
    jwt: &JwtManager,
    db: &dyn DatabaseService,
    header: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Principal, ApiError> {
    let token = bearer_token(header)?;
    let claims = jwt.decode(token, TokenType::Access, now)?;
    resolve_principal(db, &claims).await
}

/// Validates a refresh token. Every authentication failure is reported as
/// `invalid_refresh_token`.
pub async fn authenticate_refresh(
    jwt: &JwtManager,
    db: &dyn DatabaseService,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Principal, ApiError> {
    let resolved = match jwt.decode(token, TokenType::Refresh, now) {
        Ok(claims) => resolve_principal(db, &claims).await,
        Err(failure) => Err(failure.into()),
    };

    resolved.map_err(|e| match e {
        ApiError::Rejected(failure) if failure.class() == FailureClass::Authentication => {
            debug!(code = failure.code(), "Refresh token rejected");
            Failure::new(
                FailureKind::InvalidRefreshToken,
                "Refresh token is invalid or expired.",
            )
            .into()
        }
        other => other,
    })
}
