use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fs;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::Scope;

pub const ACCESS_AUDIENCE: &str = "identity-access";
pub const APPROVAL_AUDIENCE: &str = "admin-approval";
pub const APPROVE_ADMIN_ACTION: &str = "approve_admin";

/// JWT service for access and approval tokens
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    access_token_expiry_minutes: i64,
    approval_token_expiry_days: i64,
}

/// Claims for access tokens (short-lived)
///
/// Carries no roles or permissions; those are resolved per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (identity ID)
    pub sub: String,
    /// Scope the token was issued for
    pub scope: Scope,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    /// JWT ID
    pub jti: String,
}

impl AccessTokenClaims {
    pub fn identity_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

/// Capability claims embedded in an admin approval link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalClaims {
    pub action: String,
    pub request_id: Uuid,
    pub email: String,
    pub scope: Scope,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl JwtService {
    /// RS256 when both key paths are configured, HS256 with the shared secret otherwise.
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        let (encoding_key, decoding_key, algorithm) =
            match (&config.private_key_path, &config.public_key_path, &config.secret) {
                (Some(private_path), Some(public_path), _) => {
                    let private_key_pem = fs::read_to_string(private_path).map_err(|e| {
                        anyhow::anyhow!("Failed to read private key from {}: {}", private_path, e)
                    })?;
                    let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
                        .map_err(|e| anyhow::anyhow!("Failed to parse private key: {}", e))?;

                    let public_key_pem = fs::read_to_string(public_path).map_err(|e| {
                        anyhow::anyhow!("Failed to read public key from {}: {}", public_path, e)
                    })?;
                    let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
                        .map_err(|e| anyhow::anyhow!("Failed to parse public key: {}", e))?;

                    tracing::info!("JWT service initialized with RS256 keys");
                    (encoding_key, decoding_key, Algorithm::RS256)
                }
                (_, _, Some(secret)) if !secret.is_empty() => {
                    tracing::info!("JWT service initialized with HS256 secret");
                    (
                        EncodingKey::from_secret(secret.as_bytes()),
                        DecodingKey::from_secret(secret.as_bytes()),
                        Algorithm::HS256,
                    )
                }
                _ => {
                    return Err(anyhow::anyhow!(
                        "JWT signing requires key paths or a shared secret"
                    ))
                }
            };

        Ok(Self {
            encoding_key,
            decoding_key,
            algorithm,
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            approval_token_expiry_days: config.approval_token_expiry_days,
        })
    }

    /// HS256 service with default expiries.
    pub fn from_secret(secret: &str) -> Result<Self, anyhow::Error> {
        Self::new(&JwtConfig {
            secret: Some(secret.to_string()),
            ..JwtConfig::default()
        })
    }

    pub fn generate_access_token(
        &self,
        identity_id: Uuid,
        scope: Scope,
    ) -> Result<SignedAccessToken, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expiry_minutes);

        let claims = AccessTokenClaims {
            sub: identity_id.to_string(),
            scope,
            aud: ACCESS_AUDIENCE.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))?;

        Ok(SignedAccessToken { token, claims })
    }

    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, anyhow::Error> {
        let validation = self.validation(ACCESS_AUDIENCE);

        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow::anyhow!("Invalid access token: {}", e))?;

        Ok(token_data.claims)
    }

    pub fn generate_approval_token(
        &self,
        request_id: Uuid,
        email: &str,
        scope: Scope,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::days(self.approval_token_expiry_days);

        let claims = ApprovalClaims {
            action: APPROVE_ADMIN_ACTION.to_string(),
            request_id,
            email: email.to_string(),
            scope,
            aud: APPROVAL_AUDIENCE.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode approval token: {}", e))
    }

    /// Checks signature, expiry, audience and the `action` field.
    pub fn validate_approval_token(&self, token: &str) -> Result<ApprovalClaims, anyhow::Error> {
        let validation = self.validation(APPROVAL_AUDIENCE);

        let claims = decode::<ApprovalClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow::anyhow!("Invalid approval token: {}", e))?
            .claims;

        if claims.action != APPROVE_ADMIN_ACTION {
            return Err(anyhow::anyhow!("Unexpected approval action: {}", claims.action));
        }

        Ok(claims)
    }

    /// Get access token expiry in seconds (for client info)
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }

    fn validation(&self, audience: &str) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_audience(&[audience]);
        validation
    }
}

/// Freshly signed access token together with its claims.
#[derive(Debug, Clone)]
pub struct SignedAccessToken {
    pub token: String,
    pub claims: AccessTokenClaims,
}
