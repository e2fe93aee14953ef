use axum::{
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use service_core::error::AppError;
use validator::{Validate, ValidationError};

use crate::models::Target;

/// JSON body that has passed `validator` checks.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Json parse error: {}", e)))?;

        value.validate()?;

        Ok(ValidatedJson(value))
    }
}

/// Accepts an e-mail address or E.164 phone number.
pub fn validate_target(value: &str) -> Result<(), ValidationError> {
    Target::parse(value).map(|_| ()).map_err(|msg| {
        let mut err = ValidationError::new("target");
        err.message = Some(msg.into());
        err
    })
}

/// Six ASCII digits.
pub fn validate_otp_code(value: &str) -> Result<(), ValidationError> {
    if value.len() == 6 && value.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("otp_code");
        err.message = Some("Code must be 6 digits".into());
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_otp_code() {
        assert!(validate_otp_code("012345").is_ok());
        assert!(validate_otp_code("12345").is_err());
        assert!(validate_otp_code("12345a").is_err());
        assert!(validate_otp_code("1234567").is_err());
    }

    #[test]
    fn test_validate_target() {
        assert!(validate_target("a@x.com").is_ok());
        assert!(validate_target("+2348012345678").is_ok());
        assert!(validate_target("nobody").is_err());
    }
}
