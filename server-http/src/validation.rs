use crate::api::requests::SignupRequest;
use crate::error::ApiError;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required field '{field}'")]
    MissingRequiredField { field: &'static str },
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

/// Reject empty credentials before any hashing or storage work
pub fn validate_credentials(username: &str, password: &str) -> Result<(), ValidationError> {
    if username.trim().is_empty() {
        return Err(ValidationError::MissingRequiredField { field: "username" });
    }
    if password.is_empty() {
        return Err(ValidationError::MissingRequiredField { field: "password" });
    }
    Ok(())
}

impl SignupRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_credentials(&self.username, &self.password)
    }
}
