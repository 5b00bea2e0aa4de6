//! Validation of anonymized signatures
//!
//! Validation is an explicit step run on the scrubbed copy of a signature
//! before it is written. Limits come from an immutable
//! [`SignatureValidationConfig`]; nothing is triggered implicitly by the
//! persistence layer.

use crate::constants::validation::{MAX_LOCATION_CODE_LENGTH, MAX_POSTCODE_LENGTH};
use crate::models::{Signature, SignatureState};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single failed validation rule
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Validation failed for signature {signature_id}: {field} {message}")]
pub struct ValidationError {
    pub signature_id: i64,
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(signature_id: i64, field: &'static str, message: impl Into<String>) -> Self {
        Self {
            signature_id,
            field,
            message: message.into(),
        }
    }
}

/// Limits applied when validating signatures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureValidationConfig {
    pub max_location_code_length: usize,
    pub max_postcode_length: usize,
}

impl Default for SignatureValidationConfig {
    fn default() -> Self {
        Self {
            max_location_code_length: MAX_LOCATION_CODE_LENGTH,
            max_postcode_length: MAX_POSTCODE_LENGTH,
        }
    }
}

/// Validates signatures after anonymization
#[derive(Debug, Clone, Default)]
pub struct SignatureValidator {
    config: SignatureValidationConfig,
}

impl SignatureValidator {
    pub fn new(config: SignatureValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SignatureValidationConfig {
        &self.config
    }

    /// Validate an anonymized signature, returning the first failed rule
    pub fn validate_anonymized(&self, signature: &Signature) -> Result<(), ValidationError> {
        let id = signature.id;

        signature
            .state
            .parse::<SignatureState>()
            .map_err(|_| {
                ValidationError::new(
                    id,
                    "state",
                    format!("'{}' is not a known state", signature.state),
                )
            })?;

        match signature.location_code.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(ValidationError::new(id, "location_code", "can't be blank"));
            }
            Some(code) if code.chars().count() > self.config.max_location_code_length => {
                return Err(ValidationError::new(
                    id,
                    "location_code",
                    format!(
                        "is too long (maximum is {} characters)",
                        self.config.max_location_code_length
                    ),
                ));
            }
            Some(_) => {}
        }

        if let Some(postcode) = signature.postcode.as_deref() {
            if postcode.chars().count() > self.config.max_postcode_length {
                return Err(ValidationError::new(
                    id,
                    "postcode",
                    format!(
                        "is too long (maximum is {} characters)",
                        self.config.max_postcode_length
                    ),
                ));
            }
        }

        match signature.anonymized_at {
            None => {
                return Err(ValidationError::new(id, "anonymized_at", "can't be blank"));
            }
            Some(at) if at < signature.created_at => {
                return Err(ValidationError::new(
                    id,
                    "anonymized_at",
                    "can't be earlier than created_at",
                ));
            }
            Some(_) => {}
        }

        let leftover_pii = [
            ("name", signature.name.is_some()),
            ("email", signature.email.is_some()),
            ("ip_address", signature.ip_address.is_some()),
            ("uuid", signature.uuid.is_some()),
        ];
        if let Some((field, _)) = leftover_pii.iter().find(|(_, present)| *present) {
            return Err(ValidationError::new(id, *field, "must be removed when anonymized"));
        }

        Ok(())
    }
}
