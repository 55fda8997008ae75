use thiserror::Error;

#[derive(Error, Debug)]
pub enum UboError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Registry request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field '{field}'")]
    MissingConfigError { field: String },

    #[error("Unusable entity identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: String },

    #[error("Registry returned {code} for entity {id}")]
    RegistryError { id: String, code: String },

    #[error("Registry payload for entity {id} could not be read: {message}")]
    RegistryPayload { id: String, message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Registry,
    Processing,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl UboError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            UboError::ConfigError { .. }
            | UboError::ConfigValidationError { .. }
            | UboError::InvalidConfigValueError { .. }
            | UboError::MissingConfigError { .. } => ErrorCategory::Configuration,
            UboError::InvalidIdentifier { .. } => ErrorCategory::Input,
            UboError::ApiError(_)
            | UboError::RegistryError { .. }
            | UboError::RegistryPayload { .. } => ErrorCategory::Registry,
            UboError::CsvError(_)
            | UboError::SerializationError(_)
            | UboError::ProcessingError { .. } => ErrorCategory::Processing,
            UboError::ZipError(_) | UboError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Registry => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Input => ErrorSeverity::High,
            ErrorCategory::Processing => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            UboError::InvalidIdentifier { .. } => {
                "Enter the 8-digit registration number of the target company (7 digits are padded with a leading zero)"
            }
            UboError::ApiError(_) | UboError::RegistryError { .. } => {
                "Check network access to the registry endpoint and retry; rate limits clear after a short pause"
            }
            UboError::RegistryPayload { .. } => {
                "The registry answered with an unexpected document; verify the endpoint template points at the VR API"
            }
            UboError::MissingConfigError { .. }
            | UboError::ConfigError { .. }
            | UboError::ConfigValidationError { .. }
            | UboError::InvalidConfigValueError { .. } => {
                "Review the case file and command-line flags; run with --dry-run to validate without network calls"
            }
            UboError::ZipError(_) | UboError::IoError(_) => {
                "Make sure the output directory exists and is writable"
            }
            UboError::CsvError(_)
            | UboError::SerializationError(_)
            | UboError::ProcessingError { .. } => "Re-run with --verbose and inspect the log output",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Input => format!("Cannot start the resolution: {}", self),
            ErrorCategory::Registry => format!("Business registry unavailable: {}", self),
            ErrorCategory::Processing => format!("Assessment could not be completed: {}", self),
            ErrorCategory::System => format!("Could not write the report: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, UboError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_errors_are_retryable_severity() {
        let err = UboError::RegistryError {
            id: "00006947".to_string(),
            code: "HTTP 404".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Registry);
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert!(err.user_friendly_message().contains("00006947"));
    }

    #[test]
    fn test_invalid_identifier_is_input_error() {
        let err = UboError::InvalidIdentifier {
            value: "abc".to_string(),
            reason: "no digits".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Input);
        assert_eq!(err.severity(), ErrorSeverity::High);
    }
}
