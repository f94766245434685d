use thiserror::Error;

/// Top-level error type for the PMO decision pipeline.
///
/// Subsystem crates define their own error types and wrap `PmoError` via
/// `#[from]` so that the `?` operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PmoError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for PmoError {
    fn from(err: toml::de::Error) -> Self {
        PmoError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for PmoError {
    fn from(err: toml::ser::Error) -> Self {
        PmoError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for PmoError {
    fn from(err: serde_json::Error) -> Self {
        PmoError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for PMO operations.
pub type Result<T> = std::result::Result<T, PmoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let cases: Vec<(PmoError, &str)> = vec![
            (
                PmoError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                PmoError::Storage("disk full".to_string()),
                "Storage error: disk full",
            ),
            (
                PmoError::Constraint("duplicate".to_string()),
                "Constraint violation: duplicate",
            ),
            (
                PmoError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PmoError = io_err.into();
        assert!(matches!(err, PmoError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let pmo_err: PmoError = err.unwrap_err().into();
        assert!(matches!(pmo_err, PmoError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let pmo_err: PmoError = err.unwrap_err().into();
        assert!(matches!(pmo_err, PmoError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
