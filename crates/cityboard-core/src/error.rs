use thiserror::Error;

/// Top-level error type for the Cityboard workspace.
///
/// Covers the ambient concerns shared by every crate (configuration files,
/// the credential store, serialization). Orchestration failures that become
/// observable state have their own per-crate enums.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CityboardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Credential store error: {0}")]
    Store(String),
}

impl From<toml::de::Error> for CityboardError {
    fn from(err: toml::de::Error) -> Self {
        CityboardError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CityboardError {
    fn from(err: toml::ser::Error) -> Self {
        CityboardError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CityboardError {
    fn from(err: serde_json::Error) -> Self {
        CityboardError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Cityboard operations.
pub type Result<T> = std::result::Result<T, CityboardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CityboardError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = CityboardError::Store("read-only".to_string());
        assert_eq!(err.to_string(), "Credential store error: read-only");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CityboardError = io_err.into();
        assert!(matches!(err, CityboardError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Table>("this is {{ not toml").unwrap_err();
        let err: CityboardError = toml_err.into();
        assert!(matches!(err, CityboardError::Config(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: CityboardError = json_err.into();
        assert!(matches!(err, CityboardError::Serialization(_)));
    }
}
