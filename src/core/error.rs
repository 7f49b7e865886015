use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Document '{0}' already exists")]
    IdentifierConflict(String),

    #[error("Revision conflict on document '{0}'")]
    Conflict(String),

    #[error("Document '{0}' not found")]
    NotFound(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Index provisioning failed: {0}")]
    Provisioning(String),

    #[error("Index already exists: {0}")]
    IndexExists(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Codec error: {0}")]
    Codec(String),
}

impl PersistError {
    /// Provisioning failures abort startup; everything else is left to the caller.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Provisioning(_))
    }
}

pub type Result<T> = std::result::Result<T, PersistError>;

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<std::io::Error> for PersistError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_provisioning_is_fatal() {
        assert!(!PersistError::Provisioning("boom".to_string()).is_recoverable());
        assert!(PersistError::Conflict("p::a".to_string()).is_recoverable());
        assert!(PersistError::StorageUnavailable("down".to_string()).is_recoverable());
    }

    #[test]
    fn test_display_messages() {
        let err = PersistError::IdentifierConflict("p::my_talk".to_string());
        assert_eq!(err.to_string(), "Document 'p::my_talk' already exists");

        let err: PersistError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, PersistError::Codec(_)));
    }
}
