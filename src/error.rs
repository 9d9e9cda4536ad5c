//! Custom error types for chunkvault

use thiserror::Error;

/// Main error type for chunkvault operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Text processing error: {0}")]
    Text(String),

    #[error("Shutting down: no new writes are accepted")]
    ShuttingDown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Index file encoding error: {0}")]
    IndexEncoding(#[from] bincode::Error),
}

/// Coarse classification used by callers that need to tell "absent" from "broken"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Validation,
    Storage,
    Index,
    Provider,
    Config,
    Unavailable,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Database(sqlx::Error::RowNotFound) => ErrorKind::NotFound,
            Error::Database(e) if is_fts_syntax_error(e) => ErrorKind::BadRequest,
            Error::Database(_) | Error::Json(_) | Error::Io(_) => ErrorKind::Storage,
            Error::BadRequest(_) => ErrorKind::BadRequest,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Index(_) | Error::IndexEncoding(_) => ErrorKind::Index,
            Error::Provider(_) | Error::Http(_) => ErrorKind::Provider,
            Error::Config(_)
            | Error::Text(_)
            | Error::UrlParse(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_) => ErrorKind::Config,
            Error::ShuttingDown => ErrorKind::Unavailable,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Malformed MATCH expressions surface as `fts5: syntax error ...`, except
/// for a dangling quote and an unknown column filter
fn is_fts_syntax_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            let msg = db.message();
            msg.starts_with("fts5:")
                || msg == "unterminated string"
                || msg.starts_with("no such column")
        }
        _ => false,
    }
}

/// Result type alias for chunkvault
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_is_not_found() {
        let err = Error::from(sqlx::Error::RowNotFound);
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_kinds_are_distinct() {
        assert_eq!(Error::BadRequest("q".into()).kind(), ErrorKind::BadRequest);
        assert_eq!(Error::Validation("n".into()).kind(), ErrorKind::Validation);
        assert_eq!(Error::Index("graph".into()).kind(), ErrorKind::Index);
        assert_eq!(
            Error::Database(sqlx::Error::PoolClosed).kind(),
            ErrorKind::Storage
        );
        assert!(!Error::Index("graph".into()).is_not_found());
    }

    #[test]
    fn test_bare_io_is_storage() {
        let err = Error::from(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"));
        assert_eq!(err.kind(), ErrorKind::Storage);
    }
}
