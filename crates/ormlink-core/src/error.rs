//! Error types for ormlink operations.

use std::fmt;

/// The primary error type for all ormlink operations.
#[derive(Debug)]
pub enum Error {
    /// Relation/schema configuration errors (fatal, never retried)
    Config(ConfigError),
    /// Errors reported by the query-execution collaborator
    Query(QueryError),
    /// Connection-related errors reported by the collaborator
    Connection(ConnectionError),
    /// Type conversion errors while populating typed records
    Type(TypeError),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

/// A relation or schema declaration that cannot be used as requested.
#[derive(Debug)]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// Requested relation is not declared on the record type
    UnknownRelation,
    /// Requested relation differs only in case from a declared one
    RelationNameCase,
    /// Record type is not registered in the schema
    UnknownRecordType,
    /// Relation target does not match the type the caller asked for
    TargetTypeMismatch,
    /// A via relation/table cannot be resolved to a junction
    UnresolvableVia,
    /// Link declaration is empty or references unknown attributes
    InvalidLink,
    /// Relation path is empty or malformed
    InvalidPath,
    /// Name is not a valid identifier
    InvalidIdentifier,
    /// Requested mode cannot be combined with this operation
    UnsupportedMode,
}

impl ConfigErrorKind {
    /// Short label used in error messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            ConfigErrorKind::UnknownRelation => "unknown relation",
            ConfigErrorKind::RelationNameCase => "relation name case mismatch",
            ConfigErrorKind::UnknownRecordType => "unknown record type",
            ConfigErrorKind::TargetTypeMismatch => "target type mismatch",
            ConfigErrorKind::UnresolvableVia => "unresolvable via",
            ConfigErrorKind::InvalidLink => "invalid link",
            ConfigErrorKind::InvalidPath => "invalid relation path",
            ConfigErrorKind::InvalidIdentifier => "invalid identifier",
            ConfigErrorKind::UnsupportedMode => "unsupported mode",
        }
    }
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Malformed filter or statement
    Syntax,
    /// Table or column not found
    NotFound,
    /// Deadlock detected
    Deadlock,
    /// Statement timeout
    Timeout,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Connection lost during operation
    Disconnected,
    /// Connection refused
    Refused,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl Error {
    /// Build a configuration error.
    pub fn config(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            kind,
            message: message.into(),
        })
    }

    /// Build a query error without an underlying source.
    pub fn query(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Error::Query(QueryError {
            kind,
            sql: None,
            message: message.into(),
            source: None,
        })
    }

    /// Is this a configuration error?
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// The configuration error kind, if this is a configuration error.
    pub fn config_kind(&self) -> Option<ConfigErrorKind> {
        match self {
            Error::Config(c) => Some(c.kind),
            _ => None,
        }
    }

    /// Is this a retryable error (deadlock, timeouts)?
    ///
    /// The relation engine never retries on its own; this is for callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Query(q) => matches!(q.kind, QueryErrorKind::Deadlock | QueryErrorKind::Timeout),
            _ => false,
        }
    }

    /// Is this a connection error that likely requires reconnection?
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for ormlink operations.
pub type Result<T> = std::result::Result<T, Error>;
