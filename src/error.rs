//! Error types for lexcase.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Foreign key violation: {0}")]
    ForeignKey(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[cfg(feature = "libsql")]
    #[error("LibSQL error: {0}")]
    LibSql(libsql::Error),
}

#[cfg(feature = "libsql")]
impl From<libsql::Error> for DatabaseError {
    fn from(err: libsql::Error) -> Self {
        let message = err.to_string();
        if message.contains("UNIQUE constraint failed") {
            Self::Constraint(message)
        } else if message.contains("FOREIGN KEY constraint failed") {
            Self::ForeignKey(message)
        } else {
            Self::LibSql(err)
        }
    }
}

impl DatabaseError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Constraint(_))
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(self, Self::ForeignKey(_))
    }
}

/// HTTP server startup errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Server {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },
}

/// Account and session errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Invalid or expired session token")]
    InvalidToken,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Errors surfaced by the single-table notification service.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("{0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("{0}")]
    PayloadTooLarge(String),
}

impl NotificationError {
    /// Stable machine-readable code carried in the result envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
        }
    }
}

impl From<DatabaseError> for NotificationError {
    fn from(err: DatabaseError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Workflow rule violations (category tree, phase transitions).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("Category hierarchy would contain a cycle")]
    Cycle,

    #[error("Unknown parent category: {0}")]
    UnknownParent(String),

    #[error("Phase {phase} does not belong to category {category}")]
    PhaseOutsideCategory { phase: String, category: String },

    #[error("Case is already in phase {0}")]
    SamePhase(String),

    #[error("No transition rule from {from} to {to}")]
    NoRule { from: String, to: String },

    #[error("A case without a phase must enter the first phase of its category")]
    NotInitialPhase,

    #[error("Due date offset of {0} days is out of range")]
    DueDateOutOfRange(i64),
}

/// Phase transition failures, including missing referenced records.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("Case not found")]
    CaseNotFound,

    #[error("Phase not found")]
    PhaseNotFound,

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// In-memory timer state errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    #[error("Timer not found")]
    NotFound,

    #[error("Timer is not running")]
    NotRunning,

    #[error("Timer is not paused")]
    NotPaused,
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Transition error: {0}")]
    Transition(#[from] TransitionError),

    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),
}
