use stowage_core_types::RequestId;
use thiserror::Error;

/// Result type alias using the structured error facility
pub type Result<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that callers can match on without
/// parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Lifecycle
    /// An operation was requested before bootstrap reached `Ready`
    NotInitialized,
    /// Bootstrap was requested on an orchestrator that already ran it
    AlreadyInitialized,

    // Statement execution
    /// The store rejected a statement produced by a collaborator
    StatementExecution,

    // Schema / mapping
    /// Stored values could not be turned back into a domain object
    Hydration,
    UnknownEntity,
    TypeMismatch,
    InvalidInput,

    // Scheduling
    /// The operation queue dispatcher is gone
    QueueClosed,

    // Integration/IO
    Io,
    Serialization,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::NotInitialized => "ERR_NOT_INITIALIZED",
            ExErrorKind::AlreadyInitialized => "ERR_ALREADY_INITIALIZED",
            ExErrorKind::StatementExecution => "ERR_STATEMENT_EXECUTION",
            ExErrorKind::Hydration => "ERR_HYDRATION",
            ExErrorKind::UnknownEntity => "ERR_UNKNOWN_ENTITY",
            ExErrorKind::TypeMismatch => "ERR_TYPE_MISMATCH",
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::QueueClosed => "ERR_QUEUE_CLOSED",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries a classification for programmatic handling plus the context
/// needed to debug a failed statement: the operation, the entity involved,
/// the statement text and the request it belonged to.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity: Option<String>,
    entity_id: Option<String>,
    statement: Option<String>,
    request_id: Option<RequestId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity: None,
            entity_id: None,
            statement: None,
            request_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity (table) context
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Add row id context
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add the statement text that failed
    pub fn with_statement(mut self, sql: impl Into<String>) -> Self {
        self.statement = Some(sql.into());
        self
    }

    /// Add request ID context
    ///
    /// Keeps an existing request id: the innermost operation that saw the
    /// error first is the one that owns it.
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        if self.request_id.is_none() {
            self.request_id = Some(request_id);
        }
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the entity context, if any
    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    /// Get the row id context, if any
    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    /// Get the failed statement, if any
    pub fn statement(&self) -> Option<&str> {
        self.statement.as_deref()
    }

    /// Get the request ID context, if any
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity) = &self.entity {
            write!(f, " (entity: {})", entity)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (id: {})", entity_id)?;
        }
        if let Some(statement) = &self.statement {
            write!(f, " (sql: {})", statement)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Domain error taxonomy for persistence operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StowageError {
    /// Orchestrator used before bootstrap completed
    #[error("Orchestrator is not initialized (schema state: {state})")]
    NotInitialized { state: String },

    /// Bootstrap requested twice
    #[error("Orchestrator bootstrap already ran (schema state: {state})")]
    AlreadyInitialized { state: String },

    /// The store rejected a statement
    #[error("Statement failed: {reason}")]
    StatementFailed { sql: String, reason: String },

    /// Entity name not present in the schema registry
    #[error("Unknown entity: {name}")]
    UnknownEntity { name: String },

    /// A hydrated or related object was not of the requested type
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// An object reported a different number of values than its definition declares
    #[error("Entity {entity} declares {expected} columns but produced {found} values")]
    ColumnCountMismatch {
        entity: String,
        expected: usize,
        found: usize,
    },

    /// A result row is missing a declared column
    #[error("Column {column} missing from result row for entity {entity}")]
    MissingColumn { entity: String, column: String },

    /// A stored value could not be converted to the declared column kind
    #[error("Invalid value for {entity}.{column}: {reason}")]
    InvalidColumnValue {
        entity: String,
        column: String,
        reason: String,
    },

    /// A related object has no row id when its join row is written
    #[error("Related object in {entity}.{relation} has no row id")]
    MissingRelatedId { entity: String, relation: String },

    /// The queue dispatcher is no longer accepting work
    #[error("Operation queue is closed")]
    QueueClosed,

    /// An asynchronous operation finished without reporting a result
    #[error("Asynchronous operation was abandoned before completion")]
    OperationAbandoned,
}

impl From<StowageError> for ExError {
    fn from(err: StowageError) -> Self {
        let message = err.to_string();
        match err {
            StowageError::NotInitialized { .. } => {
                ExError::new(ExErrorKind::NotInitialized).with_message(message)
            }
            StowageError::AlreadyInitialized { .. } => {
                ExError::new(ExErrorKind::AlreadyInitialized)
                    .with_op("bootstrap")
                    .with_message(message)
            }
            StowageError::StatementFailed { sql, .. } => {
                ExError::new(ExErrorKind::StatementExecution)
                    .with_statement(sql)
                    .with_message(message)
            }
            StowageError::UnknownEntity { name } => ExError::new(ExErrorKind::UnknownEntity)
                .with_entity(name)
                .with_message(message),
            StowageError::TypeMismatch { .. } => {
                ExError::new(ExErrorKind::TypeMismatch).with_message(message)
            }
            StowageError::ColumnCountMismatch { entity, .. } => {
                ExError::new(ExErrorKind::InvalidInput)
                    .with_entity(entity)
                    .with_message(message)
            }
            StowageError::MissingColumn { entity, .. }
            | StowageError::InvalidColumnValue { entity, .. } => {
                ExError::new(ExErrorKind::Hydration)
                    .with_entity(entity)
                    .with_message(message)
            }
            StowageError::MissingRelatedId { entity, .. } => {
                ExError::new(ExErrorKind::InvalidInput)
                    .with_entity(entity)
                    .with_message(message)
            }
            StowageError::QueueClosed => ExError::new(ExErrorKind::QueueClosed).with_message(message),
            StowageError::OperationAbandoned => {
                ExError::new(ExErrorKind::Internal).with_message(message)
            }
        }
    }
}
