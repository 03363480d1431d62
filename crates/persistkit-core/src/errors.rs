use thiserror::Error;

/// Result type alias using PersistError
pub type Result<T> = std::result::Result<T, PersistError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Every failure a repository, translator, registry or population call can
/// raise maps onto one of these kinds, each with a stable `ERR_*` code.
/// Absence of an entity is never an error and has no kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Validation (raised before any backend call)
    InvalidField,
    UnknownColumn,
    InvalidSort,
    InvalidOperator,
    InvalidOperand,
    InvalidInclude,
    InvalidEntity,

    // Storage
    ConstraintViolation,
    BackendFailure,
    Serialization,

    // Wiring
    UnknownEntity,
    BackendUnavailable,
    Configuration,
    ContextShutdown,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidField => "ERR_INVALID_FIELD",
            ExErrorKind::UnknownColumn => "ERR_UNKNOWN_COLUMN",
            ExErrorKind::InvalidSort => "ERR_INVALID_SORT",
            ExErrorKind::InvalidOperator => "ERR_INVALID_OPERATOR",
            ExErrorKind::InvalidOperand => "ERR_INVALID_OPERAND",
            ExErrorKind::InvalidInclude => "ERR_INVALID_INCLUDE",
            ExErrorKind::InvalidEntity => "ERR_INVALID_ENTITY",
            ExErrorKind::ConstraintViolation => "ERR_CONSTRAINT_VIOLATION",
            ExErrorKind::BackendFailure => "ERR_BACKEND_FAILURE",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::UnknownEntity => "ERR_UNKNOWN_ENTITY",
            ExErrorKind::BackendUnavailable => "ERR_BACKEND_UNAVAILABLE",
            ExErrorKind::Configuration => "ERR_CONFIGURATION",
            ExErrorKind::ContextShutdown => "ERR_CONTEXT_SHUTDOWN",
        }
    }

    /// Validation kinds are deterministic and raised before storage is touched
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ExErrorKind::InvalidField
                | ExErrorKind::UnknownColumn
                | ExErrorKind::InvalidSort
                | ExErrorKind::InvalidOperator
                | ExErrorKind::InvalidOperand
                | ExErrorKind::InvalidInclude
                | ExErrorKind::InvalidEntity
        )
    }
}

/// Canonical structured error type
///
/// Flattened view of a [`PersistError`] used by the logging facility and by
/// hosts that want a stable code plus context rather than a Rust enum.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_key: Option<String>,
    field: Option<String>,
    message: String,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_key: None,
            field: None,
            message: String::new(),
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add entity key context
    pub fn with_entity_key(mut self, key: impl Into<String>) -> Self {
        self.entity_key = Some(key.into());
        self
    }

    /// Add field (or column) context
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn entity_key(&self) -> Option<&str> {
        self.entity_key.as_deref()
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
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
        if let Some(key) = &self.entity_key {
            write!(f, " (entity: {})", key)?;
        }
        if let Some(field) = &self.field {
            write!(f, " (field: {})", field)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {}

// ========== End Error Facility ==========

/// Error taxonomy for persistence operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistError {
    // ===== Validation =====
    /// Criteria or entity referenced an attribute the entity does not declare
    #[error("Field '{field}' is not a valid attribute for {entity}")]
    InvalidField { entity: String, field: String },

    /// Attribute is declared but its column is missing from the table
    #[error("Column '{column}' does not exist on table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// Sort attribute is not declared by the entity
    #[error("Invalid sort attribute: {field}")]
    InvalidSort { entity: String, field: String },

    /// Range payload used an operator outside gte/gt/lte/lt/eq/ne/in/between
    #[error("Unsupported operator '{op}' on field '{field}'")]
    InvalidOperator { field: String, op: String },

    /// Range operator payload has the wrong shape
    #[error("Invalid operand for '{op}' on field '{field}': {reason}")]
    InvalidOperand {
        field: String,
        op: String,
        reason: String,
    },

    /// Include path rejected before population starts
    #[error("Invalid include path '{path}': {reason}")]
    InvalidInclude { path: String, reason: String },

    /// Entity value cannot be stored (not an object, missing identity)
    #[error("Invalid {entity} entity: {reason}")]
    InvalidEntity { entity: String, reason: String },

    // ===== Storage =====
    /// Duplicate identity or unique-index conflict reported by the backend
    #[error("Constraint violation on {entity} ({constraint}): {message}")]
    ConstraintViolation {
        entity: String,
        constraint: String,
        message: String,
    },

    /// Driver, connectivity or timeout failure; never retried here
    #[error("Backend failure during {op}: {message}")]
    Backend { op: String, message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    // ===== Wiring =====
    #[error("Entity key not registered: {entity_key}")]
    UnknownEntity { entity_key: String },

    /// Resolved backend has no connected handle in this context
    #[error("No {backend} backend handle available for entity {entity_key}")]
    BackendUnavailable { entity_key: String, backend: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Persistence context has been shut down")]
    ContextShutdown,
}

impl PersistError {
    /// Wrap a driver failure
    pub fn backend(op: impl Into<String>, err: impl std::fmt::Display) -> Self {
        PersistError::Backend {
            op: op.into(),
            message: err.to_string(),
        }
    }

    /// Canonical kind of this error
    pub fn kind(&self) -> ExErrorKind {
        match self {
            PersistError::InvalidField { .. } => ExErrorKind::InvalidField,
            PersistError::UnknownColumn { .. } => ExErrorKind::UnknownColumn,
            PersistError::InvalidSort { .. } => ExErrorKind::InvalidSort,
            PersistError::InvalidOperator { .. } => ExErrorKind::InvalidOperator,
            PersistError::InvalidOperand { .. } => ExErrorKind::InvalidOperand,
            PersistError::InvalidInclude { .. } => ExErrorKind::InvalidInclude,
            PersistError::InvalidEntity { .. } => ExErrorKind::InvalidEntity,
            PersistError::ConstraintViolation { .. } => ExErrorKind::ConstraintViolation,
            PersistError::Backend { .. } => ExErrorKind::BackendFailure,
            PersistError::Serialization { .. } => ExErrorKind::Serialization,
            PersistError::UnknownEntity { .. } => ExErrorKind::UnknownEntity,
            PersistError::BackendUnavailable { .. } => ExErrorKind::BackendUnavailable,
            PersistError::Configuration { .. } => ExErrorKind::Configuration,
            PersistError::ContextShutdown => ExErrorKind::ContextShutdown,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind().is_validation()
    }
}

/// Conversion from PersistError to ExError
impl From<PersistError> for ExError {
    fn from(err: PersistError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        let ex = ExError::new(kind).with_message(message);
        match err {
            PersistError::InvalidField { entity, field }
            | PersistError::InvalidSort { entity, field } => {
                ex.with_entity_key(entity).with_field(field)
            }
            PersistError::UnknownColumn { column, .. } => ex.with_field(column),
            PersistError::InvalidOperator { field, op } => ex.with_field(field).with_op(op),
            PersistError::InvalidOperand { field, op, .. } => ex.with_field(field).with_op(op),
            PersistError::InvalidEntity { entity, .. }
            | PersistError::ConstraintViolation { entity, .. } => ex.with_entity_key(entity),
            PersistError::Backend { op, .. } => ex.with_op(op),
            PersistError::UnknownEntity { entity_key }
            | PersistError::BackendUnavailable { entity_key, .. } => {
                ex.with_entity_key(entity_key)
            }
            PersistError::InvalidInclude { .. }
            | PersistError::Serialization { .. }
            | PersistError::Configuration { .. }
            | PersistError::ContextShutdown => ex,
        }
    }
}

impl From<&PersistError> for ExError {
    fn from(err: &PersistError) -> Self {
        ExError::from(err.clone())
    }
}

/// Conversion from serde_json::Error to PersistError
impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        PersistError::Serialization {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_kinds() {
        let validation = [
            ExErrorKind::InvalidField,
            ExErrorKind::UnknownColumn,
            ExErrorKind::InvalidSort,
            ExErrorKind::InvalidOperator,
            ExErrorKind::InvalidOperand,
            ExErrorKind::InvalidInclude,
            ExErrorKind::InvalidEntity,
        ];
        for kind in validation {
            assert!(kind.is_validation(), "{:?} should be validation", kind);
        }
        assert!(!ExErrorKind::ConstraintViolation.is_validation());
        assert!(!ExErrorKind::BackendFailure.is_validation());
    }

    #[test]
    fn test_unknown_column_distinct_from_invalid_field() {
        let column = PersistError::UnknownColumn {
            table: "orders".into(),
            column: "total".into(),
        };
        let field = PersistError::InvalidField {
            entity: "order".into(),
            field: "total".into(),
        };
        assert_ne!(column.kind(), field.kind());
        assert_eq!(column.kind().code(), "ERR_UNKNOWN_COLUMN");
    }

    #[test]
    fn test_display_includes_code_and_context() {
        let ex: ExError = PersistError::InvalidField {
            entity: "order".into(),
            field: "colour".into(),
        }
        .into();
        let rendered = ex.to_string();
        assert!(rendered.starts_with("[ERR_INVALID_FIELD]"));
        assert!(rendered.contains("(entity: order)"));
        assert!(rendered.contains("(field: colour)"));
    }

    #[test]
    fn test_serde_json_error_is_serialization() {
        let err: PersistError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ExErrorKind::Serialization);
    }
}
