/// Engine errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(
        "No grouping satisfies the rules after {attempts} attempt(s); relax the rules or change the group size"
    )]
    ConstraintUnsatisfiable { attempts: usize },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Only produced by the history decoder; callers recover locally.
    #[error("Malformed history entry for student {student_id}: {reason}")]
    MalformedHistoryEntry { student_id: i32, reason: String },
}

impl EngineError {
    /// Short machine-readable name for the error class
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidArgument(_) => "InvalidArgument",
            EngineError::ConstraintUnsatisfiable { .. } => "ConstraintUnsatisfiable",
            EngineError::NotFound(_) => "NotFound",
            EngineError::StorageUnavailable(_) | EngineError::Database(_) => "StorageUnavailable",
            EngineError::MalformedHistoryEntry { .. } => "MalformedHistoryEntry",
        }
    }

    /// True for failures raised by an external collaborator
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            EngineError::StorageUnavailable(_) | EngineError::Database(_)
        )
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
