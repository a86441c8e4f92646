use sea_orm::error::DbErr;
use serde::Serialize;

/// Errors surfaced by the BOM engine's service layer.
///
/// Validation and consistency failures are detected before any write and
/// abort the whole operation; callers never observe partial state.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input: bad import documents, non-positive quantities,
    /// unresolvable parent/level sequences.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Cross-structure mismatches and structural rule violations: cloning
    /// between versions of different structures, pointing a structure's
    /// current-version flag at a foreign version, deleting a node that
    /// still has children.
    #[error("Consistency error: {0}")]
    ConsistencyError(String),

    /// A structure is still referenced (as some catalog item's current
    /// structure, or by an external collaborator) and cannot be deleted.
    #[error("Referential error: {0}")]
    ReferentialError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }
}

/// Import-adapter errors, carrying row/field context so a caller can point
/// at the offending line of the source document. Converted into
/// [`ServiceError::ValidationError`] at the service boundary; the import
/// transaction rolls back as a whole.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("required column '{column}' for field '{field}' not found in input header")]
    MissingColumn { field: &'static str, column: String },

    #[error("row {row}: missing value for required field '{field}'")]
    MissingValue { row: usize, field: &'static str },

    #[error("row {row}: cannot parse '{value}' as a quantity")]
    InvalidQuantity { row: usize, value: String },

    #[error("row {row}: quantity must be greater than zero")]
    NonPositiveQuantity { row: usize },

    #[error("row {row}: cannot parse '{value}' as a level")]
    InvalidLevel { row: usize, value: String },

    #[error("row {row}: level {level} has no preceding ancestor one level up")]
    LevelSequence { row: usize, level: i32 },

    #[error("row {row}: parent reference '{reference}' does not match any earlier row")]
    UnknownParent { row: usize, reference: String },

    #[error("row {row}: item '{item_number}' not found in catalog and implicit creation is disabled")]
    UnknownItem { row: usize, item_number: String },

    #[error("document contains no items")]
    EmptyDocument,

    #[error("import exceeds the maximum of {max} nodes ({count} supplied)")]
    TooManyNodes { count: usize, max: usize },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ImportError> for ServiceError {
    fn from(err: ImportError) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}
