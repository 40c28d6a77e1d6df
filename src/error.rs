//! Error taxonomy for the solver core (spec §6/§7).

use derive_more::{Display, Error};

/// Integer error codes returned through the parameter array's error slot
/// (spec §6 "Error codes").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    Success = 0,
    Unknown = 1,
    Alloc = 2,
    Internal = 7,
    BadParameter = 8,
    Matrix = 13,
    StepOrder = 15,
}

/// All fallible outcomes in the solver core.
///
/// Numeric events (pivot clamps, static pivoting count) are *not* modeled as
/// errors; they are reported through `FactorReport` (see `numeric::factor`)
/// and only become an error once a user-configured limit is exceeded
/// (`PivotLimitExceeded`).
#[derive(Debug, Display, Error, PartialEq)]
pub enum PastixError {
    #[display("allocation failed")]
    Alloc,

    #[display("internal error: {message}")]
    Internal { message: &'static str },

    #[display("bad parameter: {message}")]
    BadParameter { message: &'static str },

    #[display("matrix/structural error: {message}")]
    Matrix { message: String },

    #[display("step called out of order: {message}")]
    StepOrder { message: &'static str },

    #[display("symbol build failed at vertex/supernode {index}: {message}")]
    SymbolBuildFailed { index: usize, message: String },

    #[display("structural zero on the diagonal of column-block {cblk}")]
    FactorizationStructuralError { cblk: usize },

    #[display("pivot count {nbpivot} exceeded the configured limit {limit}")]
    FactorizationPivotLimitExceeded { nbpivot: usize, limit: usize },

    #[display("scheduler task failed: {message}")]
    SchedulerFailure { message: String },
}

impl PastixError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PastixError::Alloc => ErrorCode::Alloc,
            PastixError::Internal { .. } => ErrorCode::Internal,
            PastixError::BadParameter { .. } => ErrorCode::BadParameter,
            PastixError::Matrix { .. } => ErrorCode::Matrix,
            PastixError::StepOrder { .. } => ErrorCode::StepOrder,
            PastixError::SymbolBuildFailed { .. } => ErrorCode::Matrix,
            PastixError::FactorizationStructuralError { .. } => ErrorCode::Matrix,
            PastixError::FactorizationPivotLimitExceeded { .. } => ErrorCode::Internal,
            PastixError::SchedulerFailure { .. } => ErrorCode::Internal,
        }
    }
}

pub type PastixResult<T> = Result<T, PastixError>;
