use crate::primitive::ResponseStatusCode;
use thiserror::Error;

/// Failure of a single request, classified by the response status it maps to.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CseError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NoPrivilege(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Unreachable(String),

    #[error("{0}")]
    NotImplemented(String),

    #[error("{0}")]
    Store(String),
}

impl CseError {
    pub fn status(&self) -> ResponseStatusCode {
        match self {
            CseError::Validation(_) => ResponseStatusCode::BadRequest,
            CseError::NotFound(_) => ResponseStatusCode::NotFound,
            CseError::Conflict(_) => ResponseStatusCode::AlreadyExists,
            CseError::NoPrivilege(_) => ResponseStatusCode::OriginatorHasNoPrivilege,
            CseError::Timeout(_) => ResponseStatusCode::RequestTimeout,
            CseError::Unreachable(_) => ResponseStatusCode::TargetNotReachable,
            CseError::NotImplemented(_) => ResponseStatusCode::NotImplemented,
            CseError::Store(_) => ResponseStatusCode::InternalServerError,
        }
    }

    pub fn not_found(target: &str) -> Self {
        CseError::NotFound(format!("resource does not exist: {}", target))
    }

    pub fn no_privilege(originator: &str) -> Self {
        CseError::NoPrivilege(format!("originator has no privilege: {}", originator))
    }
}

/// Normalised failure reported by every resource store backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("resource already exists: {0}")]
    Duplicate(String),

    #[error("resource does not exist: {0}")]
    NotFound(String),

    #[error("store backend failure: {0}")]
    Backend(String),

    /// An edit refused to produce the new record.
    #[error("{0}")]
    Rejected(String),
}

impl From<StoreError> for CseError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(_) => CseError::Conflict(err.to_string()),
            StoreError::NotFound(path) => CseError::not_found(&path),
            StoreError::Backend(_) => CseError::Store(err.to_string()),
            StoreError::Rejected(reason) => CseError::Validation(reason),
        }
    }
}

/// Transport-level failure while sending a primitive.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BinderError {
    #[error("no binder for point of access: {0}")]
    UnsupportedScheme(String),

    #[error("invalid point of access '{0}'")]
    InvalidAddress(String),

    #[error("duplicate request identifier: {0}")]
    DuplicateRequest(String),

    #[error("peer unreachable: {0}")]
    Transport(String),

    #[error("no response within {0}s")]
    Timeout(u64),

    #[error("malformed primitive: {0}")]
    Codec(String),
}

impl From<BinderError> for CseError {
    fn from(err: BinderError) -> Self {
        match err {
            BinderError::Timeout(_) => CseError::Timeout(err.to_string()),
            BinderError::Codec(_) => CseError::Validation(err.to_string()),
            _ => CseError::Unreachable(err.to_string()),
        }
    }
}

pub type CseResult<T> = Result<T, CseError>;
