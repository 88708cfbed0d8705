mod error;

pub use error::{ServiceError, ValidationError};

/// Result type for validation of inbound requests
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
