// Public modules
pub mod config;
pub mod domains;
pub mod errors;
pub mod server;
pub mod validation;

pub use config::{ExportConfig, ServerConfig};
pub use errors::{ServiceError, ServiceResult};
