pub mod service;

pub use service::{HttpRedactor, PassthroughRedactor, Redactor};
