// Public modules
pub mod artifact;
pub mod cancel;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod markdown;
pub mod process;
pub mod report;
pub mod snippet;
pub mod ssh;
pub mod walker;

// Internal modules - not part of public API
pub(crate) mod paths;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
