//! Utility modules

pub mod retry;
pub mod text;

pub use retry::RetryPolicy;
