//! Shared utilities

pub mod config;
pub mod context;
pub mod diagnostic;
pub mod fs;
pub mod hash;

pub use config::{Config, CyclePolicy};
pub use context::GlobalContext;
pub use diagnostic::Diagnostic;
