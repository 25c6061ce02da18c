//! Error types shared by the HTTP surface.
//!
//! Session-level errors live next to the component that raises them
//! (`FrameError`, `ModelError`, `ToolError`); this module only holds the
//! error type that HTTP handlers convert into responses.

pub mod app_error;

pub use app_error::{AppError, AppResult};
