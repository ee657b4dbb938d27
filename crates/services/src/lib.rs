//! # services
//!
//! Business rules of the clipboard session store: code allocation,
//! optimistic concurrency, and the `ClipboardStore` implementation that
//! runs them over any `SessionRepository`.

pub mod code_generator;
pub mod concurrency;
pub mod session_service;

pub use code_generator::{CodeGenerator, CodeSource, RandomCodeSource};
pub use session_service::{ServiceOptions, SessionService};
