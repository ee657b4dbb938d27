//! clipshare/crates/domains/src/lib.rs
//!
//! The data model and interface definitions for the clipboard session store.

pub mod error;
pub mod models;
pub mod ports;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use ports::*;

/// Length of every session code.
pub const SESSION_CODE_LEN: usize = 6;

/// True for strings that can be a session code (`100000`..=`999999`).
pub fn is_valid_code(code: &str) -> bool {
    code.len() == SESSION_CODE_LEN
        && code.bytes().all(|b| b.is_ascii_digit())
        && !code.starts_with('0')
}
