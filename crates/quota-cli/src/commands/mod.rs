//! CLI command handlers.

pub mod check;
pub mod list;
pub mod replay;
