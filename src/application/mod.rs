//! Service wiring for the binary: provider catalog, serve loop and
//! configuration checks.

pub mod check;
pub mod error;
pub mod runtime;
