//! Lens module
//!
//! Lenses combine business logic with output formatting so the same
//! operations can back the CLI or any other front end.
//!
//! | Lens | Purpose |
//! |------|---------|
//! | `MigrateLens` | schema status, migration plans, applying migrations |
//!
//! Each lens module exports a lens struct, its args structs, and its output
//! types.

pub mod migrate;
pub mod utils;
