//! Interactive stderr helpers for the CLI.

pub mod warn;
