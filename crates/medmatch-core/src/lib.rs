// Public fallible APIs in this crate share one concrete error contract
// (`MedMatchError`). Repeating per-function `# Errors` boilerplate obscures
// behavior more than it clarifies.
#![allow(
    clippy::missing_errors_doc,
    reason = "crate-wide fallible API uses one explicit error type; per-item boilerplate would duplicate contract"
)]

pub(crate) mod aggregate;
pub mod analyst;
pub(crate) mod cache;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub(crate) mod graph;
pub(crate) mod matcher;
pub mod models;
pub mod normalize;
pub(crate) mod tier;

pub use client::MedMatch;
pub use config::MedMatchConfig;
pub use error::{MedMatchError, Result};
