//! Data Validation and Normalization
//!
//! Turns loosely-typed ingest payloads into checked sensor readings and
//! enforces pagination bounds for the query paths.

mod error;
mod normalizer;
mod validator;

pub use error::ValidationError;
pub use normalizer::{normalize_metadata, parse_timestamp, resolve_machine_id, UNKNOWN_MACHINE};
pub use validator::{ValidatedReading, ValidationConfig, Validator};
