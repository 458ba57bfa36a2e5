//! HTTP Route Handlers

pub mod ingest;
pub mod machines;
pub mod predictions;
