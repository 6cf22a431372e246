//! Engine orchestrating step-based admission application intake: a
//! fourteen-section step workflow, a durable per-section draft store, and an
//! asynchronous document-extraction pipeline that auto-fills empty fields.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
