//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod composition;
pub mod remote;
pub mod report;
pub mod snapshot;
pub mod version;
