//! harvestd - code execution service with session recovery and artifact
//! harvesting.
//!
//! A caller submits code; it runs in an isolated, reusable session; every file
//! the run produces (inline plots and filesystem outputs) is validated,
//! deduplicated, uploaded to object storage, and returned as a reference.

pub mod backend;
pub mod config;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod harvest;
pub mod http_server;
pub mod service;
pub mod session;
pub mod store;
