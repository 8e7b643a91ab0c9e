//! PAIRWATCH: new-pair token risk tracker
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod tracker;
pub mod providers;
pub mod credentials;
pub mod rpc;
pub mod discovery;
pub mod storage;
pub mod engine;
pub mod status;
