//! FPL Optimizer — fantasy football squad selection
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod solver;
pub mod strategy;
pub mod engine;
pub mod data;
pub mod storage;
pub mod server;
