//! SHARPLINE: odds snapshot collector and line-movement analyst
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod odds;
pub mod llm;
pub mod engine;
pub mod storage;
