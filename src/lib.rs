//! SME Financial Health API Library
//!
//! This library provides the core functionality for the SME Financial Health
//! API: decoding uploaded statements (CSV, XLSX, PDF), computing financial
//! metrics, generating narrative insights through an ordered chain of AI
//! providers with a deterministic fallback, and persisting the results.
//!
//! # Modules
//!
//! - `analysis`: End-to-end analysis pipeline.
//! - `circuit_breaker`: Circuit breaker for narrative providers.
//! - `config`: Configuration management.
//! - `db`: Database connection and pool management.
//! - `db_storage`: Database storage operations.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `metrics`: Financial metric calculation.
//! - `models`: Database and API data models.
//! - `narrative`: Narrative providers and failover chain.
//! - `parser`: Document format detection and decoding.

pub mod analysis;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod narrative;
pub mod parser;
