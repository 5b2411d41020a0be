//! People API Library
//!
//! Stores person records and fills in age, gender and nationality from
//! external lookup sources queried concurrently under one deadline.
//!
//! # Modules
//!
//! - `api`: API definitions.
//! - `core`: Core business logic.
//! - `data`: Data access layer.
//! - `integrations`: External service integrations.
//! - `obs`: Observability and logging.
//! - `config`: Configuration management.
//! - `db`: Database connection and pool management.
//! - `db_storage`: Person record storage and query building.
//! - `enrichment`: Concurrent attribute enrichment and the merge policy.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `lookup_client`: HTTP client for enrichment sources.
//! - `models`: Core data models.
//! - `openapi`: OpenAPI document.
//! - `services`: Per-source attribute fetchers (age, gender, nationality).

pub mod api;
pub mod core;
pub mod data;
pub mod integrations;
pub mod obs;

pub mod config;
pub mod db;
pub mod db_storage;
pub mod enrichment;
pub mod errors;
pub mod handlers;
pub mod lookup_client;
pub mod models;
pub mod openapi;
pub mod services;
