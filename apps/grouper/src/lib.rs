//! Grouper Library
//!
//! Study-group partitioning: the engine, its storage seams and the
//! PostgreSQL store used by the `grouper` binary.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
