//! Integration tests module
//!
//! Contains tests that require a PostgreSQL container.

#[path = "../common/mod.rs"]
mod common;

mod postgres_store_test;
