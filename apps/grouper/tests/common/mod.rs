//! Common test utilities and helpers
//!
//! Shared by the unit and integration suites.

#![allow(dead_code)]


pub use db::TestDb;
pub use fixtures::{at, names, seeded_class, HistoryBuilder};
