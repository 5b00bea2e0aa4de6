//! # Test Utilities
//!
//! Migrator shared by the SQLx integration tests.

/// sqlx migrator over the crate's migrations directory.
///
/// Use this in tests with: `#[sqlx::test(migrator = "epets_core::test_helpers::MIGRATOR")]`
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
