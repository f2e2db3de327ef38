//! # Sample Store
//!
//! Durable, ordered queue of captured location samples backed by SQLite.
//!
//! ## Overview
//!
//! - [`db`]: connection pool, embedded migrations, health check
//! - [`models`]: [`Sample`], [`NewSample`], [`SampleId`]
//! - [`repository`]: the [`SampleStore`] trait and [`SqliteSampleStore`]
//!
//! A sample is unsynced from the moment it is appended until the sync engine calls
//! [`SampleStore::mark_synced`] for it after the collector acknowledged its batch.
//! Rows are never deleted, and a crash at any point leaves unacknowledged rows
//! unsynced, so delivery is at least once.

pub mod db;
pub mod error;
pub mod models;
pub mod repository;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{Result, StoreError};
pub use models::{NewSample, Sample, SampleId};
pub use repository::{SampleStore, SqliteSampleStore};
