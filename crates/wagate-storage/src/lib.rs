// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistent store for the Wagate gateway.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread; batch persistence is transactional; message inserts are
//! idempotent by primary key.

pub mod database;
pub mod migrations;
pub mod queries;
pub mod store;

pub use database::Database;
pub use store::SqliteStore;
