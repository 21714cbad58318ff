// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test doubles shared across the Wagate workspace: an in-memory store with
//! scriptable failures, a mock upstream connector/socket, and a capturing
//! notifier.

pub mod mock_ingest;
pub mod mock_notifier;
pub mod mock_store;
pub mod mock_upstream;

pub use mock_ingest::MockIngest;
pub use mock_notifier::{MockNotifier, Notification};
pub use mock_store::MockStore;
pub use mock_upstream::{MockConnector, MockSocket, CREDS_FILE};
