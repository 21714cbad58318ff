// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the gateway's components.

pub mod ingest;
pub mod notify;
pub mod store;
pub mod upstream;

pub use ingest::IngestSink;
pub use notify::{Notifier, NullNotifier};
pub use store::MessageStore;
pub use upstream::{
    ConnectionState, ConnectionUpdate, SentMessage, UpstreamBusinessProfile, UpstreamChat,
    UpstreamConnection, UpstreamConnector, UpstreamContact, UpstreamEvent, UpstreamSocket,
};
