// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signed per-tenant webhook fan-out for the Wagate gateway.

pub mod dispatcher;
pub mod signature;

pub use dispatcher::{WebhookDispatcher, EVENT_MESSAGE_RECEIVED};
pub use signature::{sign, signature_header, verify};
