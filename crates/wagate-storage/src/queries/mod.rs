// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. All functions accept `&Database` and run on its
//! single background writer thread.

pub mod chats;
pub mod messages;
pub mod tenants;
