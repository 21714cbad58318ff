// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway daemon composition: config wiring, ops surface, and shutdown.

pub mod ops;
pub mod serve;
pub mod upstream;
