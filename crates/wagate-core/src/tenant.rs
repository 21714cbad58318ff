// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant configuration types: webhooks, exclusion lists, business info.

use serde::{Deserialize, Serialize};

/// A tenant-configured webhook destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// HMAC-SHA256 signing secret for this destination.
    pub secret: String,
    pub is_active: bool,
}

/// Business profile attached to a tenant account.
///
/// All fields are best-effort: refreshes from upstream only overwrite
/// fields the upstream actually provided.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessInfo {
    pub name: Option<String>,
    pub working_hours: Option<String>,
    pub location_url: Option<String>,
    pub shipping_details: Option<String>,
    pub instagram_url: Option<String>,
    pub website_url: Option<String>,
    #[serde(default)]
    pub mobile_numbers: Vec<String>,
    /// RFC 3339 timestamp of the last refresh.
    pub last_updated: Option<String>,
}
