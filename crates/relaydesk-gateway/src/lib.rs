// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for relaydesk.
//!
//! Receives provider webhooks and hands them to the ingestion pipeline, and
//! serves the bearer-protected operator API (outbound sends, provider
//! switching, media operations and stats) plus public health and metrics.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;
pub mod webhooks;

pub use auth::AuthConfig;
pub use error::{ApiError, ErrorResponse};
pub use server::{GatewayState, HealthState, build_router, start_server};
