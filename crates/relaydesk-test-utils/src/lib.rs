// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for relaydesk integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockProvider`] - Provider adapter with real webhook parsing and scripted sends
//! - [`TestHarness`] - Temp SQLite storage, seeded tenants and the full pipeline

pub mod harness;
pub mod mock_provider;

pub use harness::{TestHarness, WEBHOOK_TOKEN};
pub use mock_provider::{MockProvider, SentMessage};
