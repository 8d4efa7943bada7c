// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for relaydesk.
//!
//! This crate provides the foundational trait definitions, error types, and
//! the provider-neutral message model used throughout the workspace. Provider
//! adapters and storage backends implement traits defined here.

pub mod error;
pub mod traits;
pub mod types;

pub use error::RelaydeskError;
pub use types::{AdapterType, HealthStatus};

pub use traits::{MessagingProvider, PluginAdapter, StorageAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relaydesk_error_messages_are_descriptive() {
        let not_found = RelaydeskError::not_found("conversation", "c-1");
        assert_eq!(not_found.to_string(), "conversation not found: c-1");

        let transition = RelaydeskError::InvalidTransition {
            entity: "media",
            from: "completed".into(),
            to: "received".into(),
        };
        assert_eq!(
            transition.to_string(),
            "invalid media transition: completed -> received"
        );

        let storage = RelaydeskError::Storage {
            source: Box::new(std::io::Error::other("disk full")),
        };
        assert!(storage.to_string().contains("disk full"));
    }

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;

        for variant in [
            AdapterType::Provider,
            AdapterType::Storage,
            AdapterType::Observability,
        ] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_messaging_provider<T: MessagingProvider>() {}
        fn _assert_storage_adapter<T: StorageAdapter>() {}
    }
}
