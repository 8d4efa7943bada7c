// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared-secret checks for inbound webhooks.

/// Constant-time byte comparison. Length mismatch returns early; content
/// comparison does not.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Compares a presented credential against the configured secret.
///
/// Fails closed: no configured secret, an empty secret, or no presented
/// value all reject.
pub fn secret_matches(configured: Option<&str>, presented: Option<&str>) -> bool {
    match (configured, presented) {
        (Some(expected), Some(actual)) if !expected.is_empty() => {
            constant_time_eq(expected.as_bytes(), actual.trim().as_bytes())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_and_unequal_inputs() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret-longer"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn secret_matches_fails_closed() {
        assert!(secret_matches(Some("tok"), Some("tok")));
        assert!(secret_matches(Some("tok"), Some(" tok ")));
        assert!(!secret_matches(Some("tok"), Some("other")));
        assert!(!secret_matches(Some("tok"), None));
        assert!(!secret_matches(None, Some("tok")));
        assert!(!secret_matches(Some(""), Some("")));
    }
}
