//! General utilities shared across the crate.

use std::any::Any;
use std::time::Duration;

use quick_xml::events::BytesStart;

use crate::protocol_constants::REMOTE_TIME_FACTOR;

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Converts a remote offset (milliseconds) to a local player offset.
///
/// Truncates to whole seconds. Negative offsets clamp to zero.
#[must_use]
pub fn convert_remote_time(remote: i64) -> Duration {
    Duration::from_secs((remote.max(0) / REMOTE_TIME_FACTOR) as u64)
}

/// Converts a local player position back to remote milliseconds.
#[must_use]
pub fn to_remote_time(local: Duration) -> u64 {
    local.as_millis() as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Panic Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Extracts a readable message from a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// XML Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Gets an attribute value from an XML element.
pub fn get_xml_attr(elem: &BytesStart, attr_name: &[u8]) -> Option<String> {
    elem.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == attr_name)
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

/// Escapes a value for use inside a double-quoted XML attribute.
pub fn escape_attr(value: &str) -> String {
    html_escape::encode_double_quoted_attribute(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let literal = std::panic::catch_unwind(|| panic!("listener fault")).unwrap_err();
        assert_eq!(panic_message(literal.as_ref()), "listener fault");

        let formatted = std::panic::catch_unwind(|| panic!("queue {} broke", 7)).unwrap_err();
        assert_eq!(panic_message(formatted.as_ref()), "queue 7 broke");

        let opaque = std::panic::catch_unwind(|| std::panic::panic_any(42_u8)).unwrap_err();
        assert_eq!(panic_message(opaque.as_ref()), "non-string panic payload");
    }

    #[test]
    fn remote_milliseconds_become_seconds() {
        assert_eq!(convert_remote_time(10_000), Duration::from_secs(10));
    }

    #[test]
    fn remote_time_truncates_fractional_seconds() {
        assert_eq!(convert_remote_time(1_999), Duration::from_secs(1));
        assert_eq!(convert_remote_time(999), Duration::ZERO);
    }

    #[test]
    fn negative_remote_time_clamps_to_zero() {
        assert_eq!(convert_remote_time(-5_000), Duration::ZERO);
    }

    #[test]
    fn local_position_back_to_remote() {
        assert_eq!(to_remote_time(Duration::from_millis(61_500)), 61_500);
    }

    #[test]
    fn attribute_escaping_handles_quotes() {
        let escaped = escape_attr(r#"Tom "The" & Jerry"#);
        assert!(!escaped.contains('"'));
        assert!(escaped.contains("&amp;"));
    }
}
