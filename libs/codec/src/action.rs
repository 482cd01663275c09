//! Action name derivation
//!
//! The canonical action string of a message type is its type name with the
//! `Request` / `Response` suffix removed. It is derived once per type and the
//! same value is used by the envelope, the handler registry, the forwarding
//! engine and the frame codec.

/// Strip the message-kind suffix from a type name
///
/// ```rust
/// use ocpp_codec::derive_action;
///
/// assert_eq!(derive_action("GetFileRequest"), "GetFile");
/// assert_eq!(derive_action("GetFileResponse"), "GetFile");
/// assert_eq!(derive_action("Heartbeat"), "Heartbeat");
/// ```
pub const fn derive_action(type_name: &'static str) -> &'static str {
    const REQUEST: &[u8] = b"Request";
    const RESPONSE: &[u8] = b"Response";

    let bytes = type_name.as_bytes();
    let keep = if ends_with(bytes, RESPONSE) {
        bytes.len() - RESPONSE.len()
    } else if ends_with(bytes, REQUEST) {
        bytes.len() - REQUEST.len()
    } else {
        bytes.len()
    };
    let (head, _) = bytes.split_at(keep);
    match std::str::from_utf8(head) {
        Ok(action) => action,
        Err(_) => type_name,
    }
}

const fn ends_with(haystack: &[u8], suffix: &[u8]) -> bool {
    if suffix.len() > haystack.len() {
        return false;
    }
    let offset = haystack.len() - suffix.len();
    let mut idx = 0;
    while idx < suffix.len() {
        if haystack[offset + idx] != suffix[idx] {
            return false;
        }
        idx += 1;
    }
    true
}

/// Implement `fn action() -> &'static str` for a message type
///
/// Used inside an `impl OcppRequest` / `impl OcppResponse` block. The value
/// is computed at compile time from the type's own identifier.
#[macro_export]
macro_rules! ocpp_action {
    ($ty:ident) => {
        fn action() -> &'static str {
            const ACTION: &str = $crate::action::derive_action(stringify!($ty));
            ACTION
        }
    };
}
