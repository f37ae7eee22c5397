//! In-band control protocol.
//!
//! Control messages share the payload channel with application data, so
//! every inbound frame is classified before it can reach the inbox:
//!
//! - `NEARLINK_PING` / `NEARLINK_PONG`: keepalive probe and reply.
//! - `NEARLINK_ID=<id>`: identity handshake, carrying the sender's durable
//!   node id (`[A-Za-z0-9-]+`).
//!
//! A frame that starts like an identity handshake but violates the grammar
//! is dropped, never inboxed. Anything else, including non-UTF-8 bytes, is
//! application data.

/// Keepalive probe marker.
pub const PING_MARKER: &str = "NEARLINK_PING";

/// Keepalive reply marker.
pub const PONG_MARKER: &str = "NEARLINK_PONG";

/// Identity handshake prefix; the full frame is `NEARLINK_ID=<node id>`.
pub const IDENTITY_PREFIX: &str = "NEARLINK_ID";

/// Classification of one inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Control {
    Ping,
    Pong,
    /// Identity handshake with a well-formed node id.
    Identity(String),
    /// Looked like a control frame but violated the grammar; drop it.
    Malformed,
    /// Application data, to be delivered to the inbox.
    Data,
}

/// Classify one inbound frame.
pub fn classify(bytes: &[u8]) -> Control {
    if bytes == PING_MARKER.as_bytes() {
        return Control::Ping;
    }
    if bytes == PONG_MARKER.as_bytes() {
        return Control::Pong;
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        if text.starts_with(IDENTITY_PREFIX) {
            let rest = &text[IDENTITY_PREFIX.len()..];
            return match rest.strip_prefix('=') {
                Some(id) if is_valid_node_id(id) => Control::Identity(id.to_string()),
                _ => Control::Malformed,
            };
        }
    }
    Control::Data
}

/// Render the identity handshake frame for `node_id`.
pub fn identity_payload(node_id: &str) -> Vec<u8> {
    format!("{IDENTITY_PREFIX}={node_id}").into_bytes()
}

fn is_valid_node_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-')
}
