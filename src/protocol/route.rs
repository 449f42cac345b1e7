//! Request path routing
//!
//! Canvas sessions are addressed as `/ws/canvas/{room}` where the room is 4 to
//! 20 ASCII alphanumerics. The leading and trailing slashes are optional.
//! Paths are matched after percent-decoding.

use std::borrow::Cow;
use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;

/// Minimum room name length
pub const MIN_ROOM_LEN: usize = 4;

/// Maximum room name length
pub const MAX_ROOM_LEN: usize = 20;

/// Canvas path rule; capture 1 is the room.
static CANVAS_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/?ws/canvas/([a-zA-Z0-9]{4,20})/?$").expect("canvas path regex is valid")
});

/// How a topic is derived from a matching request path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TopicMode {
    /// The whole request path is the topic, so `/ws/canvas/abcd` and
    /// `ws/canvas/abcd/` are different rooms
    #[default]
    FullPath,
    /// Only the room segment is the topic
    RoomOnly,
}

/// Percent-decode a raw request path
///
/// Returns `None` if the decoded bytes are not UTF-8.
pub fn decode_path(raw: &str) -> Option<Cow<'_, str>> {
    percent_decode_str(raw).decode_utf8().ok()
}

/// Extract the room segment from a decoded canvas path
///
/// Returns `None` if the path is not a canvas path.
pub fn room_from_path(path: &str) -> Option<&str> {
    CANVAS_PATH
        .captures(path)
        .and_then(|captures| captures.get(1))
        .map(|room| room.as_str())
}

/// Derive the topic for a decoded request path
///
/// Returns `None` if the path is not a canvas path; such requests are refused
/// before the upgrade.
pub fn topic_from_path(path: &str, mode: TopicMode) -> Option<&str> {
    let captures = CANVAS_PATH.captures(path)?;

    let topic = match mode {
        TopicMode::FullPath => captures.get(0),
        TopicMode::RoomOnly => captures.get(1),
    };
    topic.map(|m| m.as_str())
}
