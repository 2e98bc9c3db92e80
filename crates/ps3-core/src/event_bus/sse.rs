//! Server-sent-event framing for task events.
//!
//! Each event becomes `id`, `event`, `data` and `timestamp` lines followed by
//! a blank line. A heartbeat is a single comment line.

use super::stream::StreamItem;
use super::types::TaskEvent;

/// Frame sent when no event arrived within the heartbeat interval
pub const HEARTBEAT_FRAME: &str = ": heartbeat\n\n";

/// Encode one event as an SSE frame.
#[must_use]
pub fn format_event(event: &TaskEvent) -> String {
    format!(
        "id: {}\nevent: {}\ndata: {}\ntimestamp: {}\n\n",
        event.id,
        event.kind,
        event.data,
        event.timestamp_rfc3339()
    )
}

impl StreamItem {
    /// Encode as an SSE frame.
    #[must_use]
    pub fn to_sse_frame(&self) -> String {
        match self {
            StreamItem::Event(event) => format_event(event),
            StreamItem::Heartbeat => HEARTBEAT_FRAME.to_string(),
        }
    }
}
