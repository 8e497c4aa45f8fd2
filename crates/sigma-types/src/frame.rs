//! Event-stream framing.
//!
//! A frame is one or more `data: <line>` fields followed by a blank line.
//! Browsers' `EventSource` joins the data lines of one frame with `\n`.

/// Field prefix for every payload line.
pub const DATA_PREFIX: &str = "data: ";

/// Terminator closing one frame.
pub const FRAME_TERMINATOR: &str = "\n\n";

/// One unit of pushed data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFrame {
    pub data: String,
}

impl EventFrame {
    pub fn data(payload: impl Into<String>) -> Self {
        Self {
            data: payload.into(),
        }
    }

    /// Frame carrying a render failure in place of markup.
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            data: format!("Error: {}", message),
        }
    }

    /// Encode to wire format. Each payload line gets its own `data: ` prefix
    /// so embedded newlines cannot terminate the frame early.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.data.len() + DATA_PREFIX.len() + 2);
        for line in self.data.split('\n') {
            out.push_str(DATA_PREFIX);
            out.push_str(line.strip_suffix('\r').unwrap_or(line));
            out.push('\n');
        }
        out.push('\n');
        out
    }

    /// Parse a complete event-stream body into frames.
    ///
    /// Comment lines (`:`) and fields other than `data` are ignored, as is
    /// a trailing frame with no terminating blank line.
    pub fn parse_stream(body: &str) -> Vec<EventFrame> {
        let mut frames = Vec::new();
        let mut lines: Option<Vec<&str>> = None;

        for raw in body.split('\n') {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            if line.is_empty() {
                if let Some(data) = lines.take() {
                    frames.push(EventFrame::data(data.join("\n")));
                }
                continue;
            }
            if let Some(rest) = line.strip_prefix("data:") {
                let value = rest.strip_prefix(' ').unwrap_or(rest);
                lines.get_or_insert_with(Vec::new).push(value);
            }
        }

        frames
    }
}
