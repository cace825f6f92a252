use tracing::{trace, warn};

use session_state::ServerEvent;

/// Incremental parser for the server's SSE event stream.
///
/// Frames are separated by a blank line; each frame's `data:` lines are
/// joined into one JSON payload. Bytes are buffered raw and decoded only
/// once a frame is complete, so a multibyte UTF-8 character split across
/// chunk boundaries is reassembled instead of mangled. Malformed payloads
/// fail only their own frame: the buffer and the connection are unaffected,
/// and unknown event types are skipped silently for forward compatibility.
#[derive(Debug, Default)]
pub struct SseFrameParser {
    buffer: Vec<u8>,
}

impl SseFrameParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ServerEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(split) = find_frame_boundary(&self.buffer) {
            // The separator is ASCII, so a complete frame carries only
            // whole UTF-8 sequences.
            let frame = String::from_utf8_lossy(&self.buffer[..split]).into_owned();
            self.buffer.drain(0..split + 2);

            let Some(payload) = extract_data_payload(&frame) else {
                continue;
            };

            match ServerEvent::decode(&payload) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => trace!(payload = %payload, "skipping unrecognized event type"),
                Err(error) => {
                    warn!(%error, "dropping malformed event frame");
                }
            }
        }

        events
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<ServerEvent> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(|byte| byte.is_ascii_whitespace())
    }
}

fn find_frame_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\n\n")
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}
