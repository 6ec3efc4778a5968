//! Session feed consumption
//!
//! Subscribes to the hub's SSE endpoint and surfaces decoded feed events
//! plus transport-loss notices. On disconnect the client resubscribes
//! with capped backoff; the snapshot frame sent on every subscribe is
//! what resynchronizes the roster, no event replay happens.

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use readsync_common::events::FeedEvent;
use readsync_common::{Error, Result};

const USER_AGENT: &str = concat!("readsync-dash/", env!("CARGO_PKG_VERSION"));

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// One parsed SSE frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Incremental parser for an SSE byte stream
///
/// Frames can arrive split across chunks at any byte boundary, so the
/// parser buffers until it sees complete lines. Comment lines (the
/// hub's keep-alives) are dropped.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every frame it completed
    ///
    /// Buffering stays at the byte level; a line is only decoded once
    /// its newline has arrived, so a multibyte character split across
    /// chunks reassembles before decoding.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(|c| c == '\n' || c == '\r');
            self.process_line(line, &mut frames);
        }
        frames
    }

    fn process_line(&mut self, line: &str, frames: &mut Vec<SseFrame>) {
        if line.is_empty() {
            // Blank line dispatches the pending frame
            if !self.data.is_empty() {
                frames.push(SseFrame {
                    event: self
                        .event
                        .take()
                        .unwrap_or_else(|| "message".to_string()),
                    data: self.data.join("\n"),
                });
            }
            self.event = None;
            self.data.clear();
            return;
        }
        if line.starts_with(':') {
            // Comment, used by the hub as keep-alive
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
    }
}

/// One update surfaced to the dashboard
#[derive(Debug)]
pub enum FeedUpdate {
    /// Decoded feed event
    Event(FeedEvent),
    /// Transport dropped; a resubscribe with backoff is underway
    ConnectionLost { error: String },
}

/// Why one subscription attempt stopped
enum StreamOutcome {
    /// `session_end` delivered, the feed is complete
    SessionEnded,
    /// Transport closed or errored mid-stream
    Disconnected {
        error: String,
        /// Whether any event reached the dashboard before the drop
        delivered: bool,
    },
    /// The dashboard dropped its receiver
    ReceiverDropped,
}

/// Reconnect delay, doubling per failed attempt up to a cap
struct Backoff {
    delay: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            delay: INITIAL_BACKOFF,
        }
    }

    /// Current delay, doubling it for the next attempt
    fn advance(&mut self) -> Duration {
        let delay = self.delay;
        self.delay = (self.delay * 2).min(MAX_BACKOFF);
        delay
    }

    /// Back to the initial delay after a connection that delivered
    fn reset(&mut self) {
        self.delay = INITIAL_BACKOFF;
    }
}

/// SSE feed client for one hub
pub struct FeedClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl FeedClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        // No overall timeout: the subscription stays open for the whole
        // session. Only the connect is bounded.
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Subscription(e.to_string()))?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    /// Subscribe and pump updates into `tx` until the session ends
    ///
    /// Transport failures emit [`FeedUpdate::ConnectionLost`] and retry
    /// with capped backoff. Unknown and already-ended sessions are fatal
    /// and returned as errors.
    pub async fn run(&self, session_id: &str, tx: mpsc::Sender<FeedUpdate>) -> Result<()> {
        let mut backoff = Backoff::new();
        loop {
            match self.stream_once(session_id, &tx).await {
                Ok(StreamOutcome::SessionEnded) => return Ok(()),
                Ok(StreamOutcome::ReceiverDropped) => {
                    debug!(session_id = %session_id, "feed receiver dropped, stopping");
                    return Ok(());
                }
                Ok(StreamOutcome::Disconnected { error, delivered }) => {
                    warn!(session_id = %session_id, "feed disconnected: {}", error);
                    if delivered {
                        backoff.reset();
                    }
                    if tx
                        .send(FeedUpdate::ConnectionLost { error })
                        .await
                        .is_err()
                    {
                        return Ok(());
                    }
                }
                Err(err @ (Error::SessionNotFound(_) | Error::SessionEnded(_))) => {
                    return Err(err);
                }
                Err(err) => {
                    warn!(session_id = %session_id, "subscribe failed: {}", err);
                    if tx
                        .send(FeedUpdate::ConnectionLost {
                            error: err.to_string(),
                        })
                        .await
                        .is_err()
                    {
                        return Ok(());
                    }
                }
            }
            tokio::time::sleep(backoff.advance()).await;
        }
    }

    async fn stream_once(
        &self,
        session_id: &str,
        tx: &mpsc::Sender<FeedUpdate>,
    ) -> Result<StreamOutcome> {
        let url = format!("{}/api/subscribe/{}", self.base_url, session_id);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Subscription(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(Error::SessionNotFound(session_id.to_string()));
        }
        if status.as_u16() == 410 {
            return Err(Error::SessionEnded(session_id.to_string()));
        }
        if !status.is_success() {
            return Err(Error::Subscription(format!("HTTP {}", status.as_u16())));
        }

        debug!(session_id = %session_id, "subscribed to feed");

        let mut parser = SseParser::new();
        let mut delivered = false;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    return Ok(StreamOutcome::Disconnected {
                        error: e.to_string(),
                        delivered,
                    })
                }
            };
            for frame in parser.push(&chunk) {
                let event = match serde_json::from_str::<FeedEvent>(&frame.data) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(event = %frame.event, "undecodable feed frame: {}", e);
                        continue;
                    }
                };
                let ended = matches!(event, FeedEvent::SessionEnd { .. });
                if tx.send(FeedUpdate::Event(event)).await.is_err() {
                    return Ok(StreamOutcome::ReceiverDropped);
                }
                delivered = true;
                if ended {
                    return Ok(StreamOutcome::SessionEnded);
                }
            }
        }
        Ok(StreamOutcome::Disconnected {
            error: "stream closed".to_string(),
            delivered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_single_frame() {
        let mut parser = SseParser::new();
        let frames = parser.push(b"event: connected\ndata: {\"ok\":true}\n\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: "connected".to_string(),
                data: "{\"ok\":true}".to_string(),
            }]
        );
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"event: progress_up").is_empty());
        assert!(parser.push(b"date\ndata: {\"n\":").is_empty());
        let frames = parser.push(b"1}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "progress_update");
        assert_eq!(frames[0].data, "{\"n\":1}");
    }

    #[test]
    fn test_two_frames_in_one_chunk() {
        let mut parser = SseParser::new();
        let frames = parser.push(b"event: a\ndata: 1\n\nevent: b\ndata: 2\n\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event, "a");
        assert_eq!(frames[1].event, "b");
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut parser = SseParser::new();
        let frames = parser.push(b"event: a\r\ndata: 1\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "a");
        assert_eq!(frames[0].data, "1");
    }

    #[test]
    fn test_comments_ignored() {
        let mut parser = SseParser::new();
        assert!(parser.push(b": keep-alive\n\n").is_empty());
        // A comment between fields does not break the frame
        let frames = parser.push(b"event: a\n: keep-alive\ndata: 1\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "1");
    }

    #[test]
    fn test_multiline_data_joined() {
        let mut parser = SseParser::new();
        let frames = parser.push(b"data: line1\ndata: line2\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, "line1\nline2");
    }

    #[test]
    fn test_event_without_data_not_dispatched() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"event: lonely\n\n").is_empty());
        // The dangling event name does not leak into the next frame
        let frames = parser.push(b"data: 1\n\n");
        assert_eq!(frames[0].event, "message");
    }

    #[test]
    fn test_value_without_space_after_colon() {
        let mut parser = SseParser::new();
        let frames = parser.push(b"event:tight\ndata:x\n\n");
        assert_eq!(frames[0].event, "tight");
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn test_chunk_split_inside_multibyte_char() {
        let mut parser = SseParser::new();
        let payload = "data: {\"student_name\":\"José\"}\n\n".as_bytes();
        // Split between the two bytes of the é
        let split = payload.iter().position(|&b| b == 0xc3).unwrap() + 1;
        assert!(parser.push(&payload[..split]).is_empty());
        let frames = parser.push(&payload[split..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{\"student_name\":\"José\"}");
    }

    #[test]
    fn test_backoff_doubles_capped_and_resets() {
        let mut backoff = Backoff::new();
        assert_eq!(backoff.advance(), Duration::from_secs(1));
        assert_eq!(backoff.advance(), Duration::from_secs(2));
        assert_eq!(backoff.advance(), Duration::from_secs(4));
        for _ in 0..10 {
            backoff.advance();
        }
        assert_eq!(backoff.advance(), MAX_BACKOFF);

        backoff.reset();
        assert_eq!(backoff.advance(), INITIAL_BACKOFF);
    }
}
