//! Line-oriented framing for the manager interface.
//!
//! Every block is a run of `Key: Value` lines terminated by an empty line.
//! Lines without a colon only appear in command output and are kept
//! verbatim on the response.

use std::fmt::Write;

use tracing::trace;

use crate::message::{ActionRequest, Event, Response, ResponseStatus};

/// Prefix of the greeting line sent by the server on connect.
pub const BANNER_PREFIX: &str = "Asterisk Call Manager/";

/// A decoded inbound block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Event(Event),
    Response(Response),
}

/// Serialize an action into its wire representation.
pub fn encode_action(action: &ActionRequest) -> String {
    let mut frame = String::with_capacity(64);
    let _ = write!(frame, "Action: {}\r\n", action.name());
    for (key, value) in action.headers() {
        let _ = write!(frame, "{}: {}\r\n", key, value);
    }
    frame.push_str("\r\n");
    frame
}

/// Extract the protocol version from the greeting line.
pub fn parse_banner(line: &str) -> Option<&str> {
    line.trim_end_matches(['\r', '\n'])
        .strip_prefix(BANNER_PREFIX)
}

/// Incremental block decoder fed one line at a time.
#[derive(Debug, Default)]
pub struct MessageDecoder {
    pending: Vec<String>,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line. Returns a message when the line terminates a block.
    pub fn push_line(&mut self, line: &str) -> Option<Message> {
        let line = line.trim_end_matches(['\r', '\n']);
        if !line.is_empty() {
            self.pending.push(line.to_string());
            return None;
        }
        if self.pending.is_empty() {
            return None;
        }

        let lines = std::mem::take(&mut self.pending);
        decode_block(&lines)
    }
}

fn decode_block(lines: &[String]) -> Option<Message> {
    let mut event_name = None;
    let mut status = None;
    let mut keys = Vec::with_capacity(lines.len());
    let mut output = Vec::new();

    for line in lines {
        match line.split_once(':') {
            Some((key, value)) => {
                let key = key.trim();
                let value = value.strip_prefix(' ').unwrap_or(value);
                match key {
                    "Event" if event_name.is_none() => event_name = Some(value.to_string()),
                    "Response" if status.is_none() => status = Some(ResponseStatus::parse(value)),
                    _ => keys.push((key.to_string(), value.to_string())),
                }
            }
            None => output.push(line.clone()),
        }
    }

    if let Some(name) = event_name {
        let mut event = Event::new(name);
        for (key, value) in keys {
            event.insert(key, value);
        }
        return Some(Message::Event(event));
    }

    if let Some(status) = status {
        let mut response = Response::new(status);
        for (key, value) in keys {
            response.insert(key, value);
        }
        for line in output {
            response.push_output(line);
        }
        return Some(Message::Response(response));
    }

    trace!(lines = lines.len(), "ignoring block without Event or Response header");
    None
}
