// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Incremental decoder for `text/event-stream` bodies.
//!
//! Bytes arrive in arbitrary pieces; an event is complete once a blank line
//! follows its `data:` lines. Comment lines (`:`) and the `event`, `id` and
//! `retry` fields are accepted and ignored. An unterminated trailing event is
//! discarded when the stream ends.

use collection_mover_types::ProgressEvent;

use crate::client::ClientError;

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the body, returning every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<ProgressEvent>, ClientError> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.dispatch()? {
                    events.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            if field == "data" {
                self.data.push(value.to_string());
            }
        }
        Ok(events)
    }

    /// True when a partial line or event is buffered.
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty() || !self.data.is_empty()
    }

    fn dispatch(&mut self) -> Result<Option<ProgressEvent>, ClientError> {
        if self.data.is_empty() {
            return Ok(None);
        }
        let payload = self.data.join("\n");
        self.data.clear();
        Ok(Some(serde_json::from_str(&payload)?))
    }
}
